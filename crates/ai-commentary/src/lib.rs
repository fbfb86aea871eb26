mod cache;
pub mod prompts;

pub use cache::AiCache;

use async_trait::async_trait;
use chrono::Duration;
use market_core::constants::AI_CACHE_TTL_SECS;
use notifier::{AlertContext, CommentaryProvider};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Errors from the text-generation service.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI API not configured")]
    NotConfigured,
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {0}")]
    Api(String),
}

/// Connection settings for an OpenAI-compatible deployment endpoint.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl AiConfig {
    /// Load from environment variables; None when the service is not set up.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("GENAI_ENDPOINT").ok().filter(|s| !s.is_empty())?;
        let api_key = std::env::var("GENAI_API_KEY").ok().filter(|s| !s.is_empty())?;

        Some(Self {
            endpoint,
            api_key,
            model: std::env::var("GENAI_MODEL").unwrap_or_else(|_| "gpt-4".to_string()),
            max_tokens: std::env::var("GENAI_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            temperature: std::env::var("GENAI_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.7),
        })
    }
}

/// Chat-completions client with a hashed response cache.
///
/// The service is an opaque, possibly slow collaborator; every caller is
/// expected to degrade gracefully when it fails.
#[derive(Clone)]
pub struct AiClient {
    config: AiConfig,
    client: reqwest::Client,
    cache: Option<AiCache>,
}

impl AiClient {
    pub fn new(config: AiConfig, cache: Option<AiCache>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            client,
            cache,
        }
    }

    /// Generate a completion, reusing a cached response when one is recent.
    pub async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, AiError> {
        let hash = request_hash(
            prompt,
            system_prompt,
            self.config.max_tokens,
            self.config.temperature,
        );

        if let Some(cache) = &self.cache {
            match cache.get(&hash, Duration::seconds(AI_CACHE_TTL_SECS)).await {
                Ok(Some(response)) => {
                    tracing::debug!("AI cache hit for {}", &hash[..12]);
                    return Ok(response);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("AI cache read failed: {}", e),
            }
        }

        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version=v1",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        );
        let payload = serde_json::json!({
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api(format!("HTTP {}: {}", status, body)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Api(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AiError::Api("empty completion".to_string()))?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&hash, &content).await {
                tracing::warn!("AI cache write failed: {}", e);
            }
        }

        Ok(content)
    }
}

#[async_trait]
impl CommentaryProvider for AiClient {
    async fn alert_commentary(&self, context: &AlertContext) -> anyhow::Result<String> {
        let commentary = self
            .generate(
                &prompts::alert_prompt(context),
                Some(prompts::ADVISOR_SYSTEM_PROMPT),
            )
            .await?;
        Ok(commentary)
    }
}

fn request_hash(prompt: &str, system_prompt: Option<&str>, max_tokens: u32, temperature: f64) -> String {
    let canonical = serde_json::json!({
        "prompt": prompt,
        "system_prompt": system_prompt,
        "max_tokens": max_tokens,
        "temperature": temperature,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
