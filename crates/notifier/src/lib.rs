mod smtp;
mod templates;

pub use smtp::SmtpNotifier;
pub use templates::EmailTemplate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The market facts behind a triggered alert, ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertContext {
    pub ticker: String,
    pub name: String,
    pub criterion_label: String,
    pub threshold: f64,
    pub price: f64,
    pub daily_change_pct: f64,
    pub volume: i64,
    pub pe_ratio: Option<f64>,
    pub beta: Option<f64>,
    pub rsi: Option<f64>,
    pub triggered_at: chrono::DateTime<chrono::Utc>,
}

/// A rendered-and-addressed notification for one triggered alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub to: String,
    pub subject: String,
    pub context: AlertContext,
    /// Optional generated commentary; absence falls back to the plain template.
    pub commentary: Option<String>,
}

impl AlertNotification {
    pub fn new(to: impl Into<String>, context: AlertContext) -> Self {
        let subject = format!(
            "Alert: {} ({}) - {}",
            context.name, context.ticker, context.criterion_label
        );
        Self {
            to: to.into(),
            subject,
            context,
            commentary: None,
        }
    }

    pub fn with_commentary(mut self, commentary: Option<String>) -> Self {
        self.commentary = commentary;
        self
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, notification: &AlertNotification) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Optional text-generation seam for enriching notifications.
///
/// Implementations are best-effort collaborators: a failure here must never
/// block delivery, it only drops the commentary block.
#[async_trait]
pub trait CommentaryProvider: Send + Sync {
    async fn alert_commentary(&self, context: &AlertContext) -> anyhow::Result<String>;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// SMTP configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_tls: SmtpTls,
}

#[derive(Debug, Clone, Default)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

impl NotificationConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let smtp_tls = match std::env::var("SMTP_TLS").unwrap_or_default().as_str() {
            "tls" => SmtpTls::Tls,
            "none" => SmtpTls::None,
            _ => SmtpTls::StartTls,
        };

        Self {
            smtp_host: std::env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME")
                .ok()
                .filter(|s| !s.is_empty()),
            smtp_password: std::env::var("SMTP_PASSWORD")
                .ok()
                .filter(|s| !s.is_empty()),
            smtp_from: std::env::var("SMTP_FROM_ADDRESS")
                .ok()
                .filter(|s| !s.is_empty()),
            smtp_tls,
        }
    }

    /// Whether enough is configured to build an SMTP channel.
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_from.is_some()
    }
}
