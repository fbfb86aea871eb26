use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use alert_engine::{AlertChecker, AlertStore};
use alphavantage_client::AlphaVantageClient;
use anyhow::Result;
use notifier::{CommentaryProvider, NotificationChannel, NotificationConfig, SmtpNotifier};
use portfolio_ledger::{AccountManager, Ledger, LedgerDb};
use quote_store::{QuoteDb, QuoteStore};

mod config;
mod refresh;

use ai_commentary::{AiCache, AiClient, AiConfig};
use config::AgentConfig;
use refresh::refresh_quotes;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    tracing::info!("Starting Portfolio Pulse agent");

    // 2. Load configuration
    let config = AgentConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Database: {}", config.database_url);
    tracing::info!("  Watchlist: {} tickers", config.watchlist.len());
    tracing::info!("  Quote TTL: {}s", config.quote_ttl_secs);
    tracing::info!("  Refresh interval: {}s", config.refresh_interval_secs);
    tracing::info!("  Fetch ceiling: {} req/s", config.fetch_rate_limit_per_sec);
    tracing::info!("  Alert cooldown: {}s", config.alert_cooldown_secs);

    // 3. Storage and components
    let ledger_db = LedgerDb::new(&config.database_url).await?;
    let quote_db = QuoteDb::new(&config.database_url).await?;
    let quotes = QuoteStore::new(quote_db);

    let accounts = AccountManager::new(ledger_db.clone());
    let ledger = Arc::new(Ledger::new(
        ledger_db.clone(),
        quotes.clone(),
        config.ledger_config(),
    ));
    let alert_store = AlertStore::new(ledger_db.pool().clone());
    let checker = AlertChecker::new(
        alert_store.clone(),
        accounts,
        ledger.clone(),
        quotes.clone(),
        config.evaluator_config(),
    );

    let client = AlphaVantageClient::with_rate_limit(
        config.alphavantage_api_key.clone(),
        config.fetch_rate_limit_per_sec,
    );

    // 4. Optional collaborators: email transport and commentary model
    let smtp_config = NotificationConfig::from_env();
    let channel: Option<SmtpNotifier> = if smtp_config.is_configured() {
        match SmtpNotifier::new(&smtp_config) {
            Ok(notifier) => {
                tracing::info!("Email notifications enabled");
                Some(notifier)
            }
            Err(e) => {
                tracing::warn!("Failed to initialize SMTP notifier: {}", e);
                None
            }
        }
    } else {
        tracing::info!("SMTP not configured, alert delivery disabled (set SMTP_HOST)");
        None
    };

    let commentary: Option<AiClient> = match AiConfig::from_env() {
        Some(ai_config) => {
            let cache = AiCache::new(ledger_db.pool().clone()).await?;
            tracing::info!("AI commentary enabled ({})", ai_config.model);
            Some(AiClient::new(ai_config, Some(cache)))
        }
        None => {
            tracing::info!("AI commentary not configured (set GENAI_ENDPOINT / GENAI_API_KEY)");
            None
        }
    };

    // 5. Scheduled refresh + alert loop; first cycle runs immediately
    loop {
        if let Err(e) = run_cycle(&config, &client, &quotes, &ledger, &alert_store, &checker, &channel, &commentary).await {
            tracing::error!("Cycle failed: {:#}", e);
        }

        tracing::info!(
            "Sleeping {}s until the next cycle",
            config.refresh_interval_secs
        );
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.refresh_interval_secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested, exiting");
                break;
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_cycle(
    config: &AgentConfig,
    client: &AlphaVantageClient,
    quotes: &QuoteStore,
    ledger: &Arc<Ledger>,
    alert_store: &AlertStore,
    checker: &AlertChecker,
    channel: &Option<SmtpNotifier>,
    commentary: &Option<AiClient>,
) -> Result<()> {
    // Watchlist plus everything users actually hold, alert on, or have cached.
    let mut tickers: BTreeSet<String> = config.watchlist.iter().cloned().collect();
    tickers.extend(quotes.tickers().await?);
    tickers.extend(alert_store.active_tickers().await?);
    tickers.extend(ledger.traded_tickers().await?);
    let tickers: Vec<String> = tickers.into_iter().collect();

    let stats = refresh_quotes(client, quotes, &tickers, config.quote_ttl()).await?;
    tracing::info!(
        "Quote refresh: {} requested, {} fresh, {} refreshed, {} failed",
        stats.requested,
        stats.already_fresh,
        stats.refreshed,
        stats.failed
    );

    match channel {
        Some(channel) => {
            let provider = commentary
                .as_ref()
                .map(|c| c as &dyn CommentaryProvider);
            checker
                .run_cycle(channel as &dyn NotificationChannel, provider)
                .await?;
        }
        None => tracing::info!("No delivery channel, skipping alert checks"),
    }

    Ok(())
}
