use anyhow::{Context, Result};
use chrono::Duration;
use market_core::constants::{
    ALERT_COOLDOWN_SECS, FETCH_RATE_LIMIT_PER_SEC, HK_STOCKS, QUOTE_TTL_SECS, STARTING_CASH,
};
use std::env;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    // Storage
    pub database_url: String,

    // Market data
    pub alphavantage_api_key: String,
    pub watchlist: Vec<String>,
    pub quote_ttl_secs: i64,
    pub fetch_rate_limit_per_sec: usize,

    // Scheduling
    pub refresh_interval_secs: u64,

    // Ledger
    pub starting_cash: f64,

    // Alerts
    pub alert_cooldown_secs: i64,
    pub alert_rearm_when_clear: bool,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:pulse.db".to_string()),

            alphavantage_api_key: env::var("ALPHAVANTAGE_API_KEY")
                .context("ALPHAVANTAGE_API_KEY not set")?,
            watchlist: env::var("WATCHLIST")
                .unwrap_or_else(|_| HK_STOCKS.join(","))
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            quote_ttl_secs: env::var("QUOTE_TTL_SECS")
                .unwrap_or_else(|_| QUOTE_TTL_SECS.to_string())
                .parse()?,
            fetch_rate_limit_per_sec: env::var("FETCH_RATE_LIMIT")
                .unwrap_or_else(|_| FETCH_RATE_LIMIT_PER_SEC.to_string())
                .parse()?,

            // Daily refresh by default.
            refresh_interval_secs: env::var("REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()?,

            starting_cash: env::var("STARTING_CASH")
                .unwrap_or_else(|_| STARTING_CASH.to_string())
                .parse()?,

            alert_cooldown_secs: env::var("ALERT_COOLDOWN_SECS")
                .unwrap_or_else(|_| ALERT_COOLDOWN_SECS.to_string())
                .parse()?,
            alert_rearm_when_clear: env::var("ALERT_REARM_WHEN_CLEAR")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
        };

        Ok(config)
    }

    pub fn quote_ttl(&self) -> Duration {
        Duration::seconds(self.quote_ttl_secs)
    }

    pub fn ledger_config(&self) -> portfolio_ledger::LedgerConfig {
        portfolio_ledger::LedgerConfig {
            starting_cash: self.starting_cash,
            quote_ttl: self.quote_ttl(),
        }
    }

    pub fn evaluator_config(&self) -> alert_engine::EvaluatorConfig {
        alert_engine::EvaluatorConfig {
            quote_ttl: self.quote_ttl(),
            cooldown: Duration::seconds(self.alert_cooldown_secs),
            rearm_when_clear: self.alert_rearm_when_clear,
        }
    }
}
