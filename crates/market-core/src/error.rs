use thiserror::Error;

/// Market-data fetch errors. `FetchTransient` is retryable, `FetchFatal` is not.
#[derive(Error, Debug, Clone)]
pub enum MarketError {
    #[error("Transient fetch error for {ticker}: {reason}")]
    FetchTransient { ticker: String, reason: String },

    #[error("Fatal fetch error for {ticker}: {reason}")]
    FetchFatal { ticker: String, reason: String },

    #[error("Parse error for {ticker}: {reason}")]
    Parse { ticker: String, reason: String },

    #[error("API error: {0}")]
    Api(String),
}

impl MarketError {
    /// Whether another attempt could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, MarketError::FetchTransient { .. })
    }
}
