use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(f64),

    #[error("Insufficient cash: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Insufficient holdings of {ticker}: hold {held}, tried to sell {requested}")]
    InsufficientHoldings {
        ticker: String,
        held: f64,
        requested: f64,
    },

    #[error("Quote for {0} is stale; refresh it before trading")]
    StaleQuote(String),

    #[error("No cached quote for {0}")]
    QuoteMiss(String),

    #[error("Unknown user: {0}")]
    UnknownUser(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        LedgerError::Cache(err.to_string())
    }
}
