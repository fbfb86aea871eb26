pub mod constants;
pub mod error;
pub mod indicators;
pub mod types;

pub use error::MarketError;
pub use types::QuoteSnapshot;
