use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// One row of the append-only transaction log. Never edited or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Option<i64>,
    pub user_id: i64,
    pub ticker: String,
    pub side: String, // "buy" or "sell"
    pub quantity: f64,
    pub price: f64,
    pub executed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: Option<i64>,
    pub username: String,
    pub email: String,
    pub created_at: Option<String>,
}

/// Derived position, produced by folding transactions in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub quantity: f64,
    pub average_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingValue {
    pub ticker: String,
    pub name: String,
    pub quantity: f64,
    pub average_cost: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub cost_basis: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percent: f64,
    pub daily_change_pct: f64,
    /// The price used is past its TTL; shown, but flagged.
    pub price_is_stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Valuation {
    pub cash: f64,
    pub market_value: f64,
    pub cost_basis: f64,
    pub unrealized_pnl: f64,
    pub total_value: f64,
    pub holdings: Vec<HoldingValue>,
}
