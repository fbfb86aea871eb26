use crate::db::LedgerDb;
use crate::error::LedgerError;
use crate::models::*;
use chrono::{Duration, SecondsFormat, Utc};
use dashmap::DashMap;
use market_core::constants::{QUOTE_TTL_SECS, STARTING_CASH};
use quote_store::{QuoteLookup, QuoteStore};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Quantities below this are treated as a closed position.
const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub starting_cash: f64,
    pub quote_ttl: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_cash: STARTING_CASH,
            quote_ttl: Duration::seconds(QUOTE_TTL_SECS),
        }
    }
}

/// Mock-trading ledger over an append-only transaction log.
///
/// Cash and holdings are always derived by folding the log, so the balance
/// can never drift from the transaction history. Executions for one user are
/// serialized through a per-user mutex; the lock is never held across a
/// network call (the ledger reads only the local quote cache).
pub struct Ledger {
    db: LedgerDb,
    quotes: QuoteStore,
    config: LedgerConfig,
    user_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Ledger {
    pub fn new(db: LedgerDb, quotes: QuoteStore, config: LedgerConfig) -> Self {
        Self {
            db,
            quotes,
            config,
            user_locks: DashMap::new(),
        }
    }

    pub fn db(&self) -> &LedgerDb {
        &self.db
    }

    /// Execute a buy or sell at the current cached price.
    ///
    /// Either exactly one transaction row is appended or nothing is written.
    /// A stale or missing quote rejects the trade; callers force a refresh
    /// and retry rather than trading on an unknown price.
    pub async fn execute(
        &self,
        user_id: i64,
        ticker: &str,
        side: TradeSide,
        quantity: f64,
    ) -> Result<Transaction, LedgerError> {
        if quantity <= 0.0 || !quantity.is_finite() {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.ensure_user(user_id).await?;

        let price = match self
            .quotes
            .lookup(ticker, self.config.quote_ttl, Utc::now())
            .await?
        {
            QuoteLookup::Fresh(snapshot) => snapshot.price,
            QuoteLookup::Stale(_) => return Err(LedgerError::StaleQuote(ticker.to_string())),
            QuoteLookup::Miss => return Err(LedgerError::QuoteMiss(ticker.to_string())),
        };

        let log = self.transactions_in_order(user_id).await?;
        match side {
            TradeSide::Buy => {
                let cost = quantity * price;
                let cash = derive_cash(self.config.starting_cash, &log);
                if cost > cash {
                    return Err(LedgerError::InsufficientFunds {
                        needed: cost,
                        available: cash,
                    });
                }
            }
            TradeSide::Sell => {
                let holdings = fold_holdings(&log);
                let held = holdings.get(ticker).map(|h| h.quantity).unwrap_or(0.0);
                if quantity > held + QUANTITY_EPSILON {
                    return Err(LedgerError::InsufficientHoldings {
                        ticker: ticker.to_string(),
                        held,
                        requested: quantity,
                    });
                }
            }
        }

        let executed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO transactions (user_id, ticker, side, quantity, price, executed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(ticker)
        .bind(side.as_str())
        .bind(quantity)
        .bind(price)
        .bind(&executed_at)
        .fetch_one(self.db.pool())
        .await?;

        tracing::info!(
            "User {} {} {} x {} @ {:.2}",
            user_id,
            side.as_str(),
            quantity,
            ticker,
            price
        );

        Ok(Transaction {
            id: Some(id),
            user_id,
            ticker: ticker.to_string(),
            side: side.as_str().to_string(),
            quantity,
            price,
            executed_at,
        })
    }

    /// Cash on hand, derived from the starting balance and the full log.
    pub async fn cash_balance(&self, user_id: i64) -> Result<f64, LedgerError> {
        self.ensure_user(user_id).await?;
        let log = self.transactions_in_order(user_id).await?;
        Ok(derive_cash(self.config.starting_cash, &log))
    }

    /// Current holdings, derived from the full log.
    pub async fn holdings(&self, user_id: i64) -> Result<Vec<Holding>, LedgerError> {
        self.ensure_user(user_id).await?;
        let log = self.transactions_in_order(user_id).await?;
        let mut holdings: Vec<Holding> = fold_holdings(&log).into_values().collect();
        holdings.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(holdings)
    }

    /// Value the portfolio at current cached prices.
    ///
    /// A stale price is used but flagged per holding; a missing price is a
    /// hard error, never silently treated as zero.
    pub async fn valuation(&self, user_id: i64) -> Result<Valuation, LedgerError> {
        let cash = self.cash_balance(user_id).await?;
        let holdings = self.holdings(user_id).await?;

        let now = Utc::now();
        let mut valued = Vec::with_capacity(holdings.len());
        let mut market_value = Decimal::ZERO;
        let mut cost_basis = Decimal::ZERO;

        for holding in holdings {
            let lookup = self
                .quotes
                .lookup(&holding.ticker, self.config.quote_ttl, now)
                .await?;
            let (snapshot, price_is_stale) = match lookup {
                QuoteLookup::Fresh(s) => (s, false),
                QuoteLookup::Stale(s) => (s, true),
                QuoteLookup::Miss => {
                    return Err(LedgerError::QuoteMiss(holding.ticker.clone()));
                }
            };

            let quantity = Decimal::from_f64(holding.quantity).unwrap_or_default();
            let current_price = Decimal::from_f64(snapshot.price).unwrap_or_default();
            let average_cost = Decimal::from_f64(holding.average_cost).unwrap_or_default();

            let value = quantity * current_price;
            let cost = quantity * average_cost;
            let pnl = value - cost;
            let pnl_percent = if cost > Decimal::ZERO {
                ((pnl / cost) * Decimal::from(100)).to_f64().unwrap_or(0.0)
            } else {
                0.0
            };

            market_value += value;
            cost_basis += cost;

            valued.push(HoldingValue {
                ticker: holding.ticker,
                name: snapshot.name,
                quantity: holding.quantity,
                average_cost: holding.average_cost,
                current_price: snapshot.price,
                market_value: value.to_f64().unwrap_or(0.0),
                cost_basis: cost.to_f64().unwrap_or(0.0),
                unrealized_pnl: pnl.to_f64().unwrap_or(0.0),
                unrealized_pnl_percent: pnl_percent,
                daily_change_pct: snapshot.daily_change_pct,
                price_is_stale,
            });
        }

        let market_value = market_value.to_f64().unwrap_or(0.0);
        let cost_basis = cost_basis.to_f64().unwrap_or(0.0);

        Ok(Valuation {
            cash,
            market_value,
            cost_basis,
            unrealized_pnl: market_value - cost_basis,
            total_value: cash + market_value,
            holdings: valued,
        })
    }

    /// Transaction history, newest first.
    pub async fn transactions(
        &self,
        user_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let transactions = if let Some(limit) = limit {
            sqlx::query_as::<_, Transaction>(
                "SELECT * FROM transactions WHERE user_id = ? ORDER BY executed_at DESC, id DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?
        } else {
            sqlx::query_as::<_, Transaction>(
                "SELECT * FROM transactions WHERE user_id = ? ORDER BY executed_at DESC, id DESC",
            )
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?
        };

        Ok(transactions)
    }

    /// Every ticker that appears in any user's log. Used for refresh planning.
    pub async fn traded_tickers(&self) -> Result<Vec<String>, LedgerError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT ticker FROM transactions ORDER BY ticker")
                .fetch_all(self.db.pool())
                .await?;

        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    async fn transactions_in_order(&self, user_id: i64) -> Result<Vec<Transaction>, LedgerError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE user_id = ? ORDER BY executed_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(transactions)
    }

    async fn ensure_user(&self, user_id: i64) -> Result<(), LedgerError> {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        if exists.is_none() {
            return Err(LedgerError::UnknownUser(user_id));
        }
        Ok(())
    }

    fn user_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Fold the log into per-ticker holdings, in execution order.
///
/// Buys move the average cost; sells reduce quantity at the standing average.
/// Sell preconditions are enforced before append, so quantities stay
/// non-negative here.
pub fn fold_holdings(log: &[Transaction]) -> HashMap<String, Holding> {
    let mut holdings: HashMap<String, Holding> = HashMap::new();

    for tx in log {
        let side = match TradeSide::parse(&tx.side) {
            Some(side) => side,
            None => continue,
        };
        let entry = holdings.entry(tx.ticker.clone()).or_insert_with(|| Holding {
            ticker: tx.ticker.clone(),
            quantity: 0.0,
            average_cost: 0.0,
        });

        match side {
            TradeSide::Buy => {
                let new_quantity = entry.quantity + tx.quantity;
                entry.average_cost = (entry.quantity * entry.average_cost
                    + tx.quantity * tx.price)
                    / new_quantity;
                entry.quantity = new_quantity;
            }
            TradeSide::Sell => {
                entry.quantity = (entry.quantity - tx.quantity).max(0.0);
            }
        }
    }

    holdings.retain(|_, h| h.quantity > QUANTITY_EPSILON);
    holdings
}

/// Derive cash from the starting balance and the log.
pub fn derive_cash(starting_cash: f64, log: &[Transaction]) -> f64 {
    let mut cash = Decimal::from_f64(starting_cash).unwrap_or_default();

    for tx in log {
        let amount = Decimal::from_f64(tx.quantity).unwrap_or_default()
            * Decimal::from_f64(tx.price).unwrap_or_default();
        match TradeSide::parse(&tx.side) {
            Some(TradeSide::Buy) => cash -= amount,
            Some(TradeSide::Sell) => cash += amount,
            None => {}
        }
    }

    cash.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountManager;
    use chrono::{DateTime, Utc};
    use market_core::QuoteSnapshot;
    use quote_store::QuoteDb;

    struct Fixture {
        ledger: Ledger,
        quotes: QuoteStore,
        user_id: i64,
    }

    fn snapshot(ticker: &str, price: f64, fetched_at: DateTime<Utc>) -> QuoteSnapshot {
        QuoteSnapshot {
            ticker: ticker.to_string(),
            name: market_core::constants::stock_name(ticker).to_string(),
            price,
            previous_close: price,
            daily_change_pct: 0.0,
            volume: 1_000_000,
            pe_ratio: None,
            beta: Some(1.0),
            rsi: Some(50.0),
            volatility: Some(20.0),
            high_52w: None,
            low_52w: None,
            fetched_at,
        }
    }

    async fn setup() -> Fixture {
        let ledger_db = LedgerDb::new("sqlite::memory:").await.unwrap();
        let quote_db = QuoteDb::new("sqlite::memory:").await.unwrap();
        let quotes = QuoteStore::new(quote_db);

        let accounts = AccountManager::new(ledger_db.clone());
        let user_id = accounts
            .create_account("trader", "trader@example.com")
            .await
            .unwrap();

        Fixture {
            ledger: Ledger::new(ledger_db, quotes.clone(), LedgerConfig::default()),
            quotes,
            user_id,
        }
    }

    #[tokio::test]
    async fn buy_then_oversell_then_sell_back() {
        let fx = setup().await;
        fx.quotes
            .put(&snapshot("0700.HK", 100.0, Utc::now()))
            .await
            .unwrap();

        // Buy 1,000 units at 100: balance drops to 900,000.
        fx.ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Buy, 1_000.0)
            .await
            .unwrap();
        let cash = fx.ledger.cash_balance(fx.user_id).await.unwrap();
        assert!((cash - 900_000.0).abs() < 1e-6);

        // Selling 1,001 must fail and append nothing.
        let err = fx
            .ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Sell, 1_001.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientHoldings { .. }));
        let log = fx.ledger.transactions(fx.user_id, None).await.unwrap();
        assert_eq!(log.len(), 1);

        // Sell the 1,000 back at 110: realized gain lands in cash.
        fx.quotes
            .put(&snapshot("0700.HK", 110.0, Utc::now()))
            .await
            .unwrap();
        fx.ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Sell, 1_000.0)
            .await
            .unwrap();

        let valuation = fx.ledger.valuation(fx.user_id).await.unwrap();
        assert!(valuation.holdings.is_empty());
        assert!((valuation.total_value - 1_010_000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn buy_requires_cash() {
        let fx = setup().await;
        fx.quotes
            .put(&snapshot("0700.HK", 100.0, Utc::now()))
            .await
            .unwrap();

        let err = fx
            .ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Buy, 20_000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert!(fx
            .ledger
            .transactions(fx.user_id, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn stale_quote_blocks_trading() {
        let fx = setup().await;
        fx.quotes
            .put(&snapshot(
                "0700.HK",
                100.0,
                Utc::now() - Duration::hours(30),
            ))
            .await
            .unwrap();

        let err = fx
            .ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Buy, 10.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::StaleQuote(_)));
    }

    #[tokio::test]
    async fn missing_quote_blocks_trading() {
        let fx = setup().await;
        let err = fx
            .ledger
            .execute(fx.user_id, "0005.HK", TradeSide::Buy, 10.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::QuoteMiss(_)));
    }

    #[tokio::test]
    async fn zero_quantity_rejected() {
        let fx = setup().await;
        let err = fx
            .ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Buy, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity(_)));
    }

    #[tokio::test]
    async fn buys_average_the_cost() {
        let fx = setup().await;
        fx.quotes
            .put(&snapshot("0700.HK", 100.0, Utc::now()))
            .await
            .unwrap();
        fx.ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Buy, 100.0)
            .await
            .unwrap();

        fx.quotes
            .put(&snapshot("0700.HK", 110.0, Utc::now()))
            .await
            .unwrap();
        fx.ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Buy, 100.0)
            .await
            .unwrap();

        let holdings = fx.ledger.holdings(fx.user_id).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert!((holdings[0].quantity - 200.0).abs() < 1e-9);
        assert!((holdings[0].average_cost - 105.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn concurrent_sells_cannot_go_negative() {
        let fx = setup().await;
        fx.quotes
            .put(&snapshot("0700.HK", 100.0, Utc::now()))
            .await
            .unwrap();
        fx.ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Buy, 1_000.0)
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            fx.ledger
                .execute(fx.user_id, "0700.HK", TradeSide::Sell, 600.0),
            fx.ledger
                .execute(fx.user_id, "0700.HK", TradeSide::Sell, 600.0),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

        let holdings = fx.ledger.holdings(fx.user_id).await.unwrap();
        assert!((holdings[0].quantity - 400.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn valuation_flags_stale_prices() {
        let fx = setup().await;
        fx.quotes
            .put(&snapshot("0700.HK", 100.0, Utc::now()))
            .await
            .unwrap();
        fx.ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Buy, 10.0)
            .await
            .unwrap();

        // Same store viewed through a zero TTL: every price is now stale.
        let strict = Ledger::new(
            fx.ledger.db().clone(),
            fx.quotes.clone(),
            LedgerConfig {
                quote_ttl: Duration::zero(),
                ..LedgerConfig::default()
            },
        );
        let valuation = strict.valuation(fx.user_id).await.unwrap();
        assert!(valuation.holdings[0].price_is_stale);
        assert!((valuation.holdings[0].market_value - 1_000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn valuation_reports_missing_quotes_distinctly() {
        let fx = setup().await;
        fx.quotes
            .put(&snapshot("0700.HK", 100.0, Utc::now()))
            .await
            .unwrap();
        fx.ledger
            .execute(fx.user_id, "0700.HK", TradeSide::Buy, 10.0)
            .await
            .unwrap();

        // A ledger pointed at an empty store must not value the holding at zero.
        let empty_quotes = QuoteStore::new(QuoteDb::new("sqlite::memory:").await.unwrap());
        let blind = Ledger::new(
            fx.ledger.db().clone(),
            empty_quotes,
            LedgerConfig::default(),
        );
        let err = blind.valuation(fx.user_id).await.unwrap_err();
        assert!(matches!(err, LedgerError::QuoteMiss(_)));
    }
}
