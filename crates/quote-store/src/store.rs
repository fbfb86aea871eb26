use crate::db::QuoteDb;
use anyhow::Result;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use dashmap::DashMap;
use market_core::QuoteSnapshot;
use std::sync::Arc;

/// Result of a freshness-aware cache read.
///
/// Stale snapshots are always handed back rather than hidden; the caller
/// decides whether to trigger a refresh or keep serving the old data.
#[derive(Debug, Clone)]
pub enum QuoteLookup {
    Fresh(QuoteSnapshot),
    Stale(QuoteSnapshot),
    Miss,
}

impl QuoteLookup {
    pub fn snapshot(&self) -> Option<&QuoteSnapshot> {
        match self {
            QuoteLookup::Fresh(s) | QuoteLookup::Stale(s) => Some(s),
            QuoteLookup::Miss => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, QuoteLookup::Fresh(_))
    }
}

/// Persistent per-ticker snapshot cache with an in-memory read layer.
///
/// Writes land in SQLite before the hot layer is touched, so a crash mid-put
/// loses only that refresh. Entries are never evicted; expiry is purely
/// logical and reported through [`QuoteStore::lookup`].
#[derive(Clone)]
pub struct QuoteStore {
    db: QuoteDb,
    hot: Arc<DashMap<String, QuoteSnapshot>>,
}

impl QuoteStore {
    pub fn new(db: QuoteDb) -> Self {
        Self {
            db,
            hot: Arc::new(DashMap::new()),
        }
    }

    /// Store a snapshot; last write wins by `fetched_at`.
    ///
    /// An older snapshot never clobbers a newer one, in the database or in
    /// memory, so concurrent refreshes of the same ticker are safe.
    pub async fn put(&self, snapshot: &QuoteSnapshot) -> Result<()> {
        let data = serde_json::to_string(snapshot)?;

        let result = sqlx::query(
            r#"
            INSERT INTO quote_cache (ticker, data, fetched_at)
            VALUES (?, ?, ?)
            ON CONFLICT(ticker) DO UPDATE SET
                data = excluded.data,
                fetched_at = excluded.fetched_at
            WHERE excluded.fetched_at > quote_cache.fetched_at
            "#,
        )
        .bind(&snapshot.ticker)
        .bind(&data)
        .bind(timestamp(snapshot.fetched_at))
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                "Ignored put for {}: a newer snapshot is already cached",
                snapshot.ticker
            );
        }

        match self.hot.entry(snapshot.ticker.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if snapshot.fetched_at > entry.get().fetched_at {
                    entry.insert(snapshot.clone());
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(snapshot.clone());
            }
        }

        Ok(())
    }

    /// Read the current snapshot, if any. Never touches the network.
    pub async fn get(&self, ticker: &str) -> Result<Option<QuoteSnapshot>> {
        if let Some(snapshot) = self.hot.get(ticker) {
            return Ok(Some(snapshot.clone()));
        }

        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM quote_cache WHERE ticker = ?")
                .bind(ticker)
                .fetch_optional(self.db.pool())
                .await?;

        match row {
            Some((data,)) => {
                let snapshot: QuoteSnapshot = serde_json::from_str(&data)?;
                self.hot.insert(ticker.to_string(), snapshot.clone());
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Read with freshness classification against `ttl`.
    pub async fn lookup(
        &self,
        ticker: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<QuoteLookup> {
        match self.get(ticker).await? {
            Some(snapshot) if snapshot.is_fresh(ttl, now) => Ok(QuoteLookup::Fresh(snapshot)),
            Some(snapshot) => Ok(QuoteLookup::Stale(snapshot)),
            None => Ok(QuoteLookup::Miss),
        }
    }

    /// Whether the cached snapshot (if any) is within its TTL.
    pub async fn is_fresh(&self, ticker: &str, ttl: Duration) -> Result<bool> {
        Ok(self.lookup(ticker, ttl, Utc::now()).await?.is_fresh())
    }

    /// All tickers that have ever been cached.
    pub async fn tickers(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT ticker FROM quote_cache ORDER BY ticker")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.into_iter().map(|(t,)| t).collect())
    }
}

/// Fixed-width UTC timestamp so lexicographic order matches chronology.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
