use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

/// SQLite-backed response cache keyed by request hash.
#[derive(Clone)]
pub struct AiCache {
    pool: SqlitePool,
}

impl AiCache {
    /// Wrap a pool, making sure the cache table exists.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ai_cache (
                query_hash TEXT PRIMARY KEY,
                response TEXT NOT NULL,
                cached_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// A cached response younger than `ttl`, if any.
    pub async fn get(&self, query_hash: &str, ttl: Duration) -> Result<Option<String>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT response, cached_at FROM ai_cache WHERE query_hash = ?")
                .bind(query_hash)
                .fetch_optional(&self.pool)
                .await?;

        let Some((response, cached_at)) = row else {
            return Ok(None);
        };

        let cached_at: DateTime<Utc> = cached_at.parse()?;
        if Utc::now() - cached_at < ttl {
            Ok(Some(response))
        } else {
            Ok(None)
        }
    }

    /// Store (or refresh) a response for a request hash.
    pub async fn put(&self, query_hash: &str, response: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_cache (query_hash, response, cached_at)
            VALUES (?, ?, ?)
            ON CONFLICT(query_hash) DO UPDATE SET
                response = excluded.response,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(query_hash)
        .bind(response)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_cache() -> AiCache {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        AiCache::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn hit_within_ttl() {
        let cache = setup_cache().await;
        cache.put("abc123", "cached text").await.unwrap();

        let hit = cache.get("abc123", Duration::hours(1)).await.unwrap();
        assert_eq!(hit.as_deref(), Some("cached text"));
    }

    #[tokio::test]
    async fn miss_for_unknown_hash() {
        let cache = setup_cache().await;
        assert!(cache
            .get("missing", Duration::hours(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_ignored() {
        let cache = setup_cache().await;
        let stale = (Utc::now() - Duration::hours(2)).to_rfc3339();
        sqlx::query("INSERT INTO ai_cache (query_hash, response, cached_at) VALUES (?, ?, ?)")
            .bind("old")
            .bind("stale text")
            .bind(&stale)
            .execute(&cache.pool)
            .await
            .unwrap();

        assert!(cache.get("old", Duration::hours(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_refreshes_existing_entry() {
        let cache = setup_cache().await;
        cache.put("abc123", "first").await.unwrap();
        cache.put("abc123", "second").await.unwrap();

        let hit = cache.get("abc123", Duration::hours(1)).await.unwrap();
        assert_eq!(hit.as_deref(), Some("second"));
    }
}
