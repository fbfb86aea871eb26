use crate::db::LedgerDb;
use crate::models::Account;
use anyhow::{anyhow, Result};

/// Account creation and lookup. Auth mechanics live outside this service;
/// an account row is only the anchor for a ledger.
pub struct AccountManager {
    db: LedgerDb,
}

impl AccountManager {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Create a new account. Usernames are unique.
    ///
    /// This is the single seed point for a user's ledger: the starting cash
    /// constant applies from here on and is never re-seeded.
    pub async fn create_account(&self, username: &str, email: &str) -> Result<i64> {
        if username.trim().is_empty() {
            return Err(anyhow!("username must not be empty"));
        }

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO users (username, email, created_at)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(chrono::Utc::now().to_rfc3339())
        .fetch_one(self.db.pool())
        .await?;

        tracing::info!("Created account {} for {}", id, username);
        Ok(id)
    }

    pub async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(account)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(account)
    }
}
