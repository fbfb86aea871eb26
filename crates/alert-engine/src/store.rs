use crate::models::{AlertInput, AlertRule};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

/// CRUD over the alerts table.
#[derive(Clone)]
pub struct AlertStore {
    pool: SqlitePool,
}

impl AlertStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a new alert rule, armed by default.
    pub async fn create_alert(&self, input: AlertInput) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO alerts (user_id, ticker, criterion, threshold, direction, active, created_at)
            VALUES (?, ?, ?, ?, ?, 1, ?)
            RETURNING id
            "#,
        )
        .bind(input.user_id)
        .bind(&input.ticker)
        .bind(input.criterion.as_str())
        .bind(input.threshold)
        .bind(input.direction.map(|d| d.as_str()))
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get_alert(&self, id: i64) -> Result<Option<AlertRule>> {
        let alert = sqlx::query_as::<_, AlertRule>("SELECT * FROM alerts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(alert)
    }

    /// Active rules for one user, newest first.
    pub async fn get_active_alerts(&self, user_id: i64) -> Result<Vec<AlertRule>> {
        let alerts = sqlx::query_as::<_, AlertRule>(
            r#"
            SELECT * FROM alerts
            WHERE user_id = ? AND active = 1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }

    /// All rules for one user, active or not.
    pub async fn get_all_alerts(&self, user_id: i64) -> Result<Vec<AlertRule>> {
        let alerts = sqlx::query_as::<_, AlertRule>(
            "SELECT * FROM alerts WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }

    /// Distinct users that currently have active rules.
    pub async fn users_with_active_alerts(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT DISTINCT user_id FROM alerts WHERE active = 1 ORDER BY user_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Tickers referenced by any active rule.
    pub async fn active_tickers(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT ticker FROM alerts WHERE active = 1 ORDER BY ticker")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    pub async fn deactivate_alert(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE alerts SET active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_alert(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM alerts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record a confirmed delivery; starts the cooldown clock.
    pub async fn mark_triggered(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE alerts SET last_triggered_at = ? WHERE id = ?")
            .bind(at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Re-arm a rule by clearing its trigger timestamp.
    pub async fn clear_trigger(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE alerts SET last_triggered_at = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
