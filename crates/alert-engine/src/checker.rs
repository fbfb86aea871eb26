use crate::evaluator::{evaluate, EvaluatorConfig, TriggerDecision};
use crate::models::AlertRule;
use crate::store::AlertStore;
use anyhow::Result;
use chrono::Utc;
use market_core::QuoteSnapshot;
use notifier::{AlertContext, AlertNotification, CommentaryProvider, NotificationChannel};
use portfolio_ledger::{AccountManager, Ledger};
use quote_store::QuoteStore;
use std::sync::Arc;

/// Outcome counters for one check cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub users: usize,
    pub checked: usize,
    pub fired: usize,
    pub delivery_failures: usize,
    pub rearmed: usize,
    pub skipped_no_quote: usize,
}

/// Walks every user's active rules against the cached snapshots and
/// dispatches notifications for the ones that just triggered.
pub struct AlertChecker {
    store: AlertStore,
    accounts: AccountManager,
    ledger: Arc<Ledger>,
    quotes: QuoteStore,
    config: EvaluatorConfig,
}

impl AlertChecker {
    pub fn new(
        store: AlertStore,
        accounts: AccountManager,
        ledger: Arc<Ledger>,
        quotes: QuoteStore,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            store,
            accounts,
            ledger,
            quotes,
            config,
        }
    }

    pub fn store(&self) -> &AlertStore {
        &self.store
    }

    /// Run one full check cycle.
    ///
    /// The cooldown clock (`last_triggered_at`) advances only after the
    /// channel confirms delivery; a transport failure leaves the rule armed
    /// so the next cycle retries it. Commentary is best-effort and its
    /// absence never blocks a notification.
    pub async fn run_cycle(
        &self,
        channel: &dyn NotificationChannel,
        commentary: Option<&dyn CommentaryProvider>,
    ) -> Result<CycleStats> {
        let mut stats = CycleStats::default();
        let user_ids = self.store.users_with_active_alerts().await?;
        stats.users = user_ids.len();

        for user_id in user_ids {
            let Some(account) = self.accounts.get_account(user_id).await? else {
                tracing::warn!("Alerts reference unknown user {}, skipping", user_id);
                continue;
            };

            // Milestone rules need the portfolio value; a holding without a
            // cached price makes it unavailable, not zero.
            let portfolio_value = match self.ledger.valuation(user_id).await {
                Ok(valuation) => Some(valuation.total_value),
                Err(e) => {
                    tracing::warn!("Cannot value portfolio for user {}: {}", user_id, e);
                    None
                }
            };

            for rule in self.store.get_active_alerts(user_id).await? {
                stats.checked += 1;

                let Some(quote) = self.quotes.get(&rule.ticker).await? else {
                    tracing::warn!("No cached data for {}, skipping alert", rule.ticker);
                    stats.skipped_no_quote += 1;
                    continue;
                };

                let now = Utc::now();
                match evaluate(&rule, &quote, portfolio_value, now, &self.config) {
                    TriggerDecision::None => {}
                    TriggerDecision::Rearm => {
                        if let Some(id) = rule.id {
                            self.store.clear_trigger(id).await?;
                            stats.rearmed += 1;
                            tracing::debug!("Re-armed alert {} ({})", id, rule.ticker);
                        }
                    }
                    TriggerDecision::Fire => {
                        let context = build_context(&rule, &quote);
                        let commentary_text = match commentary {
                            Some(provider) => match provider.alert_commentary(&context).await {
                                Ok(text) => Some(text),
                                Err(e) => {
                                    tracing::warn!(
                                        "Commentary generation failed, sending template only: {}",
                                        e
                                    );
                                    None
                                }
                            },
                            None => None,
                        };

                        let notification = AlertNotification::new(&account.email, context)
                            .with_commentary(commentary_text);

                        match channel.send(&notification).await {
                            Ok(()) => {
                                if let Some(id) = rule.id {
                                    self.store.mark_triggered(id, now).await?;
                                }
                                stats.fired += 1;
                                tracing::info!(
                                    "Alert fired for {}: {} {}",
                                    account.email,
                                    rule.ticker,
                                    rule.criterion
                                );
                            }
                            Err(e) => {
                                // Rule stays armed; the next cycle retries.
                                stats.delivery_failures += 1;
                                tracing::warn!(
                                    "Delivery via {} failed for alert on {}: {}",
                                    channel.name(),
                                    rule.ticker,
                                    e
                                );
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(
            "Alert cycle: {} users, {} rules checked, {} fired, {} delivery failures",
            stats.users,
            stats.checked,
            stats.fired,
            stats.delivery_failures
        );
        Ok(stats)
    }
}

fn build_context(rule: &AlertRule, quote: &QuoteSnapshot) -> AlertContext {
    let criterion_label = rule
        .criterion()
        .map(|c| c.label().to_string())
        .unwrap_or_else(|| rule.criterion.clone());

    AlertContext {
        ticker: quote.ticker.clone(),
        name: quote.name.clone(),
        criterion_label,
        threshold: rule.threshold,
        price: quote.price,
        daily_change_pct: quote.daily_change_pct,
        volume: quote.volume,
        pe_ratio: quote.pe_ratio,
        beta: quote.beta,
        rsi: quote.rsi,
        triggered_at: quote.fetched_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertCriterion, AlertInput};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use notifier::NotificationError;
    use portfolio_ledger::{LedgerConfig, LedgerDb};
    use quote_store::QuoteDb;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    /// Channel double: records deliveries, optionally failing them.
    struct MockChannel {
        fail: AtomicBool,
        sent: Mutex<Vec<AlertNotification>>,
    }

    impl MockChannel {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
            }
        }

        async fn sent_count(&self) -> usize {
            self.sent.lock().await.len()
        }
    }

    #[async_trait]
    impl NotificationChannel for MockChannel {
        async fn send(&self, notification: &AlertNotification) -> Result<(), NotificationError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(NotificationError::Transport("mock outage".into()));
            }
            self.sent.lock().await.push(notification.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    struct FixedCommentary;

    #[async_trait]
    impl CommentaryProvider for FixedCommentary {
        async fn alert_commentary(&self, _context: &AlertContext) -> anyhow::Result<String> {
            Ok("momentum looks stretched".to_string())
        }
    }

    struct FailingCommentary;

    #[async_trait]
    impl CommentaryProvider for FailingCommentary {
        async fn alert_commentary(&self, _context: &AlertContext) -> anyhow::Result<String> {
            anyhow::bail!("model endpoint down")
        }
    }

    struct Fixture {
        checker: AlertChecker,
        quotes: QuoteStore,
        alert_id: i64,
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

    async fn setup(config: EvaluatorConfig) -> Fixture {
        let ledger_db = LedgerDb::new("sqlite::memory:").await.unwrap();
        let quotes = QuoteStore::new(QuoteDb::new("sqlite::memory:").await.unwrap());

        let accounts = AccountManager::new(ledger_db.clone());
        let user_id = accounts
            .create_account("trader", "trader@example.com")
            .await
            .unwrap();

        let ledger = Arc::new(Ledger::new(
            ledger_db.clone(),
            quotes.clone(),
            LedgerConfig::default(),
        ));

        let store = AlertStore::new(ledger_db.pool().clone());
        let alert_id = store
            .create_alert(AlertInput {
                user_id,
                ticker: "0700.HK".to_string(),
                criterion: AlertCriterion::PriceAbove,
                threshold: 50.0,
                direction: None,
            })
            .await
            .unwrap();

        Fixture {
            checker: AlertChecker::new(
                store,
                AccountManager::new(ledger_db),
                ledger,
                quotes.clone(),
                config,
            ),
            quotes,
            alert_id,
        }
    }

    #[tokio::test]
    async fn fires_once_per_crossing() {
        let fx = setup(EvaluatorConfig::default()).await;
        let channel = MockChannel::new();

        // Below threshold: quiet.
        fx.quotes
            .put(&snapshot("0700.HK", 45.0, Utc::now()))
            .await
            .unwrap();
        let stats = fx.checker.run_cycle(&channel, None).await.unwrap();
        assert_eq!(stats.fired, 0);

        // Crossing fires exactly once.
        fx.quotes
            .put(&snapshot("0700.HK", 55.0, Utc::now()))
            .await
            .unwrap();
        let stats = fx.checker.run_cycle(&channel, None).await.unwrap();
        assert_eq!(stats.fired, 1);
        assert_eq!(channel.sent_count().await, 1);

        // Still satisfied on the next poll: cooldown keeps it quiet.
        fx.quotes
            .put(&snapshot("0700.HK", 56.0, Utc::now()))
            .await
            .unwrap();
        let stats = fx.checker.run_cycle(&channel, None).await.unwrap();
        assert_eq!(stats.fired, 0);
        assert_eq!(channel.sent_count().await, 1);
    }

    #[tokio::test]
    async fn fires_again_after_cooldown_expiry() {
        let fx = setup(EvaluatorConfig::default()).await;
        let channel = MockChannel::new();

        fx.quotes
            .put(&snapshot("0700.HK", 55.0, Utc::now()))
            .await
            .unwrap();
        fx.checker.run_cycle(&channel, None).await.unwrap();

        // Pretend the fire happened 25 hours ago.
        let stale_mark = (Utc::now() - Duration::hours(25)).to_rfc3339();
        sqlx::query("UPDATE alerts SET last_triggered_at = ? WHERE id = ?")
            .bind(&stale_mark)
            .bind(fx.alert_id)
            .execute(fx.checker.store().pool())
            .await
            .unwrap();

        fx.quotes
            .put(&snapshot("0700.HK", 60.0, Utc::now()))
            .await
            .unwrap();
        let stats = fx.checker.run_cycle(&channel, None).await.unwrap();
        assert_eq!(stats.fired, 1);
        assert_eq!(channel.sent_count().await, 2);
    }

    #[tokio::test]
    async fn delivery_failure_leaves_rule_armed() {
        let fx = setup(EvaluatorConfig::default()).await;
        let channel = MockChannel::new();
        channel.fail.store(true, Ordering::SeqCst);

        fx.quotes
            .put(&snapshot("0700.HK", 55.0, Utc::now()))
            .await
            .unwrap();
        let stats = fx.checker.run_cycle(&channel, None).await.unwrap();
        assert_eq!(stats.fired, 0);
        assert_eq!(stats.delivery_failures, 1);

        let rule = fx.checker.store().get_alert(fx.alert_id).await.unwrap().unwrap();
        assert!(rule.last_triggered_at.is_none());

        // Transport recovers: the same crossing is retried and delivered.
        channel.fail.store(false, Ordering::SeqCst);
        let stats = fx.checker.run_cycle(&channel, None).await.unwrap();
        assert_eq!(stats.fired, 1);
        assert_eq!(channel.sent_count().await, 1);
    }

    #[tokio::test]
    async fn rearm_policy_clears_trigger_mid_cooldown() {
        let fx = setup(EvaluatorConfig {
            rearm_when_clear: true,
            ..EvaluatorConfig::default()
        })
        .await;
        let channel = MockChannel::new();

        fx.quotes
            .put(&snapshot("0700.HK", 55.0, Utc::now()))
            .await
            .unwrap();
        fx.checker.run_cycle(&channel, None).await.unwrap();
        assert_eq!(channel.sent_count().await, 1);

        // Condition clears: the rule re-arms without waiting 24h.
        fx.quotes
            .put(&snapshot("0700.HK", 45.0, Utc::now()))
            .await
            .unwrap();
        let stats = fx.checker.run_cycle(&channel, None).await.unwrap();
        assert_eq!(stats.rearmed, 1);

        fx.quotes
            .put(&snapshot("0700.HK", 60.0, Utc::now()))
            .await
            .unwrap();
        let stats = fx.checker.run_cycle(&channel, None).await.unwrap();
        assert_eq!(stats.fired, 1);
        assert_eq!(channel.sent_count().await, 2);
    }

    #[tokio::test]
    async fn commentary_failure_degrades_to_template() {
        let fx = setup(EvaluatorConfig::default()).await;
        let channel = MockChannel::new();

        fx.quotes
            .put(&snapshot("0700.HK", 55.0, Utc::now()))
            .await
            .unwrap();
        let stats = fx
            .checker
            .run_cycle(&channel, Some(&FailingCommentary))
            .await
            .unwrap();
        assert_eq!(stats.fired, 1);

        let sent = channel.sent.lock().await;
        assert!(sent[0].commentary.is_none());
    }

    #[tokio::test]
    async fn commentary_is_attached_when_available() {
        let fx = setup(EvaluatorConfig::default()).await;
        let channel = MockChannel::new();

        fx.quotes
            .put(&snapshot("0700.HK", 55.0, Utc::now()))
            .await
            .unwrap();
        fx.checker
            .run_cycle(&channel, Some(&FixedCommentary))
            .await
            .unwrap();

        let sent = channel.sent.lock().await;
        assert_eq!(
            sent[0].commentary.as_deref(),
            Some("momentum looks stretched")
        );
        assert_eq!(sent[0].to, "trader@example.com");
    }

    #[tokio::test]
    async fn missing_quote_skips_rule() {
        let fx = setup(EvaluatorConfig::default()).await;
        let channel = MockChannel::new();

        let stats = fx.checker.run_cycle(&channel, None).await.unwrap();
        assert_eq!(stats.skipped_no_quote, 1);
        assert_eq!(stats.fired, 0);
        assert_eq!(channel.sent_count().await, 0);
    }
}
