use crate::models::{AlertCriterion, AlertRule, AlertState, ChangeDirection};
use chrono::{DateTime, Duration, Utc};
use market_core::constants::{ALERT_COOLDOWN_SECS, QUOTE_TTL_SECS};
use market_core::QuoteSnapshot;

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Snapshots older than this are never acted on.
    pub quote_ttl: Duration,
    /// Quiet period after a fire.
    pub cooldown: Duration,
    /// Re-arm as soon as the condition is observed unsatisfied, instead of
    /// waiting out the full quiet period.
    pub rearm_when_clear: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            quote_ttl: Duration::seconds(QUOTE_TTL_SECS),
            cooldown: Duration::seconds(ALERT_COOLDOWN_SECS),
            rearm_when_clear: false,
        }
    }
}

/// Outcome of evaluating one rule against one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Nothing to do.
    None,
    /// The rule just transitioned into a satisfied condition.
    Fire,
    /// The condition cleared mid-cooldown and the rule should be re-armed.
    Rearm,
}

/// Decide whether a rule fires.
///
/// Pure: the same (rule, quote, portfolio value, now, config) always produces
/// the same decision. Fires only on the armed -> satisfied edge; while the
/// condition stays satisfied inside the cooldown window the answer is `None`,
/// which is what keeps one crossing from producing a notification storm.
pub fn evaluate(
    rule: &AlertRule,
    quote: &QuoteSnapshot,
    portfolio_value: Option<f64>,
    now: DateTime<Utc>,
    config: &EvaluatorConfig,
) -> TriggerDecision {
    // Never fire on stale data; the next refresh will re-evaluate.
    if !quote.is_fresh(config.quote_ttl, now) {
        return TriggerDecision::None;
    }

    let Some(criterion) = rule.criterion() else {
        return TriggerDecision::None;
    };
    let satisfied = condition_met(criterion, rule, quote, portfolio_value);

    match rule.state(now, config.cooldown) {
        AlertState::Armed => {
            if satisfied {
                TriggerDecision::Fire
            } else {
                TriggerDecision::None
            }
        }
        AlertState::TriggeredCooldown => {
            if !satisfied && config.rearm_when_clear {
                TriggerDecision::Rearm
            } else {
                TriggerDecision::None
            }
        }
    }
}

fn condition_met(
    criterion: AlertCriterion,
    rule: &AlertRule,
    quote: &QuoteSnapshot,
    portfolio_value: Option<f64>,
) -> bool {
    match criterion {
        AlertCriterion::PriceAbove => quote.price > rule.threshold,
        AlertCriterion::PriceBelow => quote.price < rule.threshold,
        AlertCriterion::PercentChangeDaily => match rule.direction() {
            ChangeDirection::Gain => quote.daily_change_pct > rule.threshold,
            ChangeDirection::Loss => quote.daily_change_pct < -rule.threshold,
            ChangeDirection::Either => quote.daily_change_pct.abs() > rule.threshold,
        },
        AlertCriterion::VolumeSpike => quote.volume as f64 > rule.threshold,
        // Missing indicator data never satisfies a rule.
        AlertCriterion::RsiOverbought => quote.rsi.map(|r| r > rule.threshold).unwrap_or(false),
        AlertCriterion::RsiOversold => quote.rsi.map(|r| r < rule.threshold).unwrap_or(false),
        AlertCriterion::PortfolioValueMilestone => portfolio_value
            .map(|v| v > rule.threshold)
            .unwrap_or(false),
    }
}
