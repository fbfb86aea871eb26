use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCriterion {
    PriceAbove,
    PriceBelow,
    PercentChangeDaily,
    VolumeSpike,
    RsiOverbought,
    RsiOversold,
    PortfolioValueMilestone,
}

impl AlertCriterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCriterion::PriceAbove => "price_above",
            AlertCriterion::PriceBelow => "price_below",
            AlertCriterion::PercentChangeDaily => "percent_change_daily",
            AlertCriterion::VolumeSpike => "volume_spike",
            AlertCriterion::RsiOverbought => "rsi_overbought",
            AlertCriterion::RsiOversold => "rsi_oversold",
            AlertCriterion::PortfolioValueMilestone => "portfolio_value_milestone",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "price_above" => Some(AlertCriterion::PriceAbove),
            "price_below" => Some(AlertCriterion::PriceBelow),
            "percent_change_daily" => Some(AlertCriterion::PercentChangeDaily),
            "volume_spike" => Some(AlertCriterion::VolumeSpike),
            "rsi_overbought" => Some(AlertCriterion::RsiOverbought),
            "rsi_oversold" => Some(AlertCriterion::RsiOversold),
            "portfolio_value_milestone" => Some(AlertCriterion::PortfolioValueMilestone),
            _ => None,
        }
    }

    /// Human-readable label for notifications.
    pub fn label(&self) -> &'static str {
        match self {
            AlertCriterion::PriceAbove => "Price Above Threshold",
            AlertCriterion::PriceBelow => "Price Below Threshold",
            AlertCriterion::PercentChangeDaily => "Daily % Change",
            AlertCriterion::VolumeSpike => "Volume Spike",
            AlertCriterion::RsiOverbought => "RSI Overbought",
            AlertCriterion::RsiOversold => "RSI Oversold",
            AlertCriterion::PortfolioValueMilestone => "Portfolio Value Milestone",
        }
    }
}

/// Which side of a percent-change move a rule watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    Gain,
    Loss,
    #[default]
    Either,
}

impl ChangeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeDirection::Gain => "gain",
            ChangeDirection::Loss => "loss",
            ChangeDirection::Either => "either",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "gain" => Some(ChangeDirection::Gain),
            "loss" => Some(ChangeDirection::Loss),
            "either" => Some(ChangeDirection::Either),
            _ => None,
        }
    }
}

/// Cooldown state of a rule, derived from `last_triggered_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Armed,
    TriggeredCooldown,
}

/// One user-defined alert rule.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlertRule {
    pub id: Option<i64>,
    pub user_id: i64,
    pub ticker: String,
    pub criterion: String,
    pub threshold: f64,
    pub direction: Option<String>,
    pub active: bool,
    pub created_at: Option<String>,
    pub last_triggered_at: Option<String>,
}

impl AlertRule {
    pub fn criterion(&self) -> Option<AlertCriterion> {
        AlertCriterion::parse(&self.criterion)
    }

    pub fn direction(&self) -> ChangeDirection {
        self.direction
            .as_deref()
            .and_then(ChangeDirection::parse)
            .unwrap_or_default()
    }

    pub fn last_triggered(&self) -> Option<DateTime<Utc>> {
        self.last_triggered_at
            .as_deref()
            .and_then(|s| s.parse().ok())
    }

    /// Armed, or still inside the quiet period after the last fire.
    pub fn state(&self, now: DateTime<Utc>, cooldown: Duration) -> AlertState {
        match self.last_triggered() {
            Some(at) if now - at < cooldown => AlertState::TriggeredCooldown,
            _ => AlertState::Armed,
        }
    }
}

/// Parameters for creating a rule.
#[derive(Debug, Clone)]
pub struct AlertInput {
    pub user_id: i64,
    pub ticker: String,
    pub criterion: AlertCriterion,
    pub threshold: f64,
    pub direction: Option<ChangeDirection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criterion_roundtrips() {
        for criterion in [
            AlertCriterion::PriceAbove,
            AlertCriterion::PriceBelow,
            AlertCriterion::PercentChangeDaily,
            AlertCriterion::VolumeSpike,
            AlertCriterion::RsiOverbought,
            AlertCriterion::RsiOversold,
            AlertCriterion::PortfolioValueMilestone,
        ] {
            assert_eq!(AlertCriterion::parse(criterion.as_str()), Some(criterion));
        }
        assert!(AlertCriterion::parse("macd_crossover").is_none());
    }

    #[test]
    fn state_follows_cooldown_window() {
        let now = Utc::now();
        let mut rule = AlertRule {
            id: Some(1),
            user_id: 1,
            ticker: "0700.HK".to_string(),
            criterion: "price_above".to_string(),
            threshold: 50.0,
            direction: None,
            active: true,
            created_at: None,
            last_triggered_at: None,
        };
        assert_eq!(rule.state(now, Duration::hours(24)), AlertState::Armed);

        rule.last_triggered_at = Some((now - Duration::hours(2)).to_rfc3339());
        assert_eq!(
            rule.state(now, Duration::hours(24)),
            AlertState::TriggeredCooldown
        );

        rule.last_triggered_at = Some((now - Duration::hours(25)).to_rfc3339());
        assert_eq!(rule.state(now, Duration::hours(24)), AlertState::Armed);
    }
}
