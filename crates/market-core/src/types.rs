use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One market snapshot for a ticker, immutable once built.
///
/// A newer fetch supersedes the previous snapshot for the same ticker; nothing
/// ever mutates an existing one. Optional fields are data the provider's free
/// tier may not supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub ticker: String,
    pub name: String,
    pub price: f64,
    pub previous_close: f64,
    pub daily_change_pct: f64,
    pub volume: i64,
    pub pe_ratio: Option<f64>,
    pub beta: Option<f64>,
    pub rsi: Option<f64>,
    pub volatility: Option<f64>,
    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

impl QuoteSnapshot {
    /// Age of this snapshot relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    /// True while the snapshot is within its time-to-live.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) <= ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(fetched_at: DateTime<Utc>) -> QuoteSnapshot {
        QuoteSnapshot {
            ticker: "0700.HK".to_string(),
            name: "Tencent Holdings".to_string(),
            price: 350.0,
            previous_close: 345.0,
            daily_change_pct: 1.45,
            volume: 12_000_000,
            pe_ratio: None,
            beta: Some(1.0),
            rsi: Some(55.0),
            volatility: Some(28.5),
            high_52w: Some(400.0),
            low_52w: Some(250.0),
            fetched_at,
        }
    }

    #[test]
    fn freshness_respects_ttl() {
        let now = Utc::now();
        let snap = snapshot(now - Duration::hours(2));

        assert!(snap.is_fresh(Duration::hours(24), now));
        assert!(!snap.is_fresh(Duration::hours(1), now));
    }

    #[test]
    fn snapshot_roundtrips_through_json() {
        let snap = snapshot(Utc::now());
        let json = serde_json::to_string(&snap).unwrap();
        let back: QuoteSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
    }
}
