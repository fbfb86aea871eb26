use alphavantage_client::AlphaVantageClient;
use anyhow::Result;
use chrono::Duration;
use quote_store::QuoteStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct RefreshStats {
    pub requested: usize,
    pub already_fresh: usize,
    pub refreshed: usize,
    pub failed: usize,
}

/// Refresh the snapshots for `tickers` that are stale or missing.
///
/// Fresh entries are skipped entirely, keeping daily runs cheap. A failed
/// fetch is logged and the previous snapshot, if any, simply remains
/// servable; partial batch results are always persisted.
pub async fn refresh_quotes(
    client: &AlphaVantageClient,
    store: &QuoteStore,
    tickers: &[String],
    ttl: Duration,
) -> Result<RefreshStats> {
    let mut stats = RefreshStats {
        requested: tickers.len(),
        ..RefreshStats::default()
    };

    let to_fetch = partition_stale(store, tickers, ttl).await?;
    stats.already_fresh = tickers.len() - to_fetch.len();

    if to_fetch.is_empty() {
        tracing::info!("All {} quotes fresh, nothing to fetch", tickers.len());
        return Ok(stats);
    }

    tracing::info!(
        "Refreshing {} of {} quotes",
        to_fetch.len(),
        tickers.len()
    );
    let results = client.fetch_batch(&to_fetch).await;

    for (ticker, result) in results {
        match result {
            Ok(snapshot) => {
                store.put(&snapshot).await?;
                stats.refreshed += 1;
            }
            Err(e) => {
                stats.failed += 1;
                if store.get(&ticker).await?.is_some() {
                    tracing::warn!("Refresh of {} failed ({}), serving stale data", ticker, e);
                } else {
                    tracing::warn!("Refresh of {} failed ({}), no data available", ticker, e);
                }
            }
        }
    }

    Ok(stats)
}

/// The subset of `tickers` whose cached snapshot is stale or missing.
async fn partition_stale(
    store: &QuoteStore,
    tickers: &[String],
    ttl: Duration,
) -> Result<Vec<String>> {
    let mut stale = Vec::new();
    for ticker in tickers {
        if !store.is_fresh(ticker, ttl).await? {
            stale.push(ticker.clone());
        }
    }
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use market_core::QuoteSnapshot;
    use quote_store::QuoteDb;

    fn snapshot(ticker: &str, age_hours: i64) -> QuoteSnapshot {
        QuoteSnapshot {
            ticker: ticker.to_string(),
            name: ticker.to_string(),
            price: 100.0,
            previous_close: 100.0,
            daily_change_pct: 0.0,
            volume: 1,
            pe_ratio: None,
            beta: None,
            rsi: None,
            volatility: None,
            high_52w: None,
            low_52w: None,
            fetched_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    #[tokio::test]
    async fn only_stale_or_missing_tickers_are_selected() {
        let store = QuoteStore::new(QuoteDb::new("sqlite::memory:").await.unwrap());
        store.put(&snapshot("0700.HK", 1)).await.unwrap();
        store.put(&snapshot("0005.HK", 30)).await.unwrap();

        let tickers = vec![
            "0700.HK".to_string(),
            "0005.HK".to_string(),
            "9988.HK".to_string(),
        ];
        let stale = partition_stale(&store, &tickers, Duration::hours(24))
            .await
            .unwrap();

        assert_eq!(stale, vec!["0005.HK".to_string(), "9988.HK".to_string()]);
    }
}
