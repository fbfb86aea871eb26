use chrono::Utc;
use futures_util::future::join_all;
use market_core::constants::{stock_name, FETCH_RATE_LIMIT_PER_SEC, RSI_PERIOD, SESSIONS_PER_YEAR};
use market_core::{indicators, MarketError, QuoteSnapshot};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Total attempts per ticker, including the first.
const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
///
/// Admission is serialized; callers queue on the internal mutex and sleep until
/// the oldest timestamp falls out of the window. Requests are paced, never
/// dropped.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let wait_until = match ts.front().and_then(|f| f.checked_add(self.window)) {
                Some(t) => t,
                None => now,
            };
            let sleep_dur = wait_until.duration_since(now) + Duration::from_millis(10);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.2}s for an Alpha Vantage slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Exponential backoff: base 1s, doubled per attempt.
fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.saturating_pow(attempt)
}

/// Alpha Vantage daily-series client with global rate limiting and retry.
#[derive(Clone)]
pub struct AlphaVantageClient {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl AlphaVantageClient {
    pub fn new(api_key: String) -> Self {
        Self::with_rate_limit(api_key, FETCH_RATE_LIMIT_PER_SEC)
    }

    pub fn with_rate_limit(api_key: String, requests_per_sec: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(requests_per_sec.max(1), Duration::from_secs(1)),
        }
    }

    /// Fetch one ticker, retrying transient failures with exponential backoff.
    pub async fn fetch_quote(&self, ticker: &str) -> Result<QuoteSnapshot, MarketError> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_once(ticker).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        "Fetch {}/{} for {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        MAX_ATTEMPTS,
                        ticker,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!("Giving up on {}: {}", ticker, err);
                    return Err(err);
                }
            }
        }
    }

    /// Fetch a batch of tickers concurrently.
    ///
    /// Dispatch is parallel but admission is serialized through the rate
    /// limiter. One ticker failing never affects the others; the returned map
    /// always holds an entry per requested ticker.
    pub async fn fetch_batch(
        &self,
        tickers: &[String],
    ) -> HashMap<String, Result<QuoteSnapshot, MarketError>> {
        let futures = tickers.iter().map(|ticker| {
            let ticker = ticker.clone();
            async move {
                let result = self.fetch_quote(&ticker).await;
                (ticker, result)
            }
        });

        join_all(futures).await.into_iter().collect()
    }

    async fn fetch_once(&self, ticker: &str) -> Result<QuoteSnapshot, MarketError> {
        self.rate_limiter.acquire().await;

        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", ticker),
                ("apikey", self.api_key.as_str()),
                ("outputsize", "full"),
            ])
            .send()
            .await
            .map_err(|e| classify_reqwest_error(ticker, &e))?;

        let status = response.status();
        if !status.is_success() {
            let reason = format!("HTTP {}", status);
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(MarketError::FetchTransient {
                    ticker: ticker.to_string(),
                    reason,
                });
            }
            return Err(MarketError::FetchFatal {
                ticker: ticker.to_string(),
                reason,
            });
        }

        let body: DailyResponse = response.json().await.map_err(|e| MarketError::Parse {
            ticker: ticker.to_string(),
            reason: e.to_string(),
        })?;

        snapshot_from_response(ticker, body)
    }
}

fn classify_reqwest_error(ticker: &str, err: &reqwest::Error) -> MarketError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        MarketError::FetchTransient {
            ticker: ticker.to_string(),
            reason: err.to_string(),
        }
    } else {
        MarketError::FetchFatal {
            ticker: ticker.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Turn a provider response body into a snapshot.
///
/// An "Error Message" body means the symbol is unknown (fatal); a "Note" body
/// is the provider's throttle reply (transient).
fn snapshot_from_response(
    ticker: &str,
    body: DailyResponse,
) -> Result<QuoteSnapshot, MarketError> {
    if let Some(message) = body.error_message {
        return Err(MarketError::FetchFatal {
            ticker: ticker.to_string(),
            reason: message,
        });
    }
    if let Some(note) = body.note {
        return Err(MarketError::FetchTransient {
            ticker: ticker.to_string(),
            reason: format!("provider throttled: {}", note),
        });
    }

    let series = body.time_series.ok_or_else(|| MarketError::Parse {
        ticker: ticker.to_string(),
        reason: "no daily series in response".to_string(),
    })?;
    if series.is_empty() {
        return Err(MarketError::Parse {
            ticker: ticker.to_string(),
            reason: "empty daily series".to_string(),
        });
    }

    build_snapshot(ticker, &series)
}

/// Derive snapshot fields from the daily series (keys sort oldest-first).
fn build_snapshot(
    ticker: &str,
    series: &BTreeMap<String, RawDailyBar>,
) -> Result<QuoteSnapshot, MarketError> {
    let parse = |field: &str, value: &str| -> Result<f64, MarketError> {
        value.parse::<f64>().map_err(|_| MarketError::Parse {
            ticker: ticker.to_string(),
            reason: format!("bad {} value: {:?}", field, value),
        })
    };

    let mut closes = Vec::with_capacity(series.len());
    let mut highs = Vec::with_capacity(series.len());
    let mut lows = Vec::with_capacity(series.len());
    let mut last_volume = 0i64;
    for bar in series.values() {
        closes.push(parse("close", &bar.close)?);
        highs.push(parse("high", &bar.high)?);
        lows.push(parse("low", &bar.low)?);
        last_volume = bar.volume.parse::<i64>().unwrap_or(0);
    }

    let price = closes[closes.len() - 1];
    let previous_close = if closes.len() > 1 {
        closes[closes.len() - 2]
    } else {
        price
    };
    let daily_change_pct = if previous_close > 0.0 {
        (price - previous_close) / previous_close * 100.0
    } else {
        0.0
    };

    let year = closes.len().min(SESSIONS_PER_YEAR);
    let high_52w = highs[highs.len() - year..]
        .iter()
        .cloned()
        .fold(f64::MIN, f64::max);
    let low_52w = lows[lows.len() - year..]
        .iter()
        .cloned()
        .fold(f64::MAX, f64::min);

    Ok(QuoteSnapshot {
        ticker: ticker.to_string(),
        name: stock_name(ticker).to_string(),
        price,
        previous_close,
        daily_change_pct,
        volume: last_volume,
        // Not available on the free daily endpoint.
        pe_ratio: None,
        beta: Some(1.0),
        rsi: indicators::rsi(&closes, RSI_PERIOD),
        volatility: indicators::annualized_volatility(&closes),
        high_52w: Some(high_52w),
        low_52w: Some(low_52w),
        fetched_at: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<BTreeMap<String, RawDailyBar>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDailyBar {
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}
