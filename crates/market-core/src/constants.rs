//! Stock universe and tunable defaults.

/// The 20 pre-selected Hong Kong tickers tracked by default.
pub const HK_STOCKS: [&str; 20] = [
    "0700.HK", // Tencent Holdings
    "0005.HK", // HSBC Holdings
    "0941.HK", // China Mobile
    "0388.HK", // Hong Kong Exchanges
    "1299.HK", // AIA Group
    "2318.HK", // Ping An Insurance
    "1398.HK", // ICBC
    "3988.HK", // Bank of China
    "0939.HK", // China Construction Bank
    "1024.HK", // Kuaishou Technology
    "3690.HK", // Meituan
    "9988.HK", // Alibaba Group
    "1810.HK", // Xiaomi Corporation
    "2388.HK", // BOC Hong Kong Holdings
    "2899.HK", // Zijin Mining
    "2269.HK", // Midea Group
    "2628.HK", // China Life Insurance
    "3328.HK", // Bank of Communications
    "1378.HK", // China Hongqiao Group
    "2330.HK", // Power Assets Holdings
];

/// Display name for a ticker in the default universe, or the ticker itself.
pub fn stock_name(ticker: &str) -> &str {
    match ticker {
        "0700.HK" => "Tencent Holdings",
        "0005.HK" => "HSBC Holdings",
        "0941.HK" => "China Mobile",
        "0388.HK" => "Hong Kong Exchanges",
        "1299.HK" => "AIA Group",
        "2318.HK" => "Ping An Insurance",
        "1398.HK" => "ICBC",
        "3988.HK" => "Bank of China",
        "0939.HK" => "China Construction Bank",
        "1024.HK" => "Kuaishou Technology",
        "3690.HK" => "Meituan",
        "9988.HK" => "Alibaba Group",
        "1810.HK" => "Xiaomi Corporation",
        "2388.HK" => "BOC Hong Kong Holdings",
        "2899.HK" => "Zijin Mining",
        "2269.HK" => "Midea Group",
        "2628.HK" => "China Life Insurance",
        "3328.HK" => "Bank of Communications",
        "1378.HK" => "China Hongqiao Group",
        "2330.HK" => "Power Assets Holdings",
        other => other,
    }
}

/// Cash every new account starts with (HKD).
pub const STARTING_CASH: f64 = 1_000_000.0;

/// Quote snapshots are considered fresh for 24 hours.
pub const QUOTE_TTL_SECS: i64 = 86_400;

/// Cached AI responses are reused for 1 hour.
pub const AI_CACHE_TTL_SECS: i64 = 3_600;

/// Global ceiling on outbound market-data requests.
pub const FETCH_RATE_LIMIT_PER_SEC: usize = 2;

/// Quiet period after an alert fires before it can fire again.
pub const ALERT_COOLDOWN_SECS: i64 = 86_400;

/// Lookback window for the RSI calculation.
pub const RSI_PERIOD: usize = 14;

/// Trading sessions in a year, used for annualization and 52-week ranges.
pub const SESSIONS_PER_YEAR: usize = 252;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_names_resolve() {
        for ticker in HK_STOCKS {
            assert_ne!(stock_name(ticker), ticker);
        }
        assert_eq!(stock_name("9999.HK"), "9999.HK");
    }
}
