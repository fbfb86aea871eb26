//! Indicator math over daily close series (oldest first).

use crate::constants::SESSIONS_PER_YEAR;

/// Latest Wilder-smoothed RSI over `period`, or None if the series is too short.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for pair in closes.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
    }

    let rs = if avg_loss == 0.0 {
        100.0
    } else {
        avg_gain / avg_loss
    };
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Annualized volatility of daily returns, in percent.
pub fn annualized_volatility(closes: &[f64]) -> Option<f64> {
    if closes.len() < 3 {
        return None;
    }

    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| pair[1] / pair[0] - 1.0)
        .collect();
    if returns.len() < 2 {
        return None;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / (returns.len() - 1) as f64;

    Some(variance.sqrt() * (SESSIONS_PER_YEAR as f64).sqrt() * 100.0)
}

/// Percent change between the latest close and the close `periods` sessions back.
pub fn pct_change(closes: &[f64], periods: usize) -> Option<f64> {
    if periods == 0 || closes.len() <= periods {
        return None;
    }
    let latest = closes[closes.len() - 1];
    let base = closes[closes.len() - 1 - periods];
    if base == 0.0 {
        return None;
    }
    Some((latest / base - 1.0) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_needs_enough_data() {
        assert!(rsi(&[1.0, 2.0, 3.0], 14).is_none());
    }

    #[test]
    fn rsi_is_100_on_monotonic_gains() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let value = rsi(&closes, 14).unwrap();
        assert!((value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_bounded() {
        let closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + if i % 2 == 0 { 3.0 } else { -2.0 })
            .collect();
        let value = rsi(&closes, 14).unwrap();
        assert!(value > 0.0 && value < 100.0);
    }

    #[test]
    fn volatility_is_zero_for_flat_series() {
        let closes = vec![50.0; 30];
        assert!(annualized_volatility(&closes).unwrap() < 1e-9);
    }

    #[test]
    fn pct_change_basic() {
        let closes = vec![100.0, 105.0, 110.0];
        let change = pct_change(&closes, 2).unwrap();
        assert!((change - 10.0).abs() < 1e-9);
    }
}
