//! Prompt builders for the commentary paths.

use market_core::QuoteSnapshot;
use notifier::AlertContext;
use portfolio_ledger::Valuation;

pub const ADVISOR_SYSTEM_PROMPT: &str =
    "You are a professional financial advisor specializing in Hong Kong stocks. \
     Provide clear, actionable commentary in two or three short paragraphs.";

pub const ANALYST_SYSTEM_PROMPT: &str =
    "You are a technical analyst specializing in stock market analysis. \
     Provide detailed technical and fundamental analysis.";

fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Commentary for a triggered alert email.
pub fn alert_prompt(ctx: &AlertContext) -> String {
    format!(
        "A stock alert just triggered for {name} ({ticker}).\n\
         Rule: {criterion} with threshold {threshold}.\n\
         Current price: {price:.2} HKD\n\
         Daily change: {change:+.2}%\n\
         Volume: {volume}\n\
         RSI (14): {rsi}\n\n\
         Explain briefly why this movement matters to a retail investor holding \
         or watching this stock, and what they might watch next. Do not give \
         personalized financial advice.",
        name = ctx.name,
        ticker = ctx.ticker,
        criterion = ctx.criterion_label,
        threshold = ctx.threshold,
        price = ctx.price,
        change = ctx.daily_change_pct,
        volume = ctx.volume,
        rsi = fmt_opt(ctx.rsi),
    )
}

/// Buy/sell/hold review of an entire portfolio.
pub fn portfolio_prompt(valuation: &Valuation) -> String {
    let mut holdings = String::new();
    for h in &valuation.holdings {
        holdings.push_str(&format!(
            "- {} ({}): {:.0} units, avg cost {:.2}, now {:.2}, unrealized P&L {:+.2} ({:+.2}%)\n",
            h.name, h.ticker, h.quantity, h.average_cost, h.current_price, h.unrealized_pnl,
            h.unrealized_pnl_percent,
        ));
    }
    if holdings.is_empty() {
        holdings.push_str("(no open positions)\n");
    }

    format!(
        "Analyze this portfolio and provide buy/sell/hold recommendations:\n\n\
         Cash available: {cash:.0} HKD\n\
         Total portfolio value: {total:.0} HKD\n\
         Unrealized P&L: {pnl:+.0} HKD\n\n\
         Holdings:\n{holdings}\n\
         Provide:\n\
         1. Top stocks to buy with reasoning\n\
         2. Positions to reduce (if any) with reasoning\n\
         3. Portfolio health assessment\n\
         4. Risk level and diversification notes",
        cash = valuation.cash,
        total = valuation.total_value,
        pnl = valuation.unrealized_pnl,
        holdings = holdings,
    )
}

/// Single-stock analysis from the latest snapshot.
pub fn stock_prompt(snapshot: &QuoteSnapshot) -> String {
    format!(
        "Analyze this stock and provide investment insights:\n\n\
         Ticker: {ticker}\n\
         Name: {name}\n\
         Current price: {price:.2} HKD\n\
         Daily change: {change:+.2}%\n\
         Volume: {volume}\n\
         P/E ratio: {pe}\n\
         Beta: {beta}\n\
         Annualized volatility: {vol}%\n\
         RSI (14): {rsi}\n\
         52-week range: {low} - {high}\n\n\
         Provide:\n\
         1. Buy/sell/hold view\n\
         2. Key strengths and weaknesses\n\
         3. Technical analysis summary",
        ticker = snapshot.ticker,
        name = snapshot.name,
        price = snapshot.price,
        change = snapshot.daily_change_pct,
        volume = snapshot.volume,
        pe = fmt_opt(snapshot.pe_ratio),
        beta = fmt_opt(snapshot.beta),
        vol = fmt_opt(snapshot.volatility),
        rsi = fmt_opt(snapshot.rsi),
        low = fmt_opt(snapshot.low_52w),
        high = fmt_opt(snapshot.high_52w),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_ledger::HoldingValue;

    #[test]
    fn portfolio_prompt_lists_holdings() {
        let valuation = Valuation {
            cash: 900_000.0,
            market_value: 105_000.0,
            cost_basis: 100_000.0,
            unrealized_pnl: 5_000.0,
            total_value: 1_005_000.0,
            holdings: vec![HoldingValue {
                ticker: "0700.HK".to_string(),
                name: "Tencent Holdings".to_string(),
                quantity: 1_000.0,
                average_cost: 100.0,
                current_price: 105.0,
                market_value: 105_000.0,
                cost_basis: 100_000.0,
                unrealized_pnl: 5_000.0,
                unrealized_pnl_percent: 5.0,
                daily_change_pct: 1.2,
                price_is_stale: false,
            }],
        };

        let prompt = portfolio_prompt(&valuation);
        assert!(prompt.contains("Tencent Holdings (0700.HK)"));
        assert!(prompt.contains("Cash available: 900000 HKD"));
    }

    #[test]
    fn portfolio_prompt_handles_empty_book() {
        let valuation = Valuation {
            cash: 1_000_000.0,
            market_value: 0.0,
            cost_basis: 0.0,
            unrealized_pnl: 0.0,
            total_value: 1_000_000.0,
            holdings: vec![],
        };
        assert!(portfolio_prompt(&valuation).contains("(no open positions)"));
    }
}
