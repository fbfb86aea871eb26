use crate::AlertNotification;

pub struct EmailTemplate;

impl EmailTemplate {
    pub fn render_html(notification: &AlertNotification) -> String {
        let ctx = &notification.context;
        let change_color = if ctx.daily_change_pct >= 0.0 {
            "#22c55e"
        } else {
            "#ef4444"
        };

        let commentary_html = notification
            .commentary
            .as_deref()
            .map(|text| {
                format!(
                    r#"<div style="padding:16px 20px;border-top:1px solid #e2e8f0;">
  <p style="color:#64748b;font-size:13px;font-weight:700;margin:0 0 8px;">MARKET COMMENTARY</p>
  <p style="color:#334155;margin:0;white-space:pre-line;">{}</p>
</div>"#,
                    escape(text)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1"></head>
<body style="margin:0;padding:0;background:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;">
<table width="100%" cellpadding="0" cellspacing="0" style="background:#f1f5f9;padding:32px 0;">
  <tr><td align="center">
    <table width="600" cellpadding="0" cellspacing="0" style="background:#ffffff;border-radius:8px;overflow:hidden;box-shadow:0 1px 3px rgba(0,0,0,0.1);">
      <tr><td>
        <div style="background:#1e293b;color:#fff;padding:12px 20px;border-radius:8px 8px 0 0;font-size:18px;font-weight:700;">Stock Alert Triggered</div>
        <div style="padding:16px 20px;">
          <span style="background:#ef4444;color:#fff;padding:6px 14px;border-radius:16px;display:inline-block;font-weight:700;font-size:12px;">ALERT ACTIVE</span>
          <p style="color:#334155;margin:12px 0 0;"><strong>Criterion:</strong> {criterion}</p>
          <p style="color:#334155;margin:4px 0 0;"><strong>Threshold:</strong> {threshold}</p>
        </div>
        <div style="padding:0 20px 16px;">
          <div style="font-size:22px;font-weight:700;color:#1e293b;">{name} ({ticker})</div>
          <div style="font-size:30px;font-weight:700;color:#3b82f6;margin:8px 0;">${price:.2}</div>
        </div>
        <table style="width:100%;border-collapse:collapse;">
  <tr><td style="padding:8px 12px;color:#94a3b8;">Daily Change</td><td style="padding:8px 12px;font-weight:600;color:{change_color};">{change:+.2}%</td></tr>
  <tr style="background:#f8fafc;"><td style="padding:8px 12px;color:#94a3b8;">Volume</td><td style="padding:8px 12px;font-weight:600;">{volume}</td></tr>
  <tr><td style="padding:8px 12px;color:#94a3b8;">P/E Ratio</td><td style="padding:8px 12px;font-weight:600;">{pe}</td></tr>
  <tr style="background:#f8fafc;"><td style="padding:8px 12px;color:#94a3b8;">Beta</td><td style="padding:8px 12px;font-weight:600;">{beta}</td></tr>
  <tr><td style="padding:8px 12px;color:#94a3b8;">RSI (14)</td><td style="padding:8px 12px;font-weight:600;">{rsi}</td></tr>
        </table>
        {commentary}
      </td></tr>
      <tr><td style="padding:16px 20px;border-top:1px solid #e2e8f0;">
        <p style="margin:0;color:#94a3b8;font-size:12px;">
          This is an automated alert. Please do not reply to this email.
          <br>Sent at {ts} UTC
        </p>
      </td></tr>
    </table>
    <p style="color:#94a3b8;font-size:11px;margin-top:16px;">Portfolio Pulse Notification Service</p>
  </td></tr>
</table>
</body>
</html>"#,
            criterion = escape(&ctx.criterion_label),
            threshold = ctx.threshold,
            name = escape(&ctx.name),
            ticker = escape(&ctx.ticker),
            price = ctx.price,
            change_color = change_color,
            change = ctx.daily_change_pct,
            volume = group_thousands(ctx.volume),
            pe = optional(ctx.pe_ratio),
            beta = optional(ctx.beta),
            rsi = optional(ctx.rsi),
            commentary = commentary_html,
            ts = ctx.triggered_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }

    pub fn render_text(notification: &AlertNotification) -> String {
        let ctx = &notification.context;
        let mut body = format!(
            "Stock Alert Triggered\n\
             \n\
             Criterion: {}\n\
             Threshold: {}\n\
             \n\
             {} ({})\n\
             Current Price: ${:.2}\n\
             Daily Change: {:+.2}%\n\
             Volume: {}\n\
             P/E Ratio: {}\n\
             Beta: {}\n\
             RSI (14): {}\n",
            ctx.criterion_label,
            ctx.threshold,
            ctx.name,
            ctx.ticker,
            ctx.price,
            ctx.daily_change_pct,
            group_thousands(ctx.volume),
            optional(ctx.pe_ratio),
            optional(ctx.beta),
            optional(ctx.rsi),
        );

        if let Some(commentary) = notification.commentary.as_deref() {
            body.push_str("\nMarket commentary:\n");
            body.push_str(commentary);
            body.push('\n');
        }

        body.push_str("\nThis is an automated alert. Please do not reply to this email.\n");
        body
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn optional(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "N/A".to_string(),
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlertContext;

    fn notification() -> AlertNotification {
        AlertNotification::new(
            "trader@example.com",
            AlertContext {
                ticker: "0700.HK".to_string(),
                name: "Tencent Holdings".to_string(),
                criterion_label: "Price Above Threshold".to_string(),
                threshold: 340.0,
                price: 352.4,
                daily_change_pct: 2.15,
                volume: 12_345_678,
                pe_ratio: None,
                beta: Some(1.0),
                rsi: Some(67.3),
                triggered_at: chrono::Utc::now(),
            },
        )
    }

    #[test]
    fn html_includes_stock_card_and_stats() {
        let html = EmailTemplate::render_html(&notification());
        assert!(html.contains("Tencent Holdings (0700.HK)"));
        assert!(html.contains("$352.40"));
        assert!(html.contains("12,345,678"));
        assert!(html.contains("N/A")); // missing P/E
    }

    #[test]
    fn commentary_is_escaped() {
        let n = notification().with_commentary(Some("<b>momentum</b> looks strong".to_string()));
        let html = EmailTemplate::render_html(&n);
        assert!(html.contains("&lt;b&gt;momentum&lt;/b&gt;"));
        assert!(!html.contains("<b>momentum</b>"));
    }

    #[test]
    fn text_fallback_has_no_commentary_block_when_absent() {
        let text = EmailTemplate::render_text(&notification());
        assert!(text.contains("Current Price: $352.40"));
        assert!(!text.contains("Market commentary"));
    }
}
