use crate::models::Trend;

/// Exponential moving average seeded with the first sample. The seed biases
/// early values toward the first observation; downstream thresholds were
/// tuned against this variant, so keep it.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    out.push(values[0]);
    for &x in &values[1..] {
        let prev = *out.last().unwrap();
        out.push(alpha * x + (1.0 - alpha) * prev);
    }
    out
}

/// Classify trend from closes: bullish when the last close is above the
/// EMA, bearish below, neutral on a tie or insufficient history.
pub fn classify_trend(closes: &[f64], period: usize) -> Trend {
    if closes.len() < period {
        return Trend::Neutral;
    }
    let ema_vals = ema(closes, period);
    let last_close = closes[closes.len() - 1];
    let last_ema = ema_vals[ema_vals.len() - 1];
    if last_close > last_ema {
        Trend::Bullish
    } else if last_close < last_ema {
        Trend::Bearish
    } else {
        Trend::Neutral
    }
}
