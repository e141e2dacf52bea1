use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::models::{Candle, CandleSeries};

/// Create candles from (open, high, low, close) tuples with
/// auto-incrementing 15m timestamps.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let base = DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle {
            timestamp: base + Duration::minutes(15 * i as i64),
            open: o,
            high: h,
            low: l,
            close: c,
        })
        .collect();

    CandleSeries::new(candles)
}

/// n identical candles centered on `base` spanning `half_range` each way.
pub fn flat_candles(n: usize, base: f64, half_range: f64) -> CandleSeries {
    let rows: Vec<(f64, f64, f64, f64)> = (0..n)
        .map(|_| (base, base + half_range, base - half_range, base))
        .collect();
    make_candles(&rows)
}

/// Create n rising candles starting from `start` price, stepping by `step`.
pub fn make_bullish_trend(n: usize, start: f64, step: f64) -> CandleSeries {
    let base = DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let open = start + i as f64 * step;
            let close = open + step * 0.8;
            Candle {
                timestamp: base + Duration::minutes(15 * i as i64),
                open,
                high: close + step * 0.2,
                low: open - step * 0.1,
                close,
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// A Config suitable for tests: the full symbol table, no credentials.
pub fn default_test_config() -> Config {
    let mut cfg = Config::from_env();
    cfg.sheet_id = String::new();
    cfg.google_sa_email = String::new();
    cfg.google_sa_private_key = String::new();
    cfg.telegram_token = String::new();
    cfg.telegram_chat_id = String::new();
    cfg.log_level = "error".to_string();
    cfg
}
