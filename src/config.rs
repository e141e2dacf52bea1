use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::models::Timeframe;

/// Local time-of-day trading window. `start > end` wraps midnight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl SessionWindow {
    pub fn contains(&self, hour: u32, minute: u32) -> bool {
        let cur = hour * 60 + minute;
        let start = self.start.0 * 60 + self.start.1;
        let end = self.end.0 * 60 + self.end.1;
        if start <= end {
            cur >= start && cur <= end
        } else {
            cur >= start || cur <= end
        }
    }
}

/// Per-symbol tuning: display precision, stop-offset draw range, level
/// spacing, admission caps and trading windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub digits: u32,
    /// [min, max] range the randomized stop offset is drawn from, price units.
    pub sl_offset: (f64, f64),
    /// Minimum distance between entry and any level, and between kept zones.
    pub min_gap: f64,
    /// Tighter/looser second validation table applied by the engine.
    pub min_gap_strict: f64,
    /// Spread cap in points; None = always passes the spread guard.
    pub spread_cap: Option<f64>,
    pub atr_mult: f64,
    pub weekend_allowed: bool,
    pub sessions: Vec<SessionWindow>,
}

impl SymbolSpec {
    pub fn point(&self) -> f64 {
        10f64.powi(-(self.digits as i32))
    }
}

impl Default for SymbolSpec {
    fn default() -> Self {
        Self {
            digits: 2,
            sl_offset: (0.002, 0.003),
            min_gap: 0.0002,
            min_gap_strict: 0.0002,
            spread_cap: None,
            atr_mult: 1.0,
            weekend_allowed: false,
            sessions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Universe
    pub symbols: Vec<String>,
    pub specs: HashMap<String, SymbolSpec>,

    // Engine
    pub timeframe: Timeframe,
    pub candle_window: usize,
    pub min_candles: usize,
    pub ema_period: usize,

    // Guards
    pub block_when_running_global: bool,
    pub block_when_running_per_symbol: bool,
    pub market_guard_enabled: bool,
    pub active_weekdays: HashSet<Weekday>,
    pub tick_max_age_secs: i64,
    pub duplicate_window_secs: i64,

    // Levels
    pub fallback_use_atr: bool,
    pub atr_period: usize,
    pub atr_floor_points: f64,

    // Tracker
    pub expiry_hours: i64,
    pub poll_interval_secs: u64,
    pub trail_to_breakeven: bool,

    // Local clock for weekday/session/report logic
    pub tz: Tz,

    // Collaborators
    pub bridge_url: String,
    pub sheet_id: String,
    pub sheet_name: String,
    pub google_sa_email: String,
    pub google_sa_private_key: String,
    pub ledger_cache_ttl_secs: u64,
    pub telegram_token: String,
    pub telegram_chat_id: String,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        // (symbol, digits, offset range, min_gap)
        let base: &[(&str, u32, (f64, f64), f64)] = &[
            ("EURUSD", 5, (0.0015, 0.0025), 0.0008),
            ("GBPUSD", 5, (0.0020, 0.0040), 0.0010),
            ("AUDUSD", 5, (0.0012, 0.0022), 0.0008),
            ("NZDUSD", 5, (0.0012, 0.0022), 0.0008),
            ("USDCAD", 5, (0.0015, 0.0030), 0.0010),
            ("USDCHF", 5, (0.0010, 0.0020), 0.0008),
            ("EURGBP", 5, (0.0012, 0.0022), 0.0008),
            ("USDJPY", 3, (0.10, 0.18), 0.05),
            ("EURJPY", 3, (0.10, 0.18), 0.05),
            ("GBPJPY", 3, (0.12, 0.22), 0.05),
            ("AUDJPY", 3, (0.10, 0.20), 0.05),
            ("CADJPY", 3, (0.10, 0.20), 0.05),
            ("NZDJPY", 3, (0.10, 0.20), 0.05),
            ("US30", 1, (80.0, 200.0), 120.0),
            ("NAS100", 2, (80.0, 200.0), 120.0),
            ("US500", 2, (80.0, 200.0), 16.0),
            ("JPN225", 1, (18.0, 45.0), 24.0),
            ("XAUUSD", 2, (1.0, 2.5), 0.5),
            ("XAGUSD", 3, (0.02, 0.04), 0.5),
            ("BTCUSD", 2, (80.0, 200.0), 120.0),
            ("ETHUSD", 2, (80.0, 200.0), 120.0),
        ];

        let mut specs: HashMap<String, SymbolSpec> = HashMap::new();
        for &(symbol, digits, sl_offset, min_gap) in base {
            specs.insert(
                symbol.to_string(),
                SymbolSpec {
                    digits,
                    sl_offset,
                    min_gap,
                    ..SymbolSpec::default()
                },
            );
        }

        let strict: &[(&str, f64)] = &[
            ("EURUSD", 0.0012),
            ("GBPUSD", 0.0020),
            ("AUDUSD", 0.0012),
            ("NZDUSD", 0.0012),
            ("EURGBP", 0.0010),
            ("USDCAD", 0.0015),
            ("USDJPY", 0.10),
            ("XAUUSD", 0.5),
            ("NAS100", 20.0),
            ("US30", 50.0),
            ("BTCUSD", 50.0),
        ];
        for &(symbol, gap) in strict {
            if let Some(s) = specs.get_mut(symbol) {
                s.min_gap_strict = gap;
            }
        }

        let spread_caps: &[(&str, f64)] = &[
            ("US30", 6.0),
            ("NAS100", 4.0),
            ("US500", 1.5),
            ("BTCUSD", 25.0),
            ("ETHUSD", 8.0),
        ];
        for &(symbol, cap) in spread_caps {
            if let Some(s) = specs.get_mut(symbol) {
                s.spread_cap = Some(cap);
            }
        }

        let atr_mults: &[(&str, f64)] = &[
            ("US30", 0.8),
            ("NAS100", 0.9),
            ("US500", 0.7),
            ("BTCUSD", 1.2),
            ("ETHUSD", 1.2),
        ];
        for &(symbol, mult) in atr_mults {
            if let Some(s) = specs.get_mut(symbol) {
                s.atr_mult = mult;
            }
        }

        for symbol in ["BTCUSD", "ETHUSD"] {
            if let Some(s) = specs.get_mut(symbol) {
                s.weekend_allowed = true;
            }
        }

        // US cash session, local time (crosses midnight)
        let us_session = vec![
            SessionWindow {
                start: (20, 30),
                end: (23, 59),
            },
            SessionWindow {
                start: (0, 0),
                end: (3, 0),
            },
        ];
        for symbol in ["US30", "NAS100", "US500"] {
            if let Some(s) = specs.get_mut(symbol) {
                s.sessions = us_session.clone();
            }
        }

        let symbols: Vec<String> = base.iter().map(|&(s, ..)| s.to_string()).collect();

        Config {
            symbols,
            specs,
            timeframe: Timeframe::M15,
            candle_window: 100,
            min_candles: 60,
            ema_period: 50,
            block_when_running_global: false,
            block_when_running_per_symbol: true,
            market_guard_enabled: true,
            active_weekdays: HashSet::from([
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ]),
            tick_max_age_secs: 900,
            duplicate_window_secs: 1800,
            fallback_use_atr: true,
            atr_period: 14,
            atr_floor_points: 6.0,
            expiry_hours: env("EXPIRY_HOURS", "4").parse().unwrap_or(4),
            poll_interval_secs: 1,
            trail_to_breakeven: env("TRAIL_TO_BREAKEVEN", "false").to_lowercase() == "true",
            tz: chrono_tz::Asia::Bangkok,
            bridge_url: env("MT5_BRIDGE_URL", "http://127.0.0.1:8787"),
            sheet_id: env("SHEET_ID", ""),
            sheet_name: env("SHEET_NAME", "Signal"),
            google_sa_email: env("GOOGLE_SA_EMAIL", ""),
            google_sa_private_key: env("GOOGLE_SA_PRIVATE_KEY", "").replace("\\n", "\n"),
            ledger_cache_ttl_secs: 45,
            telegram_token: env("TELEGRAM_TOKEN", ""),
            telegram_chat_id: env("TELEGRAM_CHAT_ID", ""),
            log_level: env("LOG_LEVEL", "info"),
        }
    }

    /// Spec for a symbol, falling back to conservative defaults for
    /// anything not in the table.
    pub fn spec(&self, symbol: &str) -> SymbolSpec {
        self.specs.get(symbol).cloned().unwrap_or_default()
    }

    pub fn shared(self) -> Arc<Config> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_window_plain() {
        let w = SessionWindow {
            start: (9, 0),
            end: (17, 30),
        };
        assert!(w.contains(9, 0));
        assert!(w.contains(12, 15));
        assert!(w.contains(17, 30));
        assert!(!w.contains(8, 59));
        assert!(!w.contains(17, 31));
    }

    #[test]
    fn session_window_wraps_midnight() {
        let w = SessionWindow {
            start: (22, 0),
            end: (2, 0),
        };
        assert!(w.contains(23, 30));
        assert!(w.contains(0, 15));
        assert!(w.contains(2, 0));
        assert!(!w.contains(12, 0));
    }

    #[test]
    fn spec_defaults_for_unknown_symbol() {
        let cfg = Config::from_env();
        let s = cfg.spec("UNKNOWN");
        assert_eq!(s.digits, 2);
        assert!(s.spread_cap.is_none());
    }

    #[test]
    fn table_entries() {
        let cfg = Config::from_env();
        let eur = cfg.spec("EURUSD");
        assert_eq!(eur.digits, 5);
        assert!((eur.min_gap - 0.0008).abs() < 1e-12);
        assert!((eur.min_gap_strict - 0.0012).abs() < 1e-12);

        let us30 = cfg.spec("US30");
        assert_eq!(us30.spread_cap, Some(6.0));
        assert_eq!(us30.sessions.len(), 2);
        assert!((us30.point() - 0.1).abs() < 1e-12);

        assert!(cfg.spec("BTCUSD").weekend_allowed);
        assert!(!cfg.spec("EURUSD").weekend_allowed);
    }
}
