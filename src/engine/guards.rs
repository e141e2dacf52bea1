use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::config::Config;
use crate::ledger::LedgerRecord;
use crate::models::{CandleSeries, Tick, Timeframe};

/// Last-observed closed-bar timestamp per (symbol, timeframe).
/// Process-lifetime only; a restart re-arms every pair.
#[derive(Debug, Default)]
pub struct NewBarMemory {
    last: HashMap<(String, Timeframe), i64>,
}

impl NewBarMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// True only when `bar_ts` is strictly newer than the remembered
    /// timestamp. The first observation of a pair never accepts; it only
    /// arms the memory for future calls.
    pub fn observe(&mut self, symbol: &str, tf: Timeframe, bar_ts: i64) -> bool {
        let key = (symbol.to_string(), tf);
        match self.last.get(&key) {
            None => {
                self.last.insert(key, bar_ts);
                false
            }
            Some(&prev) if bar_ts <= prev => false,
            Some(_) => {
                self.last.insert(key, bar_ts);
                true
            }
        }
    }
}

/// Ordered, short-circuiting admission checks gating signal creation.
/// Stage order matters: later stages assume earlier ones passed (tick
/// freshness before spread, for instance).
///
/// Known gap: the lock check and the ledger append that eventually follows
/// are not atomic. Two processes, or two overlapping cycles, can both pass
/// the per-symbol lock and create two open signals for one symbol.
pub struct GuardPipeline {
    bars: NewBarMemory,
}

impl GuardPipeline {
    pub fn new() -> Self {
        Self {
            bars: NewBarMemory::new(),
        }
    }

    /// Stage 1: configured open-order locks, global then per-symbol.
    pub fn locks_ok(&self, cfg: &Config, symbol: &str, records: &[LedgerRecord]) -> bool {
        if cfg.block_when_running_global && records.iter().any(|r| r.is_open()) {
            debug!("{}: global lock active, skip", symbol);
            return false;
        }
        if cfg.block_when_running_per_symbol
            && records.iter().any(|r| r.symbol == symbol && r.is_open())
        {
            debug!("{}: per-symbol lock active, skip", symbol);
            return false;
        }
        true
    }

    /// Stage 2: local-weekday policy plus tick freshness. Weekend trading
    /// is allowed only for allowlisted symbols; a stale or missing tick
    /// blocks every symbol regardless of weekday.
    pub fn market_open(
        &self,
        cfg: &Config,
        symbol: &str,
        tick: Option<&Tick>,
        now_utc: DateTime<Utc>,
    ) -> bool {
        if !cfg.market_guard_enabled {
            return true;
        }

        let weekday = now_utc.with_timezone(&cfg.tz).weekday();
        if !cfg.active_weekdays.contains(&weekday) {
            let allowed = cfg.spec(symbol).weekend_allowed;
            if !allowed {
                debug!("{}: outside active weekdays, skip", symbol);
                return false;
            }
        }

        match tick {
            Some(t) if t.age_secs(now_utc) <= cfg.tick_max_age_secs => true,
            Some(t) => {
                debug!("{}: tick stale ({}s), skip", symbol, t.age_secs(now_utc));
                false
            }
            None => {
                debug!("{}: no tick, skip", symbol);
                false
            }
        }
    }

    /// Stage 3: proceed only on a freshly closed bar.
    pub fn new_bar(&mut self, symbol: &str, tf: Timeframe, candles: &CandleSeries) -> bool {
        let last = match candles.last() {
            Some(c) => c,
            None => return false,
        };
        let accepted = self.bars.observe(symbol, tf, last.timestamp.timestamp());
        if !accepted {
            debug!("{}: no new {} bar, skip", symbol, tf);
        }
        accepted
    }

    /// Stage 4: spread in points against the symbol's cap. Symbols without
    /// a cap always pass.
    pub fn spread_ok(&self, cfg: &Config, symbol: &str, tick: &Tick) -> bool {
        let spec = cfg.spec(symbol);
        let cap = match spec.spread_cap {
            Some(c) => c,
            None => return true,
        };
        let points = tick.spread() / spec.point();
        if points > cap {
            debug!("{}: spread {:.1} pts over cap {:.1}, skip", symbol, points, cap);
            return false;
        }
        true
    }

    /// Stage 5: configured local trading windows; unset means always open.
    pub fn in_session(&self, cfg: &Config, symbol: &str, now_utc: DateTime<Utc>) -> bool {
        let spec = cfg.spec(symbol);
        if spec.sessions.is_empty() {
            return true;
        }
        let local = now_utc.with_timezone(&cfg.tz);
        let open = spec
            .sessions
            .iter()
            .any(|w| w.contains(local.hour(), local.minute()));
        if !open {
            debug!("{}: out of session, skip", symbol);
        }
        open
    }

    /// Stage 6: reject when the most recent ledger row for this symbol is
    /// younger than the duplicate window.
    pub fn duplicate_ok(
        &self,
        cfg: &Config,
        symbol: &str,
        records: &[LedgerRecord],
        now_local: NaiveDateTime,
    ) -> bool {
        for record in records.iter().rev() {
            if record.symbol != symbol {
                continue;
            }
            if let Some(created) = record.created_at() {
                let age = (now_local - created).num_seconds();
                if age < cfg.duplicate_window_secs {
                    debug!("{}: duplicate signal {}s ago, skip", symbol, age);
                    return false;
                }
            }
            // Only the newest matching row decides.
            break;
        }
        true
    }
}

impl Default for GuardPipeline {
    fn default() -> Self {
        Self::new()
    }
}
