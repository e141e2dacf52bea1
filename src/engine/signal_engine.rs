use anyhow::Result;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::{classify_trend, detect, zone_levels, LevelCalculator};
use crate::config::Config;
use crate::engine::guards::GuardPipeline;
use crate::engine::ThreadIndex;
use crate::ledger::Ledger;
use crate::market::MarketData;
use crate::models::{Signal, SignalResult, Trend};
use crate::notify::{messages, Notifier};

/// Per-symbol, per-bar-close decision pipeline: admission guards, trend +
/// pattern detection, level computation, then the ledger append and the
/// entry announcement.
pub struct SignalEngine {
    cfg: Arc<Config>,
    market: Arc<dyn MarketData>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    guards: GuardPipeline,
    threads: ThreadIndex,
    rng: StdRng,
}

impl SignalEngine {
    pub fn new(
        cfg: Arc<Config>,
        market: Arc<dyn MarketData>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        threads: ThreadIndex,
    ) -> Self {
        Self {
            cfg,
            market,
            ledger,
            notifier,
            guards: GuardPipeline::new(),
            threads,
            rng: StdRng::from_entropy(),
        }
    }

    /// One sweep over the whole universe. A slow or failing symbol delays
    /// but never aborts the rest of the cycle.
    pub async fn run_cycle(&mut self) {
        let symbols = self.cfg.symbols.clone();
        for symbol in &symbols {
            if let Err(e) = self.check_symbol(symbol).await {
                warn!("{}: cycle error: {:#}", symbol, e);
            }
        }
    }

    pub async fn check_symbol(&mut self, symbol: &str) -> Result<()> {
        let cfg = self.cfg.clone();
        let spec = cfg.spec(symbol);
        let now_utc = Utc::now();
        let now_local = now_utc.with_timezone(&cfg.tz).naive_local();

        // Guard 1: open-order locks
        let records = self.ledger.read_all().await?;
        if !self.guards.locks_ok(&cfg, symbol, &records) {
            return Ok(());
        }

        // Guard 2: weekday policy + tick freshness
        let tick = self.market.fetch_tick(symbol).await?;
        if !self.guards.market_open(&cfg, symbol, tick.as_ref(), now_utc) {
            return Ok(());
        }
        let tick = match tick {
            Some(t) => t,
            None => return Ok(()),
        };

        // Guard 3: only act on a freshly closed bar
        let candles = self
            .market
            .fetch_candles(symbol, cfg.timeframe, cfg.candle_window)
            .await?;
        if !self.guards.new_bar(symbol, cfg.timeframe, &candles) {
            return Ok(());
        }

        // Guard 4 + 5: spread cap and trading windows
        if !self.guards.spread_ok(&cfg, symbol, &tick) {
            return Ok(());
        }
        if !self.guards.in_session(&cfg, symbol, now_utc) {
            return Ok(());
        }

        // Guard 6: duplicate window, first pass on the cached records
        if !self.guards.duplicate_ok(&cfg, symbol, &records, now_local) {
            return Ok(());
        }

        if candles.len() < cfg.min_candles {
            debug!("{}: only {} candles, skip", symbol, candles.len());
            return Ok(());
        }

        let trend = classify_trend(&candles.closes(), cfg.ema_period);
        if trend == Trend::Neutral {
            debug!("{}: no clear trend", symbol);
            return Ok(());
        }

        let matched = match detect(&candles, trend) {
            Some(m) => m,
            None => {
                debug!("{}: no entry setup", symbol);
                return Ok(());
            }
        };
        let direction = matched.direction;

        let entry = tick.entry_price(direction);

        let zones = zone_levels(&candles, entry, direction);
        if zones.is_empty() {
            debug!("{}: no zone levels ahead of entry, reject", symbol);
            return Ok(());
        }

        let calc = LevelCalculator::new(
            &spec,
            cfg.fallback_use_atr,
            cfg.atr_period,
            cfg.atr_floor_points,
        );
        let levels = match calc.compute(
            entry,
            direction,
            &candles,
            &zones,
            tick.spread(),
            &mut self.rng,
        ) {
            Ok(l) => l,
            Err(e) => {
                debug!("{}: level computation failed: {}", symbol, e);
                return Ok(());
            }
        };

        // Independent second validation with the stricter table; defends
        // against level-calculator edge cases slipping through.
        for v in levels.all() {
            if v == 0.0 || v == entry || (entry - v).abs() < spec.min_gap_strict {
                debug!(
                    "{}: level {} too close to entry {} (strict gap {}), reject",
                    symbol, v, entry, spec.min_gap_strict
                );
                return Ok(());
            }
        }

        // Authoritative duplicate re-check after all the I/O above.
        let records = self.ledger.read_all().await?;
        if !self.guards.duplicate_ok(&cfg, symbol, &records, now_local) {
            return Ok(());
        }

        let signal = Signal {
            symbol: symbol.to_string(),
            direction,
            entry,
            sl: levels.sl,
            tp1: levels.tp1,
            tp2: levels.tp2,
            tp3: levels.tp3,
            created_at: now_local,
            result: SignalResult::Pending,
            pattern: matched.kind.label().to_string(),
            note: String::new(),
        };

        let row = signal.to_row(spec.digits);
        let row_idx = self.ledger.append_row(&row).await?;
        info!(
            "{}: {} signal @ {} (sl {} tp {}/{}/{}) [{}] -> row {}",
            symbol,
            direction,
            signal.entry,
            signal.sl,
            signal.tp1,
            signal.tp2,
            signal.tp3,
            signal.pattern,
            row_idx
        );

        let text = messages::entry_message(&signal, spec.digits);
        if let Some(msg_id) = self.notifier.send_text(&text, None).await {
            // Root of the thread closure notifications reply to.
            self.threads
                .write()
                .await
                .insert(symbol.to_string(), msg_id);
        }

        Ok(())
    }
}
