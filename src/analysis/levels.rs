use rand::Rng;
use thiserror::Error;

use crate::analysis::zones::ZoneLevel;
use crate::config::SymbolSpec;
use crate::models::{CandleSeries, Direction};

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("level validation failed: entry={entry} sl={sl} tp1={tp1} tp2={tp2} tp3={tp3} min_gap={min_gap}")]
    Validation {
        entry: f64,
        sl: f64,
        tp1: f64,
        tp2: f64,
        tp3: f64,
        min_gap: f64,
    },
    #[error("validation failed and ATR unavailable for fallback")]
    AtrUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub sl: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
}

impl Levels {
    pub fn take_profits(&self) -> [f64; 3] {
        [self.tp1, self.tp2, self.tp3]
    }

    pub fn all(&self) -> [f64; 4] {
        [self.sl, self.tp1, self.tp2, self.tp3]
    }
}

/// Fraction of the minimum spacing a take-profit is pulled back toward
/// entry, so the target sits in front of the zone rather than on it.
const TP_ZONE_BUFFER: f64 = 0.30;
/// Risk multiples used when a zone-derived take-profit is missing or too
/// close to entry.
const TP_RISK_FACTORS: [f64; 3] = [1.5, 2.5, 4.0];
/// Take-profit multiples of the stop distance in the ATR fallback.
const ATR_TP_FACTORS: [f64; 3] = [1.0, 1.6, 2.4];

/// Derives stop-loss and three take-profit levels from zone levels, with
/// validation and an ATR-based fallback.
pub struct LevelCalculator<'a> {
    spec: &'a SymbolSpec,
    fallback_use_atr: bool,
    atr_period: usize,
    atr_floor_points: f64,
}

impl<'a> LevelCalculator<'a> {
    pub fn new(
        spec: &'a SymbolSpec,
        fallback_use_atr: bool,
        atr_period: usize,
        atr_floor_points: f64,
    ) -> Self {
        Self {
            spec,
            fallback_use_atr,
            atr_period,
            atr_floor_points,
        }
    }

    /// Compute levels for a prospective signal. `spread` is the current
    /// ask-bid distance in price units, used as an extra stop buffer in the
    /// ATR fallback. The offset draw comes from the injected `rng` so tests
    /// are reproducible.
    pub fn compute<R: Rng>(
        &self,
        entry: f64,
        direction: Direction,
        candles: &CandleSeries,
        zones: &[ZoneLevel],
        spread: f64,
        rng: &mut R,
    ) -> Result<Levels, LevelError> {
        let digits = self.spec.digits;
        let (off_lo, off_hi) = self.spec.sl_offset;
        let offset = rng.gen_range(off_lo..=off_hi);
        let min_gap = self.spec.min_gap;

        let sl = self.stop_loss(entry, direction, candles, zones, offset);

        // Space out zone targets, then assign the first three ahead of entry.
        let spaced = dedupe_by_gap(zones, direction, min_gap);
        let buffer = min_gap * TP_ZONE_BUFFER;
        let mut tps: [Option<f64>; 3] = [None, None, None];
        let ahead: Vec<f64> = match direction {
            Direction::Buy => spaced.iter().copied().filter(|&z| z > entry).collect(),
            Direction::Sell => spaced.iter().copied().filter(|&z| z < entry).collect(),
        };
        for (i, tp) in tps.iter_mut().enumerate() {
            if let Some(&z) = ahead.get(i) {
                *tp = Some(match direction {
                    Direction::Buy => z - buffer,
                    Direction::Sell => z + buffer,
                });
            }
        }

        // Backfill from risk multiples when a zone target is missing or
        // hugging the entry.
        let risk = (entry - sl).abs();
        let mut tp_vals = [0.0f64; 3];
        for i in 0..3 {
            tp_vals[i] = match tps[i] {
                Some(tp) if (tp - entry).abs() >= min_gap => tp,
                _ => match direction {
                    Direction::Buy => entry + risk * TP_RISK_FACTORS[i],
                    Direction::Sell => entry - risk * TP_RISK_FACTORS[i],
                },
            };
        }

        let mut levels = Levels {
            sl: round_to(sl, digits),
            tp1: round_to(tp_vals[0], digits),
            tp2: round_to(tp_vals[1], digits),
            tp3: round_to(tp_vals[2], digits),
        };

        if !self.validate(entry, direction, &levels, min_gap) {
            levels = self.atr_fallback(entry, direction, candles, spread)?;
        }

        // Last safety step: direction-consistent ordering of the targets.
        let mut tps = levels.take_profits();
        match direction {
            Direction::Buy => tps.sort_by(|a, b| a.partial_cmp(b).unwrap()),
            Direction::Sell => tps.sort_by(|a, b| b.partial_cmp(a).unwrap()),
        }
        levels.tp1 = tps[0];
        levels.tp2 = tps[1];
        levels.tp3 = tps[2];

        Ok(levels)
    }

    /// Adverse extreme of the 5 candles ending two bars before the latest,
    /// unioned with adverse zone levels, pushed out by the drawn offset.
    /// With no candidate on the adverse side the stop falls back to three
    /// offsets from entry.
    fn stop_loss(
        &self,
        entry: f64,
        direction: Direction,
        candles: &CandleSeries,
        zones: &[ZoneLevel],
        offset: f64,
    ) -> f64 {
        let len = candles.len();
        let window = candles.slice(len.saturating_sub(7), len.saturating_sub(2));

        match direction {
            Direction::Buy => {
                let candidates: Vec<f64> = window
                    .lows()
                    .into_iter()
                    .chain(zones.iter().map(|z| z.price))
                    .filter(|&p| p < entry)
                    .collect();
                match candidates
                    .into_iter()
                    .min_by(|a, b| a.partial_cmp(b).unwrap())
                {
                    Some(low) => low - offset,
                    None => entry - offset * 3.0,
                }
            }
            Direction::Sell => {
                let candidates: Vec<f64> = window
                    .highs()
                    .into_iter()
                    .chain(zones.iter().map(|z| z.price))
                    .filter(|&p| p > entry)
                    .collect();
                match candidates
                    .into_iter()
                    .max_by(|a, b| a.partial_cmp(b).unwrap())
                {
                    Some(high) => high + offset,
                    None => entry + offset * 3.0,
                }
            }
        }
    }

    fn validate(&self, entry: f64, direction: Direction, levels: &Levels, min_gap: f64) -> bool {
        let Levels { sl, tp1, tp2, tp3 } = *levels;
        let side_ok = match direction {
            Direction::Buy => sl < entry && tp1 > entry && tp2 > entry && tp3 > entry,
            Direction::Sell => sl > entry && tp1 < entry && tp2 < entry && tp3 < entry,
        };
        let gap_ok = levels.all().iter().all(|&v| (entry - v).abs() > min_gap);
        let value_ok = levels.all().iter().all(|&v| v != 0.0 && v.is_finite());
        side_ok && gap_ok && value_ok
    }

    fn atr_fallback(
        &self,
        entry: f64,
        direction: Direction,
        candles: &CandleSeries,
        spread: f64,
    ) -> Result<Levels, LevelError> {
        if !self.fallback_use_atr {
            return Err(LevelError::Validation {
                entry,
                sl: 0.0,
                tp1: 0.0,
                tp2: 0.0,
                tp3: 0.0,
                min_gap: self.spec.min_gap,
            });
        }

        let atr = atr(candles, self.atr_period).ok_or(LevelError::AtrUnavailable)?;
        let digits = self.spec.digits;
        let point = self.spec.point();
        let dist = (atr * self.spec.atr_mult).max(self.atr_floor_points * point);

        let levels = match direction {
            Direction::Buy => Levels {
                sl: round_to(entry - dist - spread, digits),
                tp1: round_to(entry + dist * ATR_TP_FACTORS[0], digits),
                tp2: round_to(entry + dist * ATR_TP_FACTORS[1], digits),
                tp3: round_to(entry + dist * ATR_TP_FACTORS[2], digits),
            },
            Direction::Sell => Levels {
                sl: round_to(entry + dist + spread, digits),
                tp1: round_to(entry - dist * ATR_TP_FACTORS[0], digits),
                tp2: round_to(entry - dist * ATR_TP_FACTORS[1], digits),
                tp3: round_to(entry - dist * ATR_TP_FACTORS[2], digits),
            },
        };
        Ok(levels)
    }
}

/// Drop zone levels closer than `min_gap` to the previously kept one,
/// scanning in the direction-appropriate order.
fn dedupe_by_gap(zones: &[ZoneLevel], direction: Direction, min_gap: f64) -> Vec<f64> {
    let mut prices: Vec<f64> = zones.iter().map(|z| z.price).collect();
    match direction {
        Direction::Buy => prices.sort_by(|a, b| a.partial_cmp(b).unwrap()),
        Direction::Sell => prices.sort_by(|a, b| b.partial_cmp(a).unwrap()),
    }
    let mut kept: Vec<f64> = Vec::with_capacity(prices.len());
    for p in prices {
        if kept.last().map_or(true, |&last| (p - last).abs() >= min_gap) {
            kept.push(p);
        }
    }
    kept
}

/// 14-period Average True Range over the trailing window. None when the
/// history is too short, which aborts the ATR fallback.
pub fn atr(candles: &CandleSeries, period: usize) -> Option<f64> {
    if candles.len() < period + 1 {
        return None;
    }
    let tail = candles.tail(period + 1);
    let mut trs = Vec::with_capacity(period);
    for i in 1..tail.len() {
        let hl = tail[i].high - tail[i].low;
        let hc = (tail[i].high - tail[i - 1].close).abs();
        let lc = (tail[i].low - tail[i - 1].close).abs();
        trs.push(hl.max(hc).max(lc));
    }
    Some(trs.iter().sum::<f64>() / trs.len() as f64)
}

pub fn round_to(x: f64, digits: u32) -> f64 {
    let p = 10f64.powi(digits as i32);
    (x * p).round() / p
}
