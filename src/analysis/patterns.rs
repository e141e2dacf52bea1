use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{CandleSeries, Direction, Trend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKind {
    BullishEngulfing,
    BearishEngulfing,
    PinbarBottom,
    PinbarTop,
    DoubleTop,
    DoubleBottom,
    MorningStar,
    EveningStar,
    QuasimodoBuy,
    QuasimodoSell,
    ImbalanceUp,
    ImbalanceDown,
    DemandZone,
    SupplyZone,
}

impl PatternKind {
    /// Human-readable label stored in the ledger's Pattern column.
    pub fn label(&self) -> &'static str {
        match self {
            PatternKind::BullishEngulfing => "Bullish Engulfing",
            PatternKind::BearishEngulfing => "Bearish Engulfing",
            PatternKind::PinbarBottom => "Pinbar Bottom",
            PatternKind::PinbarTop => "Pinbar Top",
            PatternKind::DoubleTop => "Double Top",
            PatternKind::DoubleBottom => "Double Bottom",
            PatternKind::MorningStar => "Morning Star",
            PatternKind::EveningStar => "Evening Star",
            PatternKind::QuasimodoBuy => "Quasimodo Buy",
            PatternKind::QuasimodoSell => "Quasimodo Sell",
            PatternKind::ImbalanceUp => "Imbalance Up",
            PatternKind::ImbalanceDown => "Imbalance Down",
            PatternKind::DemandZone => "Demand Zone",
            PatternKind::SupplyZone => "Supply Zone",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            PatternKind::BullishEngulfing
            | PatternKind::PinbarBottom
            | PatternKind::DoubleBottom
            | PatternKind::MorningStar
            | PatternKind::QuasimodoBuy
            | PatternKind::ImbalanceUp
            | PatternKind::DemandZone => Direction::Buy,
            PatternKind::BearishEngulfing
            | PatternKind::PinbarTop
            | PatternKind::DoubleTop
            | PatternKind::EveningStar
            | PatternKind::QuasimodoSell
            | PatternKind::ImbalanceDown
            | PatternKind::SupplyZone => Direction::Sell,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub direction: Direction,
}

impl PatternMatch {
    fn new(kind: PatternKind) -> Self {
        Self {
            kind,
            direction: kind.direction(),
        }
    }
}

const DOUBLE_TOLERANCE: f64 = 0.002;
const IMBALANCE_BODY_RATIO: f64 = 0.7;

/// Fixed-priority pattern selection. Candidates are probed in a fixed
/// order; the first whose implied direction agrees with the prevailing
/// trend wins. A match that disagrees with the trend is a rejection of
/// that candidate, not a fallback to another direction.
pub fn detect(candles: &CandleSeries, trend: Trend) -> Option<PatternMatch> {
    let wanted = trend.to_direction()?;

    let candidates = [
        engulfing(candles),
        pinbar(candles),
        double_top(candles),
        double_bottom(candles),
        morning_star(candles),
        evening_star(candles),
        quasimodo(candles),
        imbalance(candles, trend),
        demand_zone(candles),
        supply_zone(candles),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|m| m.direction == wanted)
}

/// Two-candle engulfing: the latest body fully wraps the previous body in
/// the opposite direction.
fn engulfing(c: &CandleSeries) -> Option<PatternMatch> {
    if c.len() < 2 {
        return None;
    }
    let prev = &c[c.len() - 2];
    let curr = &c[c.len() - 1];
    if prev.is_bearish() && curr.is_bullish() && curr.close > prev.open && curr.open < prev.close {
        return Some(PatternMatch::new(PatternKind::BullishEngulfing));
    }
    if prev.is_bullish() && curr.is_bearish() && curr.close < prev.open && curr.open > prev.close {
        return Some(PatternMatch::new(PatternKind::BearishEngulfing));
    }
    None
}

/// Single-candle pinbar: dominant wick at least twice the body and larger
/// than the opposite wick.
fn pinbar(c: &CandleSeries) -> Option<PatternMatch> {
    let last = c.last()?;
    let body = last.body();
    let upper = last.upper_wick();
    let lower = last.lower_wick();
    if upper > 2.0 * body && upper > lower {
        return Some(PatternMatch::new(PatternKind::PinbarTop));
    }
    if lower > 2.0 * body && lower > upper {
        return Some(PatternMatch::new(PatternKind::PinbarBottom));
    }
    None
}

/// Five-candle double top: symmetric peaks within 0.2% and a confirming
/// close below the second peak's low.
fn double_top(c: &CandleSeries) -> Option<PatternMatch> {
    if c.len() < 5 {
        return None;
    }
    let n = c.len();
    let (a, b, mid, d, e) = (&c[n - 5], &c[n - 4], &c[n - 3], &c[n - 2], &c[n - 1]);
    let symmetric = (b.high - d.high).abs() < DOUBLE_TOLERANCE * b.high;
    if a.high < b.high && b.high > mid.high && d.high < b.high && symmetric && e.close < d.low {
        return Some(PatternMatch::new(PatternKind::DoubleTop));
    }
    None
}

fn double_bottom(c: &CandleSeries) -> Option<PatternMatch> {
    if c.len() < 5 {
        return None;
    }
    let n = c.len();
    let (a, b, mid, d, e) = (&c[n - 5], &c[n - 4], &c[n - 3], &c[n - 2], &c[n - 1]);
    let symmetric = (b.low - d.low).abs() < DOUBLE_TOLERANCE * b.low;
    if a.low > b.low && b.low < mid.low && d.low > b.low && symmetric && e.close > d.high {
        return Some(PatternMatch::new(PatternKind::DoubleBottom));
    }
    None
}

/// Three-candle morning star: bearish candle, small-bodied dip, then a
/// bullish candle closing above the first candle's open.
fn morning_star(c: &CandleSeries) -> Option<PatternMatch> {
    if c.len() < 3 {
        return None;
    }
    let n = c.len();
    let (first, star, last) = (&c[n - 3], &c[n - 2], &c[n - 1]);
    if first.is_bearish()
        && star.low < first.close
        && star.body() < last.body()
        && last.is_bullish()
        && last.close > first.open
    {
        return Some(PatternMatch::new(PatternKind::MorningStar));
    }
    None
}

fn evening_star(c: &CandleSeries) -> Option<PatternMatch> {
    if c.len() < 3 {
        return None;
    }
    let n = c.len();
    let (first, star, last) = (&c[n - 3], &c[n - 2], &c[n - 1]);
    if first.is_bullish()
        && star.high > first.close
        && star.body() < last.body()
        && last.is_bearish()
        && last.close < first.open
    {
        return Some(PatternMatch::new(PatternKind::EveningStar));
    }
    None
}

/// Five-candle quasimodo swing failure. Buy: a lower-low sweep against
/// rising highs, resolved by a final higher high. Sell mirrors with
/// falling highs against a higher low.
fn quasimodo(c: &CandleSeries) -> Option<PatternMatch> {
    if c.len() < 5 {
        return None;
    }
    let n = c.len();
    let h1 = c[n - 5].high;
    let l1 = c[n - 4].low;
    let h2 = c[n - 3].high;
    let l2 = c[n - 2].low;
    let h3 = c[n - 1].high;

    if l2 < l1 && h2 > h1 && h3 > h2 {
        return Some(PatternMatch::new(PatternKind::QuasimodoBuy));
    }
    if h1 > h2 && l2 > l1 && h3 < h2 {
        return Some(PatternMatch::new(PatternKind::QuasimodoSell));
    }
    None
}

/// Single-candle imbalance: body dominates the range. Directionless on its
/// own; inherits the prevailing trend.
fn imbalance(c: &CandleSeries, trend: Trend) -> Option<PatternMatch> {
    let last = c.last()?;
    let range = last.total_range();
    if range <= 0.0 || last.body() / range <= IMBALANCE_BODY_RATIO {
        return None;
    }
    match trend {
        Trend::Bullish => Some(PatternMatch::new(PatternKind::ImbalanceUp)),
        Trend::Bearish => Some(PatternMatch::new(PatternKind::ImbalanceDown)),
        Trend::Neutral => None,
    }
}

/// Quiet 5-candle base then a bullish breakout closing above the base high.
fn demand_zone(c: &CandleSeries) -> Option<PatternMatch> {
    if c.len() < 10 {
        return None;
    }
    let base = c.slice(c.len() - 6, c.len() - 1);
    let last = &c[c.len() - 1];
    if is_quiet_base(&base) && last.close > base.highs_max() && last.is_bullish() {
        return Some(PatternMatch::new(PatternKind::DemandZone));
    }
    None
}

fn supply_zone(c: &CandleSeries) -> Option<PatternMatch> {
    if c.len() < 10 {
        return None;
    }
    let base = c.slice(c.len() - 6, c.len() - 1);
    let last = &c[c.len() - 1];
    if is_quiet_base(&base) && last.close < base.lows_min() && last.is_bearish() {
        return Some(PatternMatch::new(PatternKind::SupplyZone));
    }
    None
}

/// Every base candle's body stays under half the base's high-low range.
pub(crate) fn is_quiet_base(base: &CandleSeries) -> bool {
    let range = base.highs_max() - base.lows_min();
    base.iter().all(|c| c.body() < range / 2.0)
}
