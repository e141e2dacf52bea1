use serde::{Deserialize, Serialize};

use crate::analysis::patterns::is_quiet_base;
use crate::models::{CandleSeries, Direction, ZoneKind};

/// A price level with its provenance. Recomputed per evaluation, never
/// persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneLevel {
    pub price: f64,
    pub kind: ZoneKind,
}

/// Swing highs and lows by strict 4-point comparison: an interior candle
/// whose high exceeds both neighbors on each side (lows mirrored).
pub fn swing_points(candles: &CandleSeries) -> (Vec<f64>, Vec<f64>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    if candles.len() < 5 {
        return (highs, lows);
    }

    for i in 2..candles.len() - 2 {
        let c = &candles[i];
        if c.high > candles[i - 2].high
            && c.high > candles[i - 1].high
            && c.high > candles[i + 1].high
            && c.high > candles[i + 2].high
        {
            highs.push(c.high);
        }
        if c.low < candles[i - 2].low
            && c.low < candles[i - 1].low
            && c.low < candles[i + 1].low
            && c.low < candles[i + 2].low
        {
            lows.push(c.low);
        }
    }

    (highs, lows)
}

/// Scan for quiet 5-candle bases followed by a confirming breakout. A
/// demand zone contributes its base low, a supply zone its base high.
pub fn zone_bases(candles: &CandleSeries) -> (Vec<f64>, Vec<f64>) {
    let mut demand = Vec::new();
    let mut supply = Vec::new();

    for i in 6..=candles.len() {
        let base = candles.slice(i - 6, i - 1);
        let breakout = &candles[i - 1];
        if !is_quiet_base(&base) {
            continue;
        }
        if breakout.close > base.highs_max() && breakout.is_bullish() {
            demand.push(base.lows_min());
        }
        if breakout.close < base.lows_min() && breakout.is_bearish() {
            supply.push(base.highs_max());
        }
    }

    (demand, supply)
}

/// Candidate take-profit levels ahead of entry: swing highs plus demand
/// bases above entry (ascending) for Buy, swing lows plus supply bases
/// below entry (descending) for Sell. The ordering directly drives TP
/// assignment.
pub fn zone_levels(candles: &CandleSeries, entry: f64, direction: Direction) -> Vec<ZoneLevel> {
    let (swing_highs, swing_lows) = swing_points(candles);
    let (demand, supply) = zone_bases(candles);

    let mut levels: Vec<ZoneLevel> = match direction {
        Direction::Buy => swing_highs
            .into_iter()
            .map(|p| ZoneLevel {
                price: p,
                kind: ZoneKind::SwingHigh,
            })
            .chain(demand.into_iter().map(|p| ZoneLevel {
                price: p,
                kind: ZoneKind::Demand,
            }))
            .filter(|z| z.price > entry)
            .collect(),
        Direction::Sell => swing_lows
            .into_iter()
            .map(|p| ZoneLevel {
                price: p,
                kind: ZoneKind::SwingLow,
            })
            .chain(supply.into_iter().map(|p| ZoneLevel {
                price: p,
                kind: ZoneKind::Supply,
            }))
            .filter(|z| z.price < entry)
            .collect(),
    };

    match direction {
        Direction::Buy => levels.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap()),
        Direction::Sell => levels.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap()),
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_candles;

    #[test]
    fn swing_high_requires_four_point_dominance() {
        let c = make_candles(&[
            (100.0, 101.0, 99.0, 100.5),
            (100.5, 102.0, 99.5, 101.0),
            (101.0, 105.0, 100.0, 104.0), // swing high at 105
            (104.0, 104.5, 100.5, 101.0),
            (101.0, 102.0, 99.0, 100.0),
        ]);
        let (highs, _) = swing_points(&c);
        assert_eq!(highs, vec![105.0]);
    }

    #[test]
    fn equal_neighbor_is_not_a_swing() {
        let c = make_candles(&[
            (100.0, 105.0, 99.0, 100.5),
            (100.5, 102.0, 99.5, 101.0),
            (101.0, 105.0, 100.0, 104.0), // ties the first high
            (104.0, 104.5, 100.5, 101.0),
            (101.0, 102.0, 99.0, 100.0),
        ]);
        let (highs, _) = swing_points(&c);
        assert!(highs.is_empty());
    }

    #[test]
    fn swing_low_detected() {
        let c = make_candles(&[
            (100.0, 101.0, 99.0, 100.5),
            (100.5, 101.5, 98.0, 99.0),
            (99.0, 100.0, 95.0, 96.0), // swing low at 95
            (96.0, 99.0, 95.5, 98.0),
            (98.0, 100.0, 97.0, 99.5),
        ]);
        let (_, lows) = swing_points(&c);
        assert_eq!(lows, vec![95.0]);
    }

    #[test]
    fn buy_levels_filtered_and_ascending() {
        let c = make_candles(&[
            (100.0, 101.0, 99.0, 100.5),
            (100.5, 102.0, 99.5, 101.0),
            (101.0, 106.0, 100.0, 105.0), // swing high 106
            (105.0, 105.5, 100.5, 101.0),
            (101.0, 102.0, 99.0, 100.0),
            (100.0, 101.0, 98.0, 99.0),
            (99.0, 104.0, 98.5, 103.0), // swing high 104
            (103.0, 103.5, 99.0, 100.0),
            (100.0, 101.0, 97.0, 98.0),
        ]);
        let levels = zone_levels(&c, 100.0, Direction::Buy);
        assert!(!levels.is_empty());
        let prices: Vec<f64> = levels.iter().map(|z| z.price).collect();
        let mut sorted = prices.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(prices, sorted);
        assert!(prices.iter().all(|&p| p > 100.0));
    }

    #[test]
    fn sell_levels_descending_below_entry() {
        let c = make_candles(&[
            (100.0, 101.0, 99.0, 100.5),
            (100.5, 101.5, 98.0, 99.0),
            (99.0, 100.0, 95.0, 96.0), // swing low 95
            (96.0, 99.0, 95.5, 98.0),
            (98.0, 100.0, 97.0, 99.5),
            (99.5, 100.5, 96.5, 97.0),
            (97.0, 98.0, 93.0, 94.0), // swing low 93
            (94.0, 97.0, 93.5, 96.0),
            (96.0, 98.0, 95.0, 97.5),
        ]);
        let levels = zone_levels(&c, 100.0, Direction::Sell);
        let prices: Vec<f64> = levels.iter().map(|z| z.price).collect();
        assert_eq!(prices, vec![95.0, 93.0]);
    }

    #[test]
    fn demand_base_low_recorded() {
        let mut rows: Vec<(f64, f64, f64, f64)> = vec![
            (100.2, 101.0, 99.2, 100.4),
            (100.4, 101.0, 99.4, 100.2),
            (100.2, 101.0, 99.0, 100.6),
            (100.6, 101.0, 99.5, 100.3),
            (100.3, 101.0, 99.3, 100.5),
        ];
        rows.push((100.5, 103.0, 100.2, 102.5)); // breakout
        let c = make_candles(&rows);
        let (demand, supply) = zone_bases(&c);
        assert_eq!(demand, vec![99.0]);
        assert!(supply.is_empty());
    }
}
