use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "Buy",
            Direction::Sell => "Sell",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Direction> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Direction::Buy),
            "sell" => Some(Direction::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Bullish => write!(f, "bullish"),
            Trend::Bearish => write!(f, "bearish"),
            Trend::Neutral => write!(f, "neutral"),
        }
    }
}

impl Trend {
    pub fn to_direction(self) -> Option<Direction> {
        match self {
            Trend::Bullish => Some(Direction::Buy),
            Trend::Bearish => Some(Direction::Sell),
            Trend::Neutral => None,
        }
    }
}

/// Lifecycle state of a tracked signal. The string forms are the exact
/// values stored in the ledger's Result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalResult {
    Pending,
    Running,
    Tp1,
    Tp2,
    Tp3,
    Sl,
    Expired,
}

impl SignalResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalResult::Pending => "Pending",
            SignalResult::Running => "Running",
            SignalResult::Tp1 => "TP1",
            SignalResult::Tp2 => "TP2",
            SignalResult::Tp3 => "TP3",
            SignalResult::Sl => "SL",
            SignalResult::Expired => "Expired",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<SignalResult> {
        match s.trim() {
            "Pending" => Some(SignalResult::Pending),
            "Running" => Some(SignalResult::Running),
            "TP1" => Some(SignalResult::Tp1),
            "TP2" => Some(SignalResult::Tp2),
            "TP3" => Some(SignalResult::Tp3),
            "SL" => Some(SignalResult::Sl),
            "Expired" => Some(SignalResult::Expired),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            SignalResult::Tp1
                | SignalResult::Tp2
                | SignalResult::Tp3
                | SignalResult::Sl
                | SignalResult::Expired
        )
    }

    pub fn is_take_profit(&self) -> bool {
        matches!(
            self,
            SignalResult::Tp1 | SignalResult::Tp2 | SignalResult::Tp3
        )
    }
}

impl fmt::Display for SignalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance of a price level extracted from the candle history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    SwingHigh,
    SwingLow,
    Demand,
    Supply,
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneKind::SwingHigh => write!(f, "swing_high"),
            ZoneKind::SwingLow => write!(f, "swing_low"),
            ZoneKind::Demand => write!(f, "demand"),
            ZoneKind::Supply => write!(f, "supply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_round_trip() {
        for r in [
            SignalResult::Pending,
            SignalResult::Running,
            SignalResult::Tp1,
            SignalResult::Tp2,
            SignalResult::Tp3,
            SignalResult::Sl,
            SignalResult::Expired,
        ] {
            assert_eq!(SignalResult::from_str_loose(r.as_str()), Some(r));
        }
    }

    #[test]
    fn open_vs_closed() {
        assert!(!SignalResult::Pending.is_closed());
        assert!(!SignalResult::Running.is_closed());
        assert!(SignalResult::Tp1.is_closed());
        assert!(SignalResult::Sl.is_closed());
        assert!(SignalResult::Expired.is_closed());
    }

    #[test]
    fn trend_to_direction() {
        assert_eq!(Trend::Bullish.to_direction(), Some(Direction::Buy));
        assert_eq!(Trend::Bearish.to_direction(), Some(Direction::Sell));
        assert_eq!(Trend::Neutral.to_direction(), None);
    }
}
