use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Direction;

/// Latest quote for a symbol. Ephemeral; stale ticks are rejected by the
/// market-open guard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

impl Tick {
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.time).num_seconds()
    }

    /// Side a new order would fill at: ask for Buy, bid for Sell.
    pub fn entry_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Buy => self.ask,
            Direction::Sell => self.bid,
        }
    }

    /// Side an open order would close at: bid for Buy, ask for Sell.
    pub fn exit_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Buy => self.bid,
            Direction::Sell => self.ask,
        }
    }
}
