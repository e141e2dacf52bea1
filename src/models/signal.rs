use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{Direction, SignalResult};

/// Ledger row layout (1-based columns):
/// Date | Symbol | Direction | Entry | SL | TP1 | TP2 | TP3 | Result | Pattern | Note | Reserved
pub const COL_SL: usize = 5;
pub const COL_RESULT: usize = 9;
pub const COL_NOTE: usize = 12;
pub const COLUMN_COUNT: usize = 12;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A trade idea as persisted to the ledger. Identity is the ledger row;
/// after creation only the result (and optionally the stop) change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub entry: f64,
    pub sl: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    pub created_at: NaiveDateTime,
    pub result: SignalResult,
    pub pattern: String,
    pub note: String,
}

impl Signal {
    pub fn date_string(&self) -> String {
        self.created_at.format(DATE_FORMAT).to_string()
    }

    /// Serialize into the fixed 12-column row, prices formatted at the
    /// symbol's display precision.
    pub fn to_row(&self, digits: u32) -> Vec<String> {
        vec![
            self.created_at.format(DATE_FORMAT).to_string(),
            self.symbol.clone(),
            self.direction.as_str().to_string(),
            format_price(self.entry, digits),
            format_price(self.sl, digits),
            format_price(self.tp1, digits),
            format_price(self.tp2, digits),
            format_price(self.tp3, digits),
            self.result.as_str().to_string(),
            self.pattern.clone(),
            self.note.clone(),
            String::new(),
        ]
    }
}

pub fn format_price(value: f64, digits: u32) -> String {
    format!("{:.*}", digits as usize, value)
}

/// One pip in price units: 0.01 for 3-digit (JPY-style) quotes, 0.0001
/// otherwise.
pub fn pip_size(digits: u32) -> f64 {
    if digits == 3 {
        0.01
    } else {
        0.0001
    }
}
