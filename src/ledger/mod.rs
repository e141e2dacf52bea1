pub mod sheets;

pub use sheets::SheetsLedger;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::models::signal::DATE_FORMAT;
use crate::models::{Direction, SignalResult};

/// First data row of the sheet (row 1 is the header).
pub const FIRST_DATA_ROW: usize = 2;

/// Append-only signal ledger. Implementations own their retry/backoff; the
/// core treats every call as possibly slow or transiently failing.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Append a row, returning its 1-based sheet row index.
    async fn append_row(&self, row: &[String]) -> Result<usize>;

    /// Overwrite a single cell (1-based row and column).
    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<()>;

    /// All data rows in insertion order. May be served from a short-lived
    /// cache; writers must rely on write return values, not re-reads.
    async fn read_all(&self) -> Result<Vec<LedgerRecord>>;
}

/// A parsed ledger row. Cells arrive as strings; numeric fields that fail
/// to parse surface as None and make the row ineligible for tracking until
/// fixed.
#[derive(Debug, Clone, Default)]
pub struct LedgerRecord {
    pub date: String,
    pub symbol: String,
    pub direction: Option<Direction>,
    pub entry: Option<f64>,
    pub sl: Option<f64>,
    pub tp1: Option<f64>,
    pub tp2: Option<f64>,
    pub tp3: Option<f64>,
    pub result: String,
    pub pattern: String,
    pub note: String,
}

impl LedgerRecord {
    pub fn from_cells(cells: &[String]) -> Self {
        let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
        Self {
            date: cell(0),
            symbol: cell(1),
            direction: Direction::from_str_loose(&cell(2)),
            entry: parse_price(&cell(3)),
            sl: parse_price(&cell(4)),
            tp1: parse_price(&cell(5)),
            tp2: parse_price(&cell(6)),
            tp3: parse_price(&cell(7)),
            result: cell(8).trim().to_string(),
            pattern: cell(9),
            note: cell(10),
        }
    }

    pub fn result_state(&self) -> Option<SignalResult> {
        SignalResult::from_str_loose(&self.result)
    }

    /// A row is open unless its result parses to a terminal state.
    /// Unknown result strings count as open.
    pub fn is_open(&self) -> bool {
        !self.result_state().map_or(false, |r| r.is_closed())
    }

    pub fn created_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.date, DATE_FORMAT).ok()
    }
}

/// Open rows with their 1-based sheet row indices.
pub fn find_open(records: &[LedgerRecord]) -> Vec<(usize, &LedgerRecord)> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_open())
        .map(|(i, r)| (i + FIRST_DATA_ROW, r))
        .collect()
}

/// Tolerant price parsing: strips thousands separators and non-breaking
/// spaces that spreadsheet exports sneak in.
fn parse_price(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, ',' | '\u{a0}' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}
