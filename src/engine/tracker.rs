use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::analysis::levels::round_to;
use crate::config::Config;
use crate::engine::ThreadIndex;
use crate::ledger::{find_open, Ledger, LedgerRecord};
use crate::market::MarketData;
use crate::models::signal::{format_price, COL_RESULT, COL_SL};
use crate::models::{Direction, SignalResult};
use crate::notify::{messages, Notifier};

const ERROR_PAUSE: Duration = Duration::from_secs(10);

/// Continuously polls live prices for every open ledger row and drives
/// each to a terminal outcome or expiry. Runs on its own task at a short
/// fixed interval, independent of the engine's bar-close cadence.
pub struct OrderLifecycleTracker {
    cfg: Arc<Config>,
    market: Arc<dyn MarketData>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    threads: ThreadIndex,
    /// Rows this process already closed. The ledger read cache can serve
    /// rows as still-open for its whole TTL after a close; trusting our own
    /// writes prevents double closure and duplicate notifications.
    closed_rows: HashSet<usize>,
}

impl OrderLifecycleTracker {
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
            threads,
            closed_rows: HashSet::new(),
        }
    }

    pub async fn run(mut self) {
        let interval = Duration::from_secs(self.cfg.poll_interval_secs);
        info!("order lifecycle tracker started");
        loop {
            match self.poll().await {
                Ok(()) => tokio::time::sleep(interval).await,
                Err(e) => {
                    error!("tracker cycle error: {:#}", e);
                    tokio::time::sleep(ERROR_PAUSE).await;
                }
            }
        }
    }

    pub async fn poll(&mut self) -> Result<()> {
        let records = self.ledger.read_all().await?;
        let now_local = Utc::now().with_timezone(&self.cfg.tz).naive_local();

        let open: Vec<(usize, LedgerRecord)> = find_open(&records)
            .into_iter()
            .map(|(row, r)| (row, r.clone()))
            .collect();

        for (row, record) in open {
            if self.closed_rows.contains(&row) {
                continue;
            }
            if let Err(e) = self.poll_row(row, &record, now_local).await {
                warn!("row {} ({}): {:#}", row, record.symbol, e);
            }
        }
        Ok(())
    }

    async fn poll_row(
        &mut self,
        row: usize,
        record: &LedgerRecord,
        now_local: NaiveDateTime,
    ) -> Result<()> {
        let spec = self.cfg.spec(&record.symbol);

        // Missing price or missing level data is a no-op; the row stays
        // open and is retried on the next poll.
        let parsed = match ParsedOrder::from_record(record) {
            Some(p) => p,
            None => return Ok(()),
        };
        let tick = match self.market.fetch_tick(&record.symbol).await? {
            Some(t) => t,
            None => return Ok(()),
        };

        let price = round_to(tick.exit_price(parsed.direction), spec.digits);
        let outcome = price_outcome(&parsed, price);

        if let Some(result) = outcome {
            self.close_row(row, record, result, spec.digits).await;
            return Ok(());
        }

        if self.expired(&parsed, now_local) {
            self.close_row(row, record, SignalResult::Expired, spec.digits)
                .await;
            return Ok(());
        }

        // First touch flips the freshly created row to Running; a refresh,
        // not a transition, so no notification.
        if record.result_state() == Some(SignalResult::Pending) {
            self.ledger
                .update_cell(row, COL_RESULT, SignalResult::Running.as_str())
                .await?;
        }

        if self.cfg.trail_to_breakeven {
            self.maybe_trail_to_breakeven(row, &parsed, spec.digits).await?;
        }

        Ok(())
    }

    fn expired(&self, parsed: &ParsedOrder, now_local: NaiveDateTime) -> bool {
        match parsed.created_at {
            Some(created) => {
                now_local > created + ChronoDuration::hours(self.cfg.expiry_hours)
            }
            None => false,
        }
    }

    async fn close_row(
        &mut self,
        row: usize,
        record: &LedgerRecord,
        result: SignalResult,
        digits: u32,
    ) {
        if let Err(e) = self.ledger.update_cell(row, COL_RESULT, result.as_str()).await {
            // Leave the row for the next poll rather than notifying about a
            // state the ledger never recorded.
            warn!("row {} ({}): result update failed: {:#}", row, record.symbol, e);
            return;
        }
        self.closed_rows.insert(row);
        info!("row {} ({}): closed as {}", row, record.symbol, result);

        let text = messages::closure_message(record, result, digits);
        if text.is_empty() {
            return;
        }
        let root = self.threads.read().await.get(&record.symbol).copied();
        self.notifier.send_text(&text, root).await;
    }

    /// Once price has reached TP1 while the row is still open, pull the
    /// recorded stop to entry (when it is not there already) and notify.
    /// Checked against a fresh quote: the row is only still open when the
    /// poll price sat short of TP1, so the trail fires on a move that lands
    /// between the two fetches.
    async fn maybe_trail_to_breakeven(
        &mut self,
        row: usize,
        parsed: &ParsedOrder,
        digits: u32,
    ) -> Result<()> {
        let tick = match self.market.fetch_tick(&parsed.symbol).await? {
            Some(t) => t,
            None => return Ok(()),
        };
        let price = round_to(tick.exit_price(parsed.direction), digits);
        let hit_tp1 = match parsed.direction {
            Direction::Buy => price >= parsed.tp1,
            Direction::Sell => price <= parsed.tp1,
        };
        if !hit_tp1 {
            return Ok(());
        }
        if round_to(parsed.sl, digits) == round_to(parsed.entry, digits) {
            return Ok(());
        }

        self.ledger
            .update_cell(row, COL_SL, &format_price(parsed.entry, digits))
            .await?;
        info!("row {} ({}): stop trailed to break-even", row, parsed.symbol);
        let text = messages::breakeven_message(&parsed.symbol, parsed.entry, digits);
        self.notifier.send_text(&text, None).await;
        Ok(())
    }
}

struct ParsedOrder {
    symbol: String,
    direction: Direction,
    entry: f64,
    sl: f64,
    tp1: f64,
    tp2: f64,
    tp3: f64,
    created_at: Option<NaiveDateTime>,
}

impl ParsedOrder {
    fn from_record(record: &LedgerRecord) -> Option<Self> {
        Some(Self {
            symbol: record.symbol.clone(),
            direction: record.direction?,
            entry: record.entry?,
            sl: record.sl?,
            tp1: record.tp1?,
            tp2: record.tp2?,
            tp3: record.tp3?,
            created_at: record.created_at(),
        })
    }
}

/// Hit conditions in priority order SL > TP3 > TP2 > TP1: when a price
/// move since the last poll satisfies several levels at once, the
/// worst-for-the-trade outcome wins, and among targets the farthest one.
fn price_outcome(order: &ParsedOrder, price: f64) -> Option<SignalResult> {
    match order.direction {
        Direction::Buy => {
            if price <= order.sl {
                Some(SignalResult::Sl)
            } else if price >= order.tp3 {
                Some(SignalResult::Tp3)
            } else if price >= order.tp2 {
                Some(SignalResult::Tp2)
            } else if price >= order.tp1 {
                Some(SignalResult::Tp1)
            } else {
                None
            }
        }
        Direction::Sell => {
            if price >= order.sl {
                Some(SignalResult::Sl)
            } else if price <= order.tp3 {
                Some(SignalResult::Tp3)
            } else if price <= order.tp2 {
                Some(SignalResult::Tp2)
            } else if price <= order.tp1 {
                Some(SignalResult::Tp1)
            } else {
                None
            }
        }
    }
}
