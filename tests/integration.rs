use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use fx_signal_bot::config::Config;
use fx_signal_bot::engine::{new_thread_index, OrderLifecycleTracker, SignalEngine, ThreadIndex};
use fx_signal_bot::ledger::{Ledger, LedgerRecord};
use fx_signal_bot::market::MarketData;
use fx_signal_bot::models::signal::DATE_FORMAT;
use fx_signal_bot::models::{Candle, CandleSeries, Tick, Timeframe};
use fx_signal_bot::notify::Notifier;

/// A market that serves canned candles and a tick sequence per symbol:
/// queued ticks are consumed in order, the last one repeats forever.
struct MockMarket {
    candles: Mutex<HashMap<String, CandleSeries>>,
    ticks: Mutex<HashMap<String, VecDeque<Tick>>>,
}

impl MockMarket {
    fn new() -> Self {
        Self {
            candles: Mutex::new(HashMap::new()),
            ticks: Mutex::new(HashMap::new()),
        }
    }

    async fn set_candles(&self, symbol: &str, series: CandleSeries) {
        self.candles.lock().await.insert(symbol.to_string(), series);
    }

    async fn push_candle(&self, symbol: &str, candle: Candle) {
        self.candles
            .lock()
            .await
            .entry(symbol.to_string())
            .or_default()
            .push(candle);
    }

    async fn set_tick(&self, symbol: &str, bid: f64, ask: f64) {
        let tick = Tick {
            bid,
            ask,
            time: Utc::now(),
        };
        self.ticks
            .lock()
            .await
            .insert(symbol.to_string(), VecDeque::from([tick]));
    }

    async fn queue_tick(&self, symbol: &str, bid: f64, ask: f64) {
        let tick = Tick {
            bid,
            ask,
            time: Utc::now(),
        };
        self.ticks
            .lock()
            .await
            .entry(symbol.to_string())
            .or_default()
            .push_back(tick);
    }
}

#[async_trait]
impl MarketData for MockMarket {
    async fn fetch_candles(
        &self,
        symbol: &str,
        _tf: Timeframe,
        _count: usize,
    ) -> Result<CandleSeries> {
        Ok(self
            .candles
            .lock()
            .await
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_tick(&self, symbol: &str) -> Result<Option<Tick>> {
        let mut ticks = self.ticks.lock().await;
        Ok(match ticks.get_mut(symbol) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().copied(),
            None => None,
        })
    }
}

/// An in-memory ledger with the same row identity semantics as the sheet:
/// data rows start at row 2.
struct MockLedger {
    rows: Mutex<Vec<Vec<String>>>,
}

impl MockLedger {
    fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    async fn seed(&self, row: Vec<String>) {
        self.rows.lock().await.push(row);
    }

    async fn cell(&self, row: usize, col: usize) -> String {
        self.rows.lock().await[row - 2][col - 1].clone()
    }

    async fn row_count(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn append_row(&self, row: &[String]) -> Result<usize> {
        let mut rows = self.rows.lock().await;
        rows.push(row.to_vec());
        Ok(rows.len() + 1)
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<()> {
        let mut rows = self.rows.lock().await;
        rows[row - 2][col - 1] = value.to_string();
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<LedgerRecord>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .map(|cells| LedgerRecord::from_cells(cells))
            .collect())
    }
}

/// Records every message; hands out sequential message ids.
struct MockNotifier {
    sent: Mutex<Vec<(String, Option<i64>)>>,
}

impl MockNotifier {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    async fn messages(&self) -> Vec<(String, Option<i64>)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_text(&self, text: &str, reply_to: Option<i64>) -> Option<i64> {
        let mut sent = self.sent.lock().await;
        sent.push((text.to_string(), reply_to));
        Some(100 + sent.len() as i64)
    }

    async fn send_image(&self, _path: &Path, _caption: Option<&str>) -> Option<i64> {
        None
    }
}

fn test_config() -> Arc<Config> {
    let mut cfg = Config::from_env();
    // One weekend-allowed symbol keeps the market-open guard deterministic
    // regardless of the day the test runs.
    cfg.symbols = vec!["BTCUSD".to_string()];
    cfg.sheet_id = String::new();
    cfg.telegram_token = String::new();
    Arc::new(cfg)
}

/// 99 candles: a steady climb with two spike highs left above the market,
/// ending on a bearish candle. Pushing `engulfing_candle()` afterwards
/// completes a bullish engulfing at a fresh bar.
fn base_series() -> CandleSeries {
    let start = DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let mut candles: Vec<Candle> = (0..98)
        .map(|i| {
            let open = 39000.0 + i as f64 * 10.0;
            let close = open + 8.0;
            Candle {
                timestamp: start + Duration::minutes(15 * i as i64),
                open,
                high: close + 2.0,
                low: open - 3.0,
                close,
            }
        })
        .collect();

    // Two isolated spikes high above the eventual entry become swing highs
    // the level calculator can target.
    candles[85].high = 40400.0;
    candles[90].high = 40800.0;

    // Bearish candle for the engulfing setup
    candles.push(Candle {
        timestamp: start + Duration::minutes(15 * 98),
        open: 40010.0,
        high: 40020.0,
        low: 39950.0,
        close: 39960.0,
    });

    CandleSeries::new(candles)
}

fn engulfing_candle() -> Candle {
    let start = DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    Candle {
        timestamp: start + Duration::minutes(15 * 99),
        open: 39950.0,
        high: 40060.0,
        low: 39940.0,
        close: 40050.0,
    }
}

struct Harness {
    cfg: Arc<Config>,
    market: Arc<MockMarket>,
    ledger: Arc<MockLedger>,
    notifier: Arc<MockNotifier>,
    threads: ThreadIndex,
    engine: SignalEngine,
}

async fn harness() -> Harness {
    let cfg = test_config();
    let market = Arc::new(MockMarket::new());
    let ledger = Arc::new(MockLedger::new());
    let notifier = Arc::new(MockNotifier::new());
    let threads = new_thread_index();

    market.set_candles("BTCUSD", base_series()).await;
    market.set_tick("BTCUSD", 40000.00, 40000.10).await;

    let engine = SignalEngine::new(
        cfg.clone(),
        market.clone(),
        ledger.clone(),
        notifier.clone(),
        threads.clone(),
    );

    Harness {
        cfg,
        market,
        ledger,
        notifier,
        threads,
        engine,
    }
}

fn tracker_for(h: &Harness) -> OrderLifecycleTracker {
    OrderLifecycleTracker::new(
        h.cfg.clone(),
        h.market.clone(),
        h.ledger.clone(),
        h.notifier.clone(),
        h.threads.clone(),
    )
}

fn price(v: f64) -> String {
    format!("{:.2}", v)
}

fn open_row(date: &str, entry: f64, sl: f64, tp1: f64, tp2: f64, tp3: f64) -> Vec<String> {
    vec![
        date.to_string(),
        "BTCUSD".to_string(),
        "Buy".to_string(),
        price(entry),
        price(sl),
        price(tp1),
        price(tp2),
        price(tp3),
        "Pending".to_string(),
        "Bullish Engulfing".to_string(),
        String::new(),
        String::new(),
    ]
}

fn local_now_string(cfg: &Config, offset: Duration) -> String {
    (Utc::now().with_timezone(&cfg.tz).naive_local() + offset)
        .format(DATE_FORMAT)
        .to_string()
}

#[tokio::test]
async fn first_observation_never_signals() {
    let mut h = harness().await;
    h.engine.run_cycle().await;
    // The new-bar guard only armed its memory; nothing was written.
    assert_eq!(h.ledger.row_count().await, 0);
    assert!(h.notifier.messages().await.is_empty());
}

#[tokio::test]
async fn full_cycle_creates_valid_signal() {
    let mut h = harness().await;
    h.engine.run_cycle().await; // arms the bar memory
    h.market.push_candle("BTCUSD", engulfing_candle()).await;
    h.engine.run_cycle().await; // fresh bar -> signal

    assert_eq!(h.ledger.row_count().await, 1);
    let records = h.ledger.read_all().await.unwrap();
    let r = &records[0];

    assert_eq!(r.symbol, "BTCUSD");
    assert_eq!(r.result, "Pending");
    assert_eq!(r.pattern, "Bullish Engulfing");

    let entry = r.entry.unwrap();
    let (sl, tp1, tp2, tp3) = (
        r.sl.unwrap(),
        r.tp1.unwrap(),
        r.tp2.unwrap(),
        r.tp3.unwrap(),
    );

    // Direction-ordered levels with the symbol's minimum gap honored
    assert!(sl < entry, "sl {} must be below entry {}", sl, entry);
    assert!(tp1 > entry && tp1 <= tp2 && tp2 <= tp3);
    let min_gap = h.cfg.spec("BTCUSD").min_gap;
    for level in [sl, tp1, tp2, tp3] {
        assert!((entry - level).abs() > min_gap);
        assert!(level != 0.0);
    }

    // Entry announcement went out and its id became the thread root
    let messages = h.notifier.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].0.contains("New Trade Signal"));
    assert!(h.threads.read().await.contains_key("BTCUSD"));
}

#[tokio::test]
async fn duplicate_window_blocks_back_to_back_signals() {
    let mut h = harness().await;
    h.engine.run_cycle().await;
    h.market.push_candle("BTCUSD", engulfing_candle()).await;
    h.engine.run_cycle().await;
    assert_eq!(h.ledger.row_count().await, 1);

    // Another fresh bar 15 minutes later: the open row trips the
    // per-symbol lock, and the duplicate window would reject it too.
    let mut next = engulfing_candle();
    next.timestamp = next.timestamp + Duration::minutes(15);
    h.market.push_candle("BTCUSD", next).await;
    h.engine.run_cycle().await;
    assert_eq!(h.ledger.row_count().await, 1);
}

#[tokio::test]
async fn tracker_applies_tp3_priority() {
    let h = harness().await;
    let date = local_now_string(&h.cfg, Duration::minutes(-5));
    h.ledger
        .seed(open_row(&date, 40000.0, 39800.0, 40200.0, 40400.0, 40600.0))
        .await;
    h.threads.write().await.insert("BTCUSD".to_string(), 777);

    // Price gapped past TP1, TP2 and TP3 since the last poll
    h.market.set_tick("BTCUSD", 40650.0, 40650.5).await;
    let mut tracker = tracker_for(&h);
    tracker.poll().await.unwrap();

    assert_eq!(h.ledger.cell(2, 9).await, "TP3");
    let messages = h.notifier.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].0.contains("TP3"));
    // Threaded as a reply to the original announcement
    assert_eq!(messages[0].1, Some(777));

    // The row is terminal now; another poll must not touch it again
    h.market.set_tick("BTCUSD", 39000.0, 39000.5).await;
    tracker.poll().await.unwrap();
    assert_eq!(h.ledger.cell(2, 9).await, "TP3");
    assert_eq!(h.notifier.messages().await.len(), 1);
}

#[tokio::test]
async fn tracker_stop_beats_targets() {
    let h = harness().await;
    let date = local_now_string(&h.cfg, Duration::minutes(-5));
    h.ledger
        .seed(open_row(&date, 40000.0, 39800.0, 40200.0, 40400.0, 40600.0))
        .await;

    // Bid at the stop: SL wins even though nothing else was hit
    h.market.set_tick("BTCUSD", 39800.0, 39800.5).await;
    let mut tracker = tracker_for(&h);
    tracker.poll().await.unwrap();

    assert_eq!(h.ledger.cell(2, 9).await, "SL");
    let messages = h.notifier.messages().await;
    assert_eq!(messages.len(), 1);
    // No root known for this row -> standalone message
    assert_eq!(messages[0].1, None);
}

#[tokio::test]
async fn tracker_expires_old_rows_regardless_of_price() {
    let h = harness().await;
    // Created five hours ago, expiry horizon is four
    let date = local_now_string(&h.cfg, Duration::hours(-5));
    h.ledger
        .seed(open_row(&date, 40000.0, 39800.0, 40200.0, 40400.0, 40600.0))
        .await;

    // Price is mid-range, hitting nothing
    h.market.set_tick("BTCUSD", 40100.0, 40100.5).await;
    let mut tracker = tracker_for(&h);
    tracker.poll().await.unwrap();

    assert_eq!(h.ledger.cell(2, 9).await, "Expired");
    let messages = h.notifier.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].0.contains("Expired"));
}

#[tokio::test]
async fn tracker_flips_pending_to_running_quietly() {
    let h = harness().await;
    let date = local_now_string(&h.cfg, Duration::minutes(-5));
    h.ledger
        .seed(open_row(&date, 40000.0, 39800.0, 40200.0, 40400.0, 40600.0))
        .await;

    h.market.set_tick("BTCUSD", 40100.0, 40100.5).await;
    let mut tracker = tracker_for(&h);
    tracker.poll().await.unwrap();

    assert_eq!(h.ledger.cell(2, 9).await, "Running");
    // A refresh is not a transition: no notification
    assert!(h.notifier.messages().await.is_empty());
}

#[tokio::test]
async fn tracker_skips_rows_with_missing_data() {
    let h = harness().await;
    let date = local_now_string(&h.cfg, Duration::minutes(-5));
    let mut row = open_row(&date, 40000.0, 39800.0, 40200.0, 40400.0, 40600.0);
    row[4] = String::new(); // SL cell wiped
    h.ledger.seed(row).await;

    h.market.set_tick("BTCUSD", 39000.0, 39000.5).await;
    let mut tracker = tracker_for(&h);
    tracker.poll().await.unwrap();

    // Still Pending, untouched, no messages: retried next poll
    assert_eq!(h.ledger.cell(2, 9).await, "Pending");
    assert!(h.notifier.messages().await.is_empty());
}

#[tokio::test]
async fn breakeven_trail_moves_stop_to_entry() {
    let mut cfg = Config::from_env();
    cfg.symbols = vec!["BTCUSD".to_string()];
    cfg.trail_to_breakeven = true;
    let cfg = Arc::new(cfg);

    let market = Arc::new(MockMarket::new());
    let ledger = Arc::new(MockLedger::new());
    let notifier = Arc::new(MockNotifier::new());
    let threads = new_thread_index();

    let date = (Utc::now().with_timezone(&cfg.tz).naive_local() - Duration::minutes(5))
        .format(DATE_FORMAT)
        .to_string();
    ledger
        .seed(open_row(&date, 40000.0, 39800.0, 40300.0, 40500.0, 40700.0))
        .await;

    // First quote sits short of TP1 (row stays open); the trail's fresh
    // quote has crossed it.
    market.queue_tick("BTCUSD", 40250.0, 40250.5).await;
    market.queue_tick("BTCUSD", 40350.0, 40350.5).await;

    let mut tracker = OrderLifecycleTracker::new(
        cfg.clone(),
        market.clone(),
        ledger.clone(),
        notifier.clone(),
        threads,
    );
    tracker.poll().await.unwrap();

    // Row still open (flipped to Running), stop pulled to entry, notified
    assert_eq!(ledger.cell(2, 9).await, "Running");
    assert_eq!(ledger.cell(2, 5).await, price(40000.0));
    let messages = notifier.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].0.contains("BE"));
}
