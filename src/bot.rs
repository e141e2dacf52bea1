use anyhow::Result;
use chrono::{Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use fx_signal_bot::config::Config;
use fx_signal_bot::engine::{new_thread_index, OrderLifecycleTracker, Reporter, SignalEngine};
use fx_signal_bot::ledger::Ledger;
use fx_signal_bot::market::MarketData;
use fx_signal_bot::notify::Notifier;

/// Pause between bar-close probes while waiting for the next M15 boundary.
const BOUNDARY_PROBE_INTERVAL: Duration = Duration::from_secs(5);
/// Breather at the end of each engine cycle.
const CYCLE_PAUSE: Duration = Duration::from_secs(5);

pub struct SignalBot {
    cfg: Arc<Config>,
    engine: SignalEngine,
    reporter: Reporter,
    tracker: Option<OrderLifecycleTracker>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
}

impl SignalBot {
    pub fn new(
        cfg: Arc<Config>,
        market: Arc<dyn MarketData>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        info!("{}", "=".repeat(60));
        info!("Signal scanner starting up");
        info!("Universe: {} symbols on {}", cfg.symbols.len(), cfg.timeframe);
        info!(
            "Locks: global={} per-symbol={} | ATR fallback={} | BE trail={}",
            cfg.block_when_running_global,
            cfg.block_when_running_per_symbol,
            cfg.fallback_use_atr,
            cfg.trail_to_breakeven
        );
        info!("{}", "=".repeat(60));

        let threads = new_thread_index();
        let engine = SignalEngine::new(
            cfg.clone(),
            market.clone(),
            ledger.clone(),
            notifier.clone(),
            threads.clone(),
        );
        let tracker = OrderLifecycleTracker::new(
            cfg.clone(),
            market,
            ledger.clone(),
            notifier.clone(),
            threads,
        );

        Self {
            cfg,
            engine,
            reporter: Reporter::new(),
            tracker: Some(tracker),
            ledger,
            notifier,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        // The tracker polls on its own task at its own cadence; the two
        // loops share only the ledger and the thread index.
        if let Some(tracker) = self.tracker.take() {
            tokio::spawn(tracker.run());
        }

        info!("Bot is now running. Press Ctrl+C to stop.");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down.");
                    return Ok(());
                }
                _ = self.cycle() => {}
            }
        }
    }

    async fn cycle(&mut self) {
        self.wait_for_bar_close().await;

        self.engine.run_cycle().await;

        let now_local = Utc::now().with_timezone(&self.cfg.tz).naive_local();
        self.reporter
            .maybe_report(now_local, self.ledger.as_ref(), self.notifier.as_ref())
            .await;

        tokio::time::sleep(CYCLE_PAUSE).await;
    }

    /// Block until just after an M15 close so signals are computed on a
    /// finished bar, never a forming one.
    async fn wait_for_bar_close(&self) {
        loop {
            let now = Utc::now().with_timezone(&self.cfg.tz);
            if now.minute() % 15 == 0 && now.second() < 10 {
                info!("M15 close reached, scanning");
                return;
            }
            tokio::time::sleep(BOUNDARY_PROBE_INTERVAL).await;
        }
    }
}
