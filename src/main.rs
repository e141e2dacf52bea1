mod bot;

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use fx_signal_bot::config::Config;
use fx_signal_bot::ledger::SheetsLedger;
use fx_signal_bot::market::BridgeClient;
use fx_signal_bot::notify::TelegramNotifier;

use crate::bot::SignalBot;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let market = Arc::new(BridgeClient::new(&cfg));
    let ledger = Arc::new(SheetsLedger::new(&cfg));
    let notifier = Arc::new(TelegramNotifier::new(&cfg));

    let mut bot = SignalBot::new(cfg.shared(), market, ledger, notifier);
    bot.run().await?;

    Ok(())
}
