pub mod bridge;

pub use bridge::BridgeClient;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CandleSeries, Tick, Timeframe};

/// Raw market-data access. Both calls fail soft: an upstream outage
/// surfaces as an empty series or a missing tick, never a panic.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        tf: Timeframe,
        count: usize,
    ) -> Result<CandleSeries>;

    async fn fetch_tick(&self, symbol: &str) -> Result<Option<Tick>>;
}
