use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::Config;
use crate::market::MarketData;
use crate::models::{Candle, CandleSeries, Tick, Timeframe};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
struct RateRow {
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct CandleResponse {
    rates: Vec<RateRow>,
}

#[derive(Debug, Deserialize)]
struct TickResponse {
    bid: Option<f64>,
    ask: Option<f64>,
    time: Option<i64>,
}

/// REST client for a local MT5 terminal gateway. One instance is shared by
/// both loops, so request pacing sits behind a mutex.
pub struct BridgeClient {
    client: Client,
    base_url: String,
    last_request: Mutex<Option<Instant>>,
}

impl BridgeClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: cfg.bridge_url.trim_end_matches('/').to_string(),
            last_request: Mutex::new(None),
        }
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl MarketData for BridgeClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        tf: Timeframe,
        count: usize,
    ) -> Result<CandleSeries> {
        self.rate_limit().await;

        let url = format!("{}/rates", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("timeframe", tf.bridge_name()),
                ("count", &count.to_string()),
            ])
            .send()
            .await
            .context("failed to fetch candles")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("bridge rates error for {}: {} {}", symbol, status, body);
            return Ok(CandleSeries::default());
        }

        let data: CandleResponse = resp.json().await.context("failed to parse rates")?;

        let mut candles: Vec<Candle> = data
            .rates
            .into_iter()
            .filter_map(|r| {
                let timestamp = DateTime::from_timestamp(r.time, 0)?;
                Some(Candle {
                    timestamp,
                    open: r.open,
                    high: r.high,
                    low: r.low,
                    close: r.close,
                })
            })
            .collect();

        // Gateway order is not guaranteed; callers assume oldest first.
        candles.sort_by_key(|c| c.timestamp);

        Ok(CandleSeries::new(candles))
    }

    async fn fetch_tick(&self, symbol: &str) -> Result<Option<Tick>> {
        self.rate_limit().await;

        let url = format!("{}/tick", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .context("failed to fetch tick")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("bridge tick error for {}: {} {}", symbol, status, body);
            return Ok(None);
        }

        let data: TickResponse = resp.json().await.context("failed to parse tick")?;

        let tick = match (data.bid, data.ask, data.time) {
            (Some(bid), Some(ask), Some(ts)) => DateTime::from_timestamp(ts, 0).map(|time| Tick {
                bid,
                ask,
                time,
            }),
            _ => None,
        };

        Ok(tick)
    }
}
