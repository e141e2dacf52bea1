use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::Config;
use crate::ledger::{Ledger, LedgerRecord};
use crate::models::signal::COLUMN_COUNT;

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const READ_MAX_RETRIES: u32 = 6;
const READ_BASE_BACKOFF: f64 = 1.0;
const READ_BACKOFF_CAP: f64 = 64.0;
const WRITE_MAX_RETRIES: u32 = 5;
const WRITE_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Refresh the access token a minute before Google expires it.
const TOKEN_EXPIRY_MARGIN: u64 = 60;

#[derive(Debug, Serialize)]
struct GrantClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Debug, Deserialize)]
struct AppendUpdates {
    #[serde(rename = "updatedRange")]
    updated_range: String,
}

#[derive(Debug, Serialize)]
struct ValueRange {
    values: Vec<Vec<String>>,
}

struct CachedToken {
    fetched_at: Instant,
    ttl: Duration,
    token: String,
}

/// Google Sheets ledger. Owns its retry policy: reads back off
/// exponentially with jitter, writes retry flatly — both are idempotent or
/// safely re-issuable. Reads are served through a time-boxed cache;
/// invalidation is purely TTL-based, never explicit.
pub struct SheetsLedger {
    client: Client,
    sheet_id: String,
    sheet_name: String,
    sa_email: String,
    sa_private_key: String,
    token: Mutex<Option<CachedToken>>,
    cache: Mutex<Option<(Instant, Vec<LedgerRecord>)>>,
    cache_ttl: Duration,
}

impl SheetsLedger {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            sheet_id: cfg.sheet_id.clone(),
            sheet_name: cfg.sheet_name.clone(),
            sa_email: cfg.google_sa_email.clone(),
            sa_private_key: cfg.google_sa_private_key.clone(),
            token: Mutex::new(None),
            cache: Mutex::new(None),
            cache_ttl: Duration::from_secs(cfg.ledger_cache_ttl_secs),
        }
    }

    /// Service-account JWT grant, cached until shortly before expiry.
    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < cached.ttl {
                return Ok(cached.token.clone());
            }
        }

        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let claims = GrantClaims {
            iss: self.sa_email.clone(),
            scope: SCOPE.to_string(),
            aud: TOKEN_URL.to_string(),
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(self.sa_private_key.as_bytes())
            .context("failed to parse service-account key as RSA PEM")?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .context("failed to sign token grant")?;

        let resp = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("token exchange failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("token exchange error {}: {}", status, body));
        }

        let token: TokenResponse = resp.json().await.context("failed to parse token")?;
        let ttl = Duration::from_secs(token.expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN));
        guard.replace(CachedToken {
            fetched_at: Instant::now(),
            ttl,
            token: token.access_token.clone(),
        });
        Ok(token.access_token)
    }

    async fn fetch_rows(&self) -> Result<Vec<LedgerRecord>> {
        let token = self.access_token().await?;
        let range = format!("{}!A2:L", self.sheet_name);
        let url = format!("{}/{}/values/{}", SHEETS_BASE, self.sheet_id, range);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .context("failed to read sheet")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("sheet read error {}: {}", status, body));
        }

        let data: ValuesResponse = resp.json().await.context("failed to parse sheet values")?;
        Ok(data
            .values
            .iter()
            .map(|cells| LedgerRecord::from_cells(cells))
            .collect())
    }
}

#[async_trait]
impl Ledger for SheetsLedger {
    async fn append_row(&self, row: &[String]) -> Result<usize> {
        let range = format!("{}!A1:L1", self.sheet_name);
        let url = format!(
            "{}/{}/values/{}:append?valueInputOption=USER_ENTERED",
            SHEETS_BASE, self.sheet_id, range
        );
        let body = ValueRange {
            values: vec![row.to_vec()],
        };

        let mut last_err = None;
        for attempt in 1..=WRITE_MAX_RETRIES {
            let result: Result<usize> = async {
                let token = self.access_token().await?;
                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(&token)
                    .json(&body)
                    .send()
                    .await
                    .context("append request failed")?;

                let status = resp.status();
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    return Err(anyhow!("append error {}: {}", status, text));
                }

                let data: AppendResponse =
                    resp.json().await.context("failed to parse append response")?;
                parse_appended_row(&data.updates.updated_range)
            }
            .await;

            match result {
                Ok(row_idx) => return Ok(row_idx),
                Err(e) => {
                    warn!("ledger append retry {}: {:#}", attempt, e);
                    last_err = Some(e);
                    if attempt < WRITE_MAX_RETRIES {
                        tokio::time::sleep(WRITE_RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("append failed")))
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<()> {
        let range = format!("{}!{}", self.sheet_name, a1_cell(row, col));
        let url = format!(
            "{}/{}/values/{}?valueInputOption=USER_ENTERED",
            SHEETS_BASE, self.sheet_id, range
        );
        let body = ValueRange {
            values: vec![vec![value.to_string()]],
        };

        let mut last_err = None;
        for attempt in 1..=WRITE_MAX_RETRIES {
            let result: Result<()> = async {
                let token = self.access_token().await?;
                let resp = self
                    .client
                    .put(&url)
                    .bearer_auth(&token)
                    .json(&body)
                    .send()
                    .await
                    .context("update request failed")?;

                let status = resp.status();
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    return Err(anyhow!("update error {}: {}", status, text));
                }
                Ok(())
            }
            .await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("ledger update retry {}: {:#}", attempt, e);
                    last_err = Some(e);
                    if attempt < WRITE_MAX_RETRIES {
                        tokio::time::sleep(WRITE_RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("update failed")))
    }

    async fn read_all(&self) -> Result<Vec<LedgerRecord>> {
        {
            let cache = self.cache.lock().await;
            if let Some((fetched_at, records)) = cache.as_ref() {
                if fetched_at.elapsed() < self.cache_ttl {
                    return Ok(records.clone());
                }
            }
        }

        let mut backoff = READ_BASE_BACKOFF;
        let mut last_err = None;
        for attempt in 1..=READ_MAX_RETRIES {
            match self.fetch_rows().await {
                Ok(records) => {
                    let mut cache = self.cache.lock().await;
                    cache.replace((Instant::now(), records.clone()));
                    return Ok(records);
                }
                Err(e) => {
                    warn!("ledger read retry {}: {:#}", attempt, e);
                    last_err = Some(e);
                    if attempt < READ_MAX_RETRIES {
                        let jitter: f64 = rand::thread_rng().gen_range(0.0..0.5);
                        let sleep_s = (backoff + jitter).min(READ_BACKOFF_CAP);
                        tokio::time::sleep(Duration::from_secs_f64(sleep_s)).await;
                        backoff *= 2.0;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("read failed")))
    }
}

/// The append response names the written range, e.g. "Signal!A42:L42";
/// the trailing row number is the new row's identity.
fn parse_appended_row(updated_range: &str) -> Result<usize> {
    let range = updated_range
        .rsplit('!')
        .next()
        .ok_or_else(|| anyhow!("malformed updatedRange: {}", updated_range))?;
    let first_cell = range.split(':').next().unwrap_or(range);
    let digits: String = first_cell.chars().filter(|c| c.is_ascii_digit()).collect();
    digits
        .parse()
        .with_context(|| format!("no row number in updatedRange: {}", updated_range))
}

/// 1-based (row, col) to A1 notation. The schema is 12 columns, so a
/// single letter always suffices.
fn a1_cell(row: usize, col: usize) -> String {
    debug_assert!(col >= 1 && col <= COLUMN_COUNT);
    let letter = (b'A' + (col - 1) as u8) as char;
    format!("{}{}", letter, row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a1_notation() {
        assert_eq!(a1_cell(2, 1), "A2");
        assert_eq!(a1_cell(42, 9), "I42");
        assert_eq!(a1_cell(7, 12), "L7");
    }

    #[test]
    fn appended_row_from_range() {
        assert_eq!(parse_appended_row("Signal!A42:L42").unwrap(), 42);
        assert_eq!(parse_appended_row("Signal!A2:L2").unwrap(), 2);
        assert!(parse_appended_row("garbage").is_err());
    }
}
