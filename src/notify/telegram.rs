use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::{error, warn};

use crate::config::Config;
use crate::notify::Notifier;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    result: Option<MessageResult>,
}

#[derive(Debug, Deserialize)]
struct MessageResult {
    message_id: i64,
}

pub struct TelegramNotifier {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            token: cfg.telegram_token.clone(),
            chat_id: cfg.telegram_chat_id.clone(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, text: &str, reply_to: Option<i64>) -> Option<i64> {
        let mut payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(id) = reply_to {
            payload["reply_to_message_id"] = json!(id);
            payload["allow_sending_without_reply"] = json!(true);
        }

        let resp = match self.client.post(self.url("sendMessage")).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => {
                error!("telegram send failed: {}", e);
                return None;
            }
        };

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("telegram API error: {}", body);
            return None;
        }

        resp.json::<ApiResponse>()
            .await
            .ok()
            .and_then(|r| r.result)
            .map(|m| m.message_id)
    }

    async fn send_image(&self, path: &Path, caption: Option<&str>) -> Option<i64> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                error!("cannot read image {}: {}", path.display(), e);
                return None;
            }
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chart.png".to_string());

        let mut form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("photo", Part::bytes(bytes).file_name(file_name));
        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let result = async {
            let resp = self
                .client
                .post(self.url("sendPhoto"))
                .multipart(form)
                .send()
                .await
                .ok()?;
            if !resp.status().is_success() {
                let body = resp.text().await.unwrap_or_default();
                warn!("telegram API error (photo): {}", body);
                return None;
            }
            resp.json::<ApiResponse>()
                .await
                .ok()
                .and_then(|r| r.result)
                .map(|m| m.message_id)
        }
        .await;

        // The image is a temp artifact; drop it whether the send worked or not.
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("cannot delete temp chart {}: {}", path.display(), e);
        }

        result
    }
}
