pub mod messages;
pub mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use std::path::Path;

/// Outbound announcements. Strictly best-effort: failures are logged and
/// swallowed, never retried — a duplicate message is worse than a missed
/// one. Returns the provider message id when available, used for
/// reply threading.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, text: &str, reply_to: Option<i64>) -> Option<i64>;

    async fn send_image(&self, path: &Path, caption: Option<&str>) -> Option<i64>;
}
