use async_trait::async_trait;

use crate::plugins::traits::Notifier;
use crate::utils::error::Result;

/// Writes messages to the log instead of a chat. Used when no bot token is set.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_message(&self, chat_id: i64, user_id: i64, text: &str, _rich_formatting: bool) -> Result<()> {
        tracing::info!("User {} (chat {}): {}", user_id, chat_id, text);
        Ok(())
    }
}
