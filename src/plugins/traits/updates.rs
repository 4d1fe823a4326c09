use async_trait::async_trait;

use crate::utils::error::Result;

/// A text message a user sent to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUpdate {
    pub update_id: i64,
    /// Absent for updates that are not user messages, such as channel posts
    pub message: Option<IncomingMessage>,
}

/// Inbound chat transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Wait up to `timeout_secs` for updates numbered `offset` or higher.
    ///
    /// Asking for an offset acknowledges every update below it.
    async fn fetch_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<ChatUpdate>>;
}
