// Notifier implementations
pub mod log;
pub mod telegram;

pub use log::LogNotifier;
pub use telegram::TelegramNotifier;

use crate::config::TelegramConfig;
use crate::utils::error::Result;

/// The Telegram client, or `None` when no usable bot token is configured.
pub fn telegram_from_config(config: &TelegramConfig) -> Result<Option<TelegramNotifier>> {
    match config.bot_token() {
        Some(_) => Ok(Some(TelegramNotifier::new(config)?)),
        None => {
            tracing::warn!("No Telegram token configured, notifications go to the log");
            Ok(None)
        }
    }
}
