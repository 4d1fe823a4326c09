use async_trait::async_trait;

use crate::models::{ListingRecord, sort_by_price_desc};
use crate::utils::error::Result;
use crate::utils::text::escape_markdown_v2;

/// Outbound chat transport.
///
/// Callers log delivery failures; they never change a sync outcome.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to a chat. `rich_formatting` marks the text as
    /// MarkdownV2, otherwise it is sent as plain text.
    async fn send_message(&self, chat_id: i64, user_id: i64, text: &str, rich_formatting: bool) -> Result<()>;
}

/// What a finished sync reports to the user.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    /// Added listings that pass the user's location filters
    pub added: Vec<ListingRecord>,
    /// Removed listings that pass the user's location filters
    pub removed_count: usize,
    pub total_count: usize,
}

impl SyncSummary {
    /// MarkdownV2 message body, newest listings most expensive first.
    pub fn to_markdown(&self) -> String {
        let mut added = self.added.clone();
        sort_by_price_desc(&mut added);

        let mut text = format!(
            "*{}*\n{}\n",
            escape_markdown_v2("Sync finished"),
            escape_markdown_v2(&format!(
                "{} new, {} removed, {} listings in total.",
                self.added.len(),
                self.removed_count,
                self.total_count
            )),
        );

        if !added.is_empty() {
            text.push('\n');
            for listing in &added {
                text.push_str(&listing.to_markdown_line());
            }
        }

        text
    }
}

pub fn failure_message(error: &dyn std::fmt::Display) -> String {
    format!("Sync failed, will retry on the next interval: {}", error)
}
