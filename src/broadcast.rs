//! Operator announcements to subscribers.

use crate::database::Database;
use crate::plugins::Notifier;
use crate::utils::error::{AppError, Result};

const ANNOUNCEMENT_PREFIX: &str = "📢 ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every session that is currently syncing
    ActiveSessions,
    User(i64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

/// Send `message` as plain text to every chat in `audience`.
///
/// A chat that cannot be reached is logged and counted, the others still get
/// the message.
pub async fn broadcast(
    db: &Database,
    notifier: &dyn Notifier,
    message: &str,
    audience: Audience,
) -> Result<BroadcastReport> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("announcement is empty".to_string()));
    }

    let sessions = match audience {
        Audience::ActiveSessions => db.sessions().list(true).await?,
        Audience::User(user_id) => vec![db
            .sessions()
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("session for user {}", user_id)))?],
    };

    let text = format!("{}{}", ANNOUNCEMENT_PREFIX, message);
    let mut report = BroadcastReport::default();

    for session in &sessions {
        match notifier
            .send_message(session.chat_id, session.user_id, &text, false)
            .await
        {
            Ok(()) => report.sent += 1,
            Err(e) => {
                tracing::warn!("User {}: announcement not delivered: {}", session.user_id, e);
                report.failed += 1;
            }
        }
    }

    tracing::info!("Announcement delivered to {} of {} chat(s)", report.sent, sessions.len());
    Ok(report)
}
