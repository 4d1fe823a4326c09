//! Chat front end: reads user messages from an [`UpdateSource`], turns them
//! into [`Command`]s and answers through the [`Notifier`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::commands::{Command, CommandHandler, Reply};
use crate::plugins::{IncomingMessage, Notifier, UpdateSource};
use crate::utils::error::{AppError, Result};

/// Seconds the chat server may hold one poll open.
pub const LONG_POLL_SECS: u64 = 25;

const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct BotCommand {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
}

pub const BOT_COMMANDS: &[BotCommand] = &[
    BotCommand { name: "start", usage: "", description: "Create your session" },
    BotCommand { name: "set_search_query", usage: "<url>", description: "Search to watch, clears stored listings" },
    BotCommand { name: "set_polling_interval", usage: "<duration>", description: "How often to sync, e.g. 15m or 1h30m" },
    BotCommand { name: "set_regions", usage: "[a, b]", description: "Only report these regions, empty for any" },
    BotCommand { name: "set_cities", usage: "[a, b]", description: "Only report these cities, empty for any" },
    BotCommand { name: "run", usage: "", description: "Start syncing" },
    BotCommand { name: "pause", usage: "", description: "Pause syncing" },
    BotCommand { name: "set_dnd_schedule", usage: "<HH:MM,HH:MM>", description: "Quiet hours in UTC, empty for 23:00-08:00" },
    BotCommand { name: "dnd_activate", usage: "", description: "Hold syncs during quiet hours" },
    BotCommand { name: "dnd_deactivate", usage: "", description: "Sync around the clock" },
    BotCommand { name: "update_now", usage: "", description: "Sync right away" },
    BotCommand { name: "show_settings", usage: "", description: "Show your settings" },
    BotCommand { name: "show_current_listings", usage: "", description: "Show every stored listing" },
    BotCommand { name: "show_new_listings", usage: "", description: "Show listings added by the last sync" },
    BotCommand { name: "add_favorite", usage: "<url>", description: "Keep a stored listing" },
    BotCommand { name: "remove_favorite", usage: "<url>", description: "Forget a favorite" },
    BotCommand { name: "show_favorites", usage: "", description: "Show your favorites" },
    BotCommand { name: "stop", usage: "", description: "Delete your session and all data" },
    BotCommand { name: "help", usage: "", description: "Show this help" },
];

/// What a chat message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Help,
    Command(Command),
}

/// Parse a slash command such as `/set_cities Utrecht, Zeist`.
///
/// `chat_id` is the chat the message came from; `/start` binds the session
/// to it. A `@botname` suffix on the command is ignored.
pub fn parse_message(text: &str, chat_id: i64) -> Result<Request> {
    let text = text.trim();
    let Some(text) = text.strip_prefix('/') else {
        return Err(AppError::Validation(
            "commands start with a slash, send /help for the list".to_string(),
        ));
    };

    let (head, args) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let args = args.trim().to_string();

    let required = |args: String| -> Result<String> {
        if args.is_empty() {
            let usage = BOT_COMMANDS
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.usage)
                .unwrap_or_default();
            Err(AppError::Validation(format!("usage: /{} {}", name, usage)))
        } else {
            Ok(args)
        }
    };

    let command = match name.as_str() {
        "help" => return Ok(Request::Help),
        "start" => Command::Start { chat_id },
        "run" => Command::Run,
        "pause" => Command::Pause,
        "stop" => Command::Stop,
        "set_search_query" => Command::SetSearchQuery { url: required(args)? },
        "set_polling_interval" => Command::SetPollingInterval { interval: required(args)? },
        "set_regions" => Command::SetRegions { regions: args },
        "set_cities" => Command::SetCities { cities: args },
        "set_dnd_schedule" => Command::SetDndSchedule { schedule: args },
        "dnd_activate" => Command::DndActivate,
        "dnd_deactivate" => Command::DndDeactivate,
        "update_now" => Command::SyncNow,
        "show_settings" | "show_active_filters" | "show_polling_interval" => Command::ShowSettings,
        "show_current_listings" => Command::ShowListings { only_new: false },
        "show_new_listings" => Command::ShowListings { only_new: true },
        "add_favorite" => Command::AddFavorite { url: required(args)? },
        "remove_favorite" => Command::RemoveFavorite { url: required(args)? },
        "show_favorites" => Command::ShowFavorites,
        _ => {
            return Err(AppError::Validation(format!(
                "unknown command /{}, send /help for the list",
                name
            )));
        }
    };

    Ok(Request::Command(command))
}

pub fn help_text() -> String {
    let mut text = String::from("Available commands:\n");
    for command in BOT_COMMANDS {
        let usage = if command.usage.is_empty() {
            String::new()
        } else {
            format!(" {}", command.usage)
        };
        text.push_str(&format!("/{}{} - {}\n", command.name, usage, command.description));
    }
    text
}

/// What the user reads when a command fails.
fn error_text(error: &AppError) -> String {
    match error {
        AppError::Validation(message) => format!("Invalid input: {}", message),
        AppError::NotFound { resource } if resource.starts_with("session") => {
            "You have no session yet, send /start first.".to_string()
        }
        AppError::NotFound { resource } => format!("Not found: {}", resource),
        AppError::Cancelled => "Shutting down, please try again later.".to_string(),
        _ => "Something went wrong, please try again later.".to_string(),
    }
}

/// Long-polls an [`UpdateSource`] and answers every message.
///
/// Messages are handled one at a time in arrival order, so a user's
/// commands apply in the order they were sent.
pub struct ChatBot {
    source: Arc<dyn UpdateSource>,
    handler: Arc<CommandHandler>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
    poll_timeout_secs: u64,
    offset: i64,
}

impl ChatBot {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        handler: Arc<CommandHandler>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            handler,
            notifier,
            cancel,
            poll_timeout_secs: LONG_POLL_SECS,
            offset: 0,
        }
    }

    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    /// Fetch one batch of updates and answer it. Returns the batch size.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let updates = self
            .source
            .fetch_updates(self.offset, self.poll_timeout_secs)
            .await?;

        for update in &updates {
            self.offset = self.offset.max(update.update_id + 1);
            if let Some(message) = &update.message {
                self.handle_message(message).await;
            }
        }

        Ok(updates.len())
    }

    /// Poll until cancelled. Transport errors are logged and retried.
    pub async fn run(mut self) {
        let cancel = self.cancel.clone();
        tracing::info!("Chat bot listening for commands");

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.poll_once() => polled,
            };

            if let Err(e) = polled {
                tracing::warn!("Fetching chat updates failed: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }

        tracing::info!("Chat bot stopped");
    }

    async fn handle_message(&self, message: &IncomingMessage) {
        let Some(text) = message.text.as_deref() else {
            return;
        };

        // Strangers get no answer at all
        if !self.handler.is_authorized(message.user_id) {
            tracing::debug!("Ignoring message from unauthorized user {}", message.user_id);
            return;
        }

        let reply = match self.answer(message, text).await {
            Ok(reply) => reply,
            Err(e) => {
                match &e {
                    AppError::Validation(_) | AppError::NotFound { .. } => {
                        tracing::debug!("User {}: {}", message.user_id, e)
                    }
                    _ => tracing::error!("User {}: command failed: {}", message.user_id, e),
                }
                Reply::plain(error_text(&e))
            }
        };

        if let Err(e) = self
            .notifier
            .send_message(message.chat_id, message.user_id, &reply.text, reply.rich_formatting)
            .await
        {
            tracing::warn!("User {}: failed to send reply: {}", message.user_id, e);
        }
    }

    async fn answer(&self, message: &IncomingMessage, text: &str) -> Result<Reply> {
        match parse_message(text, message.chat_id)? {
            Request::Help => Ok(Reply::plain(help_text())),
            Request::Command(command) => self.handler.dispatch(message.user_id, command).await,
        }
    }
}
