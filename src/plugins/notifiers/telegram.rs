use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::plugins::traits::{ChatUpdate, IncomingMessage, Notifier, UpdateSource};
use crate::utils::error::{AppError, Result};
use crate::utils::text::{MESSAGE_MAX_CHARS, split_message};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    #[serde(default)]
    from: Option<TelegramId>,
    chat: TelegramId,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramId {
    id: i64,
}

impl From<TelegramUpdate> for ChatUpdate {
    fn from(update: TelegramUpdate) -> Self {
        let message = update.message.and_then(|message| {
            let sender = message.from?;
            Some(IncomingMessage {
                chat_id: message.chat.id,
                user_id: sender.id,
                text: message.text,
            })
        });

        ChatUpdate {
            update_id: update.update_id,
            message,
        }
    }
}

/// Talks to the Telegram Bot API: sends notifications and long-polls the
/// bot account for user commands.
pub struct TelegramNotifier {
    client: Client,
    api_base_url: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let token = config
            .bot_token()
            .ok_or_else(|| AppError::Notification("Telegram token is not configured".to_string()))?
            .to_string();

        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Notification(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base_url, self.token, method)
    }

    /// Call a Bot API method and unwrap its `result`.
    async fn call<T: DeserializeOwned>(&self, method: &str, payload: &Value, timeout: Duration) -> Result<T> {
        let response = self
            .client
            .post(self.endpoint(method))
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        let body: TelegramResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::Notification(format!("unreadable {} response ({}): {}", method, status, e)))?;

        match body.result {
            Some(result) if status.is_success() && body.ok => Ok(result),
            _ => Err(AppError::Notification(format!(
                "{} rejected ({}): {}",
                method,
                status,
                body.description.unwrap_or_default()
            ))),
        }
    }

    async fn send_chunk(&self, chat_id: i64, text: &str, rich_formatting: bool) -> Result<()> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if rich_formatting {
            payload["parse_mode"] = json!("MarkdownV2");
        }

        self.call::<Value>("sendMessage", &payload, REQUEST_TIMEOUT).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, chat_id: i64, user_id: i64, text: &str, rich_formatting: bool) -> Result<()> {
        let lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
        let chunks = split_message(&lines, MESSAGE_MAX_CHARS);

        for chunk in &chunks {
            self.send_chunk(chat_id, chunk, rich_formatting).await?;
        }

        tracing::debug!("User {}: sent {} message(s) to chat {}", user_id, chunks.len(), chat_id);
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramNotifier {
    async fn fetch_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<ChatUpdate>> {
        let payload = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });

        // The server holds the request open for up to `timeout_secs`
        let timeout = REQUEST_TIMEOUT + Duration::from_secs(timeout_secs);
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", &payload, timeout).await?;
        Ok(updates.into_iter().map(ChatUpdate::from).collect())
    }
}
