//! Transport-agnostic user commands.

use std::sync::Arc;

use validator::Validate;

use crate::config::AppConfig;
use crate::database::Database;
use crate::models::{
    DEFAULT_DND_END_MINUTE, DEFAULT_DND_START_MINUTE, ListingRecord, NewSession, Session,
    parse_location_list, validate_search_url,
};
use crate::scheduler::SyncWorker;
use crate::utils::error::{AppError, Result};
use crate::utils::text::{
    day_time_to_minutes, escape_markdown_v2, format_duration_secs, minutes_to_day_time,
    parse_duration_secs,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Onboard the user with default settings, inactive
    Start { chat_id: i64 },
    /// Humane duration such as `15m` or `1h30m`
    SetPollingInterval { interval: String },
    SetSearchQuery { url: String },
    /// Comma-separated; empty clears the filter
    SetRegions { regions: String },
    SetCities { cities: String },
    Run,
    Pause,
    /// `HH:MM,HH:MM` in UTC; empty restores the default window
    SetDndSchedule { schedule: String },
    DndActivate,
    DndDeactivate,
    SyncNow,
    /// Delete everything stored for the user
    Stop,
    ShowSettings,
    ShowListings { only_new: bool },
    /// Keep a copy of a stored listing
    AddFavorite { url: String },
    RemoveFavorite { url: String },
    ShowFavorites,
}

/// Text to send back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub rich_formatting: bool,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rich_formatting: false,
        }
    }

    pub fn rich(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rich_formatting: true,
        }
    }
}

#[derive(Debug, Validate)]
struct SearchQueryInput {
    #[validate(url, length(max = 2048))]
    url: String,
}

pub struct CommandHandler {
    db: Database,
    worker: Arc<SyncWorker>,
    default_polling_interval_secs: i64,
    min_polling_interval_secs: i64,
    allowed_host_suffix: String,
    authorized_users: Vec<i64>,
}

impl CommandHandler {
    pub fn new(db: Database, worker: Arc<SyncWorker>, config: &AppConfig) -> Self {
        Self {
            db,
            worker,
            default_polling_interval_secs: config.scheduler.default_polling_interval_secs,
            min_polling_interval_secs: config.scheduler.min_polling_interval_secs,
            allowed_host_suffix: config.scraper.allowed_host_suffix.clone(),
            authorized_users: config.notifications.telegram.authorized_users.clone(),
        }
    }

    /// Everyone is authorized when no user list is configured.
    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized_users.is_empty() || self.authorized_users.contains(&user_id)
    }

    /// Execute `command` on behalf of `user_id`.
    ///
    /// Bad input is rejected with [`AppError::Validation`] before anything is
    /// written.
    pub async fn dispatch(&self, user_id: i64, command: Command) -> Result<Reply> {
        if !self.is_authorized(user_id) {
            return Err(AppError::Validation(format!("user {} is not authorized", user_id)));
        }

        tracing::debug!("User {}: dispatching {:?}", user_id, command);

        match command {
            Command::Start { chat_id } => self.start(user_id, chat_id).await,
            Command::SetPollingInterval { interval } => self.set_polling_interval(user_id, &interval).await,
            Command::SetSearchQuery { url } => self.set_search_query(user_id, &url).await,
            Command::SetRegions { regions } => {
                let regions = parse_location_list(&regions);
                let session = self
                    .modify(user_id, move |s| {
                        s.regions = regions;
                        Ok(())
                    })
                    .await?;
                Ok(Reply::plain(format!("Regions set to: {}", describe_list(&session.regions))))
            }
            Command::SetCities { cities } => {
                let cities = parse_location_list(&cities);
                let session = self
                    .modify(user_id, move |s| {
                        s.cities = cities;
                        Ok(())
                    })
                    .await?;
                Ok(Reply::plain(format!("Cities set to: {}", describe_list(&session.cities))))
            }
            Command::Run => {
                self.modify(user_id, |s| {
                    s.is_active = true;
                    Ok(())
                })
                .await?;
                Ok(Reply::plain("Syncing started."))
            }
            Command::Pause => {
                self.modify(user_id, |s| {
                    s.is_active = false;
                    Ok(())
                })
                .await?;
                Ok(Reply::plain("Syncing paused."))
            }
            Command::SetDndSchedule { schedule } => {
                let (start, end) = parse_dnd_schedule(&schedule)?;
                self.modify(user_id, |s| {
                    s.dnd_start_minute = start;
                    s.dnd_end_minute = end;
                    Ok(())
                })
                .await?;
                Ok(Reply::plain(format!(
                    "Do-not-disturb window set to {} - {} UTC.",
                    minutes_to_day_time(start),
                    minutes_to_day_time(end)
                )))
            }
            Command::DndActivate => {
                self.modify(user_id, |s| {
                    s.dnd_active = true;
                    Ok(())
                })
                .await?;
                Ok(Reply::plain("Do-not-disturb enabled."))
            }
            Command::DndDeactivate => {
                self.modify(user_id, |s| {
                    s.dnd_active = false;
                    Ok(())
                })
                .await?;
                Ok(Reply::plain("Do-not-disturb disabled."))
            }
            Command::SyncNow => {
                let delta = self.worker.sync_now(user_id).await?;
                Ok(Reply::plain(format!(
                    "Sync finished: {} new, {} removed.",
                    delta.added.len(),
                    delta.removed.len()
                )))
            }
            Command::Stop => {
                if self.db.delete_user_data(user_id).await? {
                    Ok(Reply::plain("All your data has been deleted."))
                } else {
                    Err(AppError::not_found(format!("session for user {}", user_id)))
                }
            }
            Command::ShowSettings => self.show_settings(user_id).await,
            Command::ShowListings { only_new } => self.show_listings(user_id, only_new).await,
            Command::AddFavorite { url } => {
                self.require_session(user_id).await?;
                if self.db.favorites().add(user_id, url.trim()).await? {
                    Ok(Reply::plain("Saved to your favorites."))
                } else {
                    Ok(Reply::plain("Already in your favorites."))
                }
            }
            Command::RemoveFavorite { url } => {
                if self.db.favorites().remove(user_id, url.trim()).await? {
                    Ok(Reply::plain("Removed from your favorites."))
                } else {
                    Err(AppError::not_found(format!("favorite {}", url.trim())))
                }
            }
            Command::ShowFavorites => {
                let favorites = self.db.favorites().list(user_id).await?;
                Ok(listing_reply(&favorites, "favorite(s)", "No favorites yet."))
            }
        }
    }

    async fn start(&self, user_id: i64, chat_id: i64) -> Result<Reply> {
        let session = Session::new(NewSession {
            user_id,
            chat_id,
            polling_interval_secs: self.default_polling_interval_secs,
        });

        if self.db.sessions().create(&session).await? {
            tracing::info!("User {}: session created", user_id);
            Ok(Reply::plain(
                "Welcome! Set a search query, then start syncing with the run command.",
            ))
        } else {
            Ok(Reply::plain("You already have a session."))
        }
    }

    async fn set_polling_interval(&self, user_id: i64, interval: &str) -> Result<Reply> {
        let secs = parse_duration_secs(interval)?;
        if secs < self.min_polling_interval_secs {
            return Err(AppError::Validation(format!(
                "polling interval must be at least {}",
                format_duration_secs(self.min_polling_interval_secs)
            )));
        }

        self.modify(user_id, |s| {
            s.polling_interval_secs = secs;
            Ok(())
        })
        .await?;
        Ok(Reply::plain(format!("Polling interval set to {}.", format_duration_secs(secs))))
    }

    async fn set_search_query(&self, user_id: i64, raw_url: &str) -> Result<Reply> {
        let input = SearchQueryInput {
            url: raw_url.trim().to_string(),
        };
        input.validate()?;
        let url = validate_search_url(&input.url, &self.allowed_host_suffix)?;

        self.require_session(user_id).await?;

        self.db.replace_search_query(user_id, url.as_str()).await?;
        Ok(Reply::plain("Search query saved. Stored listings were cleared."))
    }

    async fn show_settings(&self, user_id: i64) -> Result<Reply> {
        let session = self.require_session(user_id).await?;
        let query = self.db.search_queries().get(user_id).await?;

        Ok(Reply::plain(format!(
            "{}\nSearch query: {}",
            session.summary(),
            query.map(|q| q.raw_url).unwrap_or_else(|| "not set".to_string())
        )))
    }

    async fn show_listings(&self, user_id: i64, only_new: bool) -> Result<Reply> {
        let listings = self.db.listings().list(user_id, only_new).await?;
        let empty = if only_new {
            "No new listings."
        } else {
            "No listings stored yet."
        };
        Ok(listing_reply(&listings, "listing(s)", empty))
    }

    async fn require_session(&self, user_id: i64) -> Result<Session> {
        self.db
            .sessions()
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("session for user {}", user_id)))
    }

    async fn modify<F>(&self, user_id: i64, change: F) -> Result<Session>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        self.db.sessions().modify_by_user(user_id, change).await
    }
}

/// Parse `HH:MM,HH:MM`. Blank input yields the default 23:00 - 08:00 window.
pub fn parse_dnd_schedule(input: &str) -> Result<(i64, i64)> {
    let input = input.trim();
    if input.is_empty() {
        return Ok((DEFAULT_DND_START_MINUTE, DEFAULT_DND_END_MINUTE));
    }

    let (start, end) = input
        .split_once(',')
        .ok_or_else(|| AppError::Validation("expected HH:MM,HH:MM".to_string()))?;
    let start = day_time_to_minutes(start)?;
    let end = day_time_to_minutes(end)?;

    if start == end {
        return Err(AppError::Validation(
            "do-not-disturb start and end must differ".to_string(),
        ));
    }

    Ok((start, end))
}

/// Rich listing overview headed by a count, or `empty` as plain text.
fn listing_reply(listings: &[ListingRecord], noun: &str, empty: &str) -> Reply {
    if listings.is_empty() {
        return Reply::plain(empty);
    }

    let mut text = format!(
        "*{}*\n",
        escape_markdown_v2(&format!("{} {}", listings.len(), noun))
    );
    for listing in listings {
        text.push_str(&listing.to_markdown_line());
    }
    Reply::rich(text)
}

fn describe_list(items: &[String]) -> String {
    if items.is_empty() {
        "any".to_string()
    } else {
        items.join(", ")
    }
}
