use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::text::{format_duration_secs, minutes_to_day_time};

pub const DEFAULT_DND_START_MINUTE: i64 = 23 * 60;
pub const DEFAULT_DND_END_MINUTE: i64 = 8 * 60;

/// Per-user sync configuration and scheduling state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub user_id: i64,
    pub chat_id: i64,
    pub polling_interval_secs: i64,
    pub is_active: bool,
    pub regions: Vec<String>,
    pub cities: Vec<String>,

    // Scheduling
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_count_since_last_change: i64,

    // Do-not-disturb window, minutes after midnight UTC
    pub dnd_active: bool,
    pub dnd_start_minute: i64,
    pub dnd_end_minute: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage shape of [`Session`]; location lists are comma-separated text.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub user_id: i64,
    pub chat_id: i64,
    pub polling_interval_secs: i64,
    pub is_active: bool,
    pub regions: String,
    pub cities: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_count_since_last_change: i64,
    pub dnd_active: bool,
    pub dnd_start_minute: i64,
    pub dnd_end_minute: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub chat_id: i64,
    pub polling_interval_secs: i64,
}

/// What the scheduler should do with a session on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Dnd,
    NotDue,
    Due,
}

impl Session {
    pub fn new(new_session: NewSession) -> Self {
        let now = Utc::now();
        Self {
            user_id: new_session.user_id,
            chat_id: new_session.chat_id,
            polling_interval_secs: new_session.polling_interval_secs,
            is_active: false,
            regions: Vec::new(),
            cities: Vec::new(),
            last_synced_at: None,
            sync_count_since_last_change: 0,
            dnd_active: false,
            dnd_start_minute: DEFAULT_DND_START_MINUTE,
            dnd_end_minute: DEFAULT_DND_END_MINUTE,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `now` falls in `[dnd_start, dnd_end)`, wrapping past midnight
    /// when the start is later than the end.
    pub fn is_within_dnd(&self, now: DateTime<Utc>) -> bool {
        if !self.dnd_active {
            return false;
        }

        let minute = i64::from(now.hour() * 60 + now.minute());
        let (start, end) = (self.dnd_start_minute, self.dnd_end_minute);

        if start < end {
            minute >= start && minute < end
        } else if start > end {
            minute >= start || minute < end
        } else {
            false
        }
    }

    /// A session that never synced is always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_synced_at {
            Some(last) => (now - last).num_seconds() >= self.polling_interval_secs,
            None => true,
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if !self.is_active {
            SessionState::Inactive
        } else if self.is_within_dnd(now) {
            SessionState::Dnd
        } else if !self.is_due(now) {
            SessionState::NotDue
        } else {
            SessionState::Due
        }
    }

    /// Stamp a sync attempt before the pipeline runs.
    pub fn record_sync_attempt(&mut self, now: DateTime<Utc>) {
        self.last_synced_at = Some(now);
        self.sync_count_since_last_change += 1;
        self.updated_at = now;
    }

    /// Any user-driven change restarts the liveness notification count.
    pub fn mark_changed(&mut self) {
        self.sync_count_since_last_change = 0;
        self.updated_at = Utc::now();
    }

    pub fn summary(&self) -> String {
        let list_or_any = |items: &[String]| {
            if items.is_empty() {
                "any".to_string()
            } else {
                items.join(", ")
            }
        };
        let last_sync = self
            .last_synced_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());

        format!(
            "Active: {}\nPolling interval: {}\nRegions: {}\nCities: {}\nDo not disturb: {} ({} - {} UTC)\nLast sync: {}",
            if self.is_active { "yes" } else { "no" },
            format_duration_secs(self.polling_interval_secs),
            list_or_any(&self.regions),
            list_or_any(&self.cities),
            if self.dnd_active { "on" } else { "off" },
            minutes_to_day_time(self.dnd_start_minute),
            minutes_to_day_time(self.dnd_end_minute),
            last_sync,
        )
    }
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            user_id: row.user_id,
            chat_id: row.chat_id,
            polling_interval_secs: row.polling_interval_secs,
            is_active: row.is_active,
            regions: parse_location_list(&row.regions),
            cities: parse_location_list(&row.cities),
            last_synced_at: row.last_synced_at,
            sync_count_since_last_change: row.sync_count_since_last_change,
            dnd_active: row.dnd_active,
            dnd_start_minute: row.dnd_start_minute,
            dnd_end_minute: row.dnd_end_minute,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Split a comma-separated list, trimming entries, dropping empties and
/// keeping the first occurrence of duplicates.
pub fn parse_location_list(raw: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !items.iter().any(|existing| existing == item) {
            items.push(item.to_string());
        }
    }
    items
}

pub fn join_location_list(items: &[String]) -> String {
    items.join(",")
}
