use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::database::begin_write;
use crate::models::{Session, SessionRow, join_location_list};
use crate::utils::error::{AppError, Result};

const SESSION_COLUMNS: &str = "user_id, chat_id, polling_interval_secs, is_active, regions, cities, \
     last_synced_at, sync_count_since_last_change, dnd_active, dnd_start_minute, dnd_end_minute, \
     created_at, updated_at";

#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a session unless the user already has one. Returns whether it was created.
    pub async fn create(&self, session: &Session) -> Result<bool> {
        let sql = format!(
            "INSERT INTO sessions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (user_id) DO NOTHING",
            SESSION_COLUMNS
        );

        let result = sqlx::query(&sql)
            .bind(session.user_id)
            .bind(session.chat_id)
            .bind(session.polling_interval_secs)
            .bind(session.is_active)
            .bind(join_location_list(&session.regions))
            .bind(join_location_list(&session.cities))
            .bind(session.last_synced_at)
            .bind(session.sync_count_since_last_change)
            .bind(session.dnd_active)
            .bind(session.dnd_start_minute)
            .bind(session.dnd_end_minute)
            .bind(session.created_at)
            .bind(session.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<Session>> {
        let sql = format!("SELECT {} FROM sessions WHERE user_id = ?", SESSION_COLUMNS);
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Session::from))
    }

    /// All sessions ordered by user id.
    pub async fn list(&self, only_active: bool) -> Result<Vec<Session>> {
        let sql = format!(
            "SELECT {} FROM sessions {} ORDER BY user_id",
            SESSION_COLUMNS,
            if only_active { "WHERE is_active = TRUE" } else { "" }
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    /// Transactional read-modify-write of one session.
    ///
    /// `change` sees the current state and may reject it with an error, in
    /// which case nothing is written.
    pub async fn modify<F>(&self, user_id: i64, change: F) -> Result<Session>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        let mut tx = begin_write(&self.pool, user_id).await?;

        let sql = format!("SELECT {} FROM sessions WHERE user_id = ?", SESSION_COLUMNS);
        let mut session: Session = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(Session::from)
            .ok_or_else(|| AppError::not_found(format!("session for user {}", user_id)))?;

        change(&mut session)?;
        save_in(&mut tx, &session).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit session update: {}", e)))?;
        Ok(session)
    }

    /// Apply a user-driven change and restart the liveness count.
    pub async fn modify_by_user<F>(&self, user_id: i64, change: F) -> Result<Session>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        self.modify(user_id, |session| {
            change(session)?;
            session.mark_changed();
            Ok(())
        })
        .await
    }

    /// Stamp a sync attempt; see [`Session::record_sync_attempt`].
    pub async fn record_sync_attempt(&self, user_id: i64, now: DateTime<Utc>) -> Result<Session> {
        self.modify(user_id, |session| {
            session.record_sync_attempt(now);
            Ok(())
        })
        .await
    }
}

async fn save_in(conn: &mut SqliteConnection, session: &Session) -> Result<()> {
    sqlx::query(
        "UPDATE sessions SET chat_id = ?, polling_interval_secs = ?, is_active = ?, regions = ?, \
         cities = ?, last_synced_at = ?, sync_count_since_last_change = ?, dnd_active = ?, \
         dnd_start_minute = ?, dnd_end_minute = ?, updated_at = ? WHERE user_id = ?",
    )
    .bind(session.chat_id)
    .bind(session.polling_interval_secs)
    .bind(session.is_active)
    .bind(join_location_list(&session.regions))
    .bind(join_location_list(&session.cities))
    .bind(session.last_synced_at)
    .bind(session.sync_count_since_last_change)
    .bind(session.dnd_active)
    .bind(session.dnd_start_minute)
    .bind(session.dnd_end_minute)
    .bind(session.updated_at)
    .bind(session.user_id)
    .execute(conn)
    .await?;
    Ok(())
}
