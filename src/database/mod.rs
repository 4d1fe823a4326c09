//! SQLite persistence: pool setup, migrations and the per-table repositories.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

use crate::config::DatabaseConfig;
use crate::utils::error::{AppError, Result};

pub mod favorites;
pub mod listings;
pub mod search_queries;
pub mod sessions;

pub use favorites::FavoriteRepository;
pub use listings::ListingRepository;
pub use search_queries::SearchQueryRepository;
pub use sessions::SessionRepository;

/// SQLite's upper bound on bound parameters in one statement.
pub const SQLITE_MAX_BIND_PARAMS: usize = 32766;

/// Open a transaction that holds the write lock from its first statement.
///
/// A deferred transaction that reads before it writes cannot upgrade its lock
/// while another writer is active, and SQLite fails it with SQLITE_BUSY
/// without consulting `busy_timeout`. Touching the user's session row first
/// makes concurrent writers queue on the timeout instead. The statement takes
/// the lock even when the user has no session row.
pub(crate) async fn begin_write(
    pool: &SqlitePool,
    user_id: i64,
) -> sqlx::Result<Transaction<'static, Sqlite>> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE sessions SET updated_at = updated_at WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the pool, retrying with backoff while the store is unreachable.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout));

        if let Some(directory) = database_directory(&config.url) {
            tokio::fs::create_dir_all(directory).await?;
        }

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(250)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(config.connect_retries);

        let pool = Retry::spawn(strategy, || {
            let options = options.clone();
            async move {
                SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(config.acquire_timeout))
                    .connect_with(options)
                    .await
                    .map_err(|e| {
                        tracing::warn!("Database connection attempt failed: {}", e);
                        e
                    })
            }
        })
        .await?;

        tracing::info!("Connected to database {}", config.url);
        Ok(Self { pool })
    }

    /// Private in-memory database with the schema applied.
    pub async fn in_memory() -> Result<Self> {
        // One connection that never expires, or the data would vanish with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self::from_pool(pool);
        db.migrate().await?;
        Ok(db)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.pool.clone())
    }

    pub fn search_queries(&self) -> SearchQueryRepository {
        SearchQueryRepository::new(self.pool.clone())
    }

    pub fn listings(&self) -> ListingRepository {
        ListingRepository::new(self.pool.clone())
    }

    pub fn favorites(&self) -> FavoriteRepository {
        FavoriteRepository::new(self.pool.clone())
    }

    /// Point the user at a new search, discarding every listing found by the
    /// previous one. Also restarts the session's liveness count.
    pub async fn replace_search_query(&self, user_id: i64, raw_url: &str) -> Result<()> {
        let mut tx = begin_write(&self.pool, user_id).await?;

        listings::delete_all_in(&mut tx, user_id).await?;
        search_queries::upsert_in(&mut tx, user_id, raw_url).await?;
        sqlx::query(
            "UPDATE sessions SET sync_count_since_last_change = 0, updated_at = ? WHERE user_id = ?",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit search query: {}", e)))?;

        tracing::info!("User {}: search query replaced", user_id);
        Ok(())
    }

    /// Remove the session, search query, listings and favorites of a user in
    /// one transaction. Returns whether a session existed.
    pub async fn delete_user_data(&self, user_id: i64) -> Result<bool> {
        let mut tx = begin_write(&self.pool, user_id).await?;

        listings::delete_all_in(&mut tx, user_id).await?;
        favorites::delete_all_in(&mut tx, user_id).await?;
        sqlx::query("DELETE FROM search_queries WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit user deletion: {}", e)))?;

        tracing::info!("User {}: all data deleted", user_id);
        Ok(deleted > 0)
    }
}

/// Parent directory of a file-backed SQLite URL.
fn database_directory(url: &str) -> Option<PathBuf> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }

    PathBuf::from(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
}
