use chrono::Utc;
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::models::SearchQuery;
use crate::utils::error::Result;

#[derive(Debug, Clone)]
pub struct SearchQueryRepository {
    pool: SqlitePool,
}

impl SearchQueryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<SearchQuery>> {
        let query = sqlx::query_as::<_, SearchQuery>(
            "SELECT user_id, raw_url, updated_at FROM search_queries WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(query)
    }
}

/// Insert or replace the user's query. Listings are the caller's concern.
pub(crate) async fn upsert_in(conn: &mut SqliteConnection, user_id: i64, raw_url: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO search_queries (user_id, raw_url, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT (user_id) DO UPDATE SET raw_url = excluded.raw_url, updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(raw_url)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}
