use chrono::Utc;
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::database::begin_write;
use crate::database::listings::LISTING_COLUMNS;
use crate::models::{ListingRecord, generate_id};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct FavoriteRepository {
    pool: SqlitePool,
}

impl FavoriteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Copy the stored listing at `url` into the user's favorites.
    ///
    /// Returns `false` when it already is a favorite. A url the user has no
    /// stored listing for is [`AppError::NotFound`].
    pub async fn add(&self, user_id: i64, url: &str) -> Result<bool> {
        let mut tx = begin_write(&self.pool, user_id).await?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM favorites WHERE user_id = ? AND url = ?")
                .bind(user_id)
                .bind(url)
                .fetch_one(&mut *tx)
                .await?;
        if existing > 0 {
            return Ok(false);
        }

        let sql = format!(
            "INSERT INTO favorites ({columns}) \
             SELECT ?, user_id, url, name, description, street, locality, region, \
             price_currency, price, image_url, FALSE, ? \
             FROM listings WHERE user_id = ? AND url = ?",
            columns = LISTING_COLUMNS
        );
        let inserted = sqlx::query(&sql)
            .bind(generate_id())
            .bind(Utc::now())
            .bind(user_id)
            .bind(url)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if inserted == 0 {
            return Err(AppError::not_found(format!("stored listing {}", url)));
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit favorite: {}", e)))?;
        Ok(true)
    }

    /// Returns whether the favorite existed.
    pub async fn remove(&self, user_id: i64, url: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND url = ?")
            .bind(user_id)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Favorites of a user, most expensive first.
    pub async fn list(&self, user_id: i64) -> Result<Vec<ListingRecord>> {
        let sql = format!(
            "SELECT {} FROM favorites WHERE user_id = ? ORDER BY price DESC, url ASC",
            LISTING_COLUMNS
        );
        let records = sqlx::query_as::<_, ListingRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

pub(crate) async fn delete_all_in(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> std::result::Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM favorites WHERE user_id = ?")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
