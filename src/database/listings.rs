use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::{QueryBuilder, Sqlite};

use crate::database::{SQLITE_MAX_BIND_PARAMS, begin_write};
use crate::models::ListingRecord;
use crate::sync::diff::{ListingDiff, diff};
use crate::utils::error::{AppError, Result};

pub(crate) const LISTING_COLUMNS: &str = "id, user_id, url, name, description, street, locality, region, \
     price_currency, price, image_url, is_new, created_at";
const LISTING_COLUMN_COUNT: usize = 13;

#[derive(Debug, Clone)]
pub struct ListingRepository {
    pool: SqlitePool,
}

impl ListingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored listings of a user, most expensive first.
    pub async fn list(&self, user_id: i64, only_new: bool) -> Result<Vec<ListingRecord>> {
        let sql = format!(
            "SELECT {} FROM listings WHERE user_id = ? {} ORDER BY price DESC, url ASC",
            LISTING_COLUMNS,
            if only_new { "AND is_new = TRUE" } else { "" }
        );

        let records = sqlx::query_as::<_, ListingRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    pub async fn count(&self, user_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Apply a precomputed delta atomically.
    ///
    /// Removed rows are deleted, added rows inserted with `is_new` set and
    /// leftover rows updated with `is_new` cleared. Nothing is written unless
    /// every statement succeeds.
    pub async fn apply_sync(&self, user_id: i64, delta: &ListingDiff) -> Result<()> {
        let mut tx = begin_write(&self.pool, user_id).await.map_err(transaction_error)?;
        apply_in(&mut tx, user_id, delta).await.map_err(transaction_error)?;
        tx.commit().await.map_err(transaction_error)?;
        Ok(())
    }

    /// Diff `fetched` against the stored snapshot and apply the result, all
    /// inside one transaction. Returns the applied delta.
    pub async fn sync_snapshot(&self, user_id: i64, fetched: &[ListingRecord]) -> Result<ListingDiff> {
        let mut tx = begin_write(&self.pool, user_id).await.map_err(transaction_error)?;

        let stored = load_in(&mut tx, user_id).await.map_err(transaction_error)?;
        let mut delta = diff(&stored, fetched);
        delta.stamp_added(user_id);

        apply_in(&mut tx, user_id, &delta).await.map_err(transaction_error)?;
        tx.commit().await.map_err(transaction_error)?;

        Ok(delta)
    }
}

fn transaction_error(e: sqlx::Error) -> AppError {
    AppError::Transaction(e.to_string())
}

pub(crate) async fn load_in(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> std::result::Result<Vec<ListingRecord>, sqlx::Error> {
    let sql = format!("SELECT {} FROM listings WHERE user_id = ?", LISTING_COLUMNS);
    sqlx::query_as::<_, ListingRecord>(&sql)
        .bind(user_id)
        .fetch_all(conn)
        .await
}

pub(crate) async fn delete_all_in(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> std::result::Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM listings WHERE user_id = ?")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

async fn apply_in(
    conn: &mut SqliteConnection,
    user_id: i64,
    delta: &ListingDiff,
) -> std::result::Result<(), sqlx::Error> {
    // Step 1: drop listings that disappeared, keeping one slot for user_id
    for chunk in delta.removed.chunks(SQLITE_MAX_BIND_PARAMS - 1) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM listings WHERE user_id = ");
        builder.push_bind(user_id);
        builder.push(" AND url IN (");
        let mut separated = builder.separated(", ");
        for record in chunk {
            separated.push_bind(&record.url);
        }
        separated.push_unseparated(")");
        builder.build().execute(&mut *conn).await?;
    }

    // Step 2: insert new listings
    for chunk in delta.added.chunks(SQLITE_MAX_BIND_PARAMS / LISTING_COLUMN_COUNT) {
        let mut builder = insert_builder(user_id, chunk, true);
        builder.build().execute(&mut *conn).await?;
    }

    // Step 3: refresh the ones seen again and clear their new flag
    for chunk in delta.leftover.chunks(SQLITE_MAX_BIND_PARAMS / LISTING_COLUMN_COUNT) {
        let mut builder = insert_builder(user_id, chunk, false);
        builder.push(
            " ON CONFLICT DO UPDATE SET \
             name = excluded.name, description = excluded.description, \
             street = excluded.street, locality = excluded.locality, \
             region = excluded.region, price_currency = excluded.price_currency, \
             price = excluded.price, image_url = excluded.image_url, is_new = FALSE",
        );
        builder.build().execute(&mut *conn).await?;
    }

    Ok(())
}

fn insert_builder<'a>(user_id: i64, records: &'a [ListingRecord], is_new: bool) -> QueryBuilder<'a, Sqlite> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("INSERT INTO listings ({}) ", LISTING_COLUMNS));

    builder.push_values(records, |mut row, record| {
        row.push_bind(&record.id)
            .push_bind(user_id)
            .push_bind(&record.url)
            .push_bind(&record.name)
            .push_bind(&record.description)
            .push_bind(&record.street)
            .push_bind(&record.locality)
            .push_bind(&record.region)
            .push_bind(&record.price_currency)
            .push_bind(record.price)
            .push_bind(&record.image_url)
            .push_bind(is_new)
            .push_bind(record.created_at);
    });

    builder
}
