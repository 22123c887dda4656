//! PostgreSQL loader

use async_trait::async_trait;
use etl_common::types::{StoredRow, TransformedRecord};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::Loader;
use crate::config::DatabaseConfig;
use crate::error::LoadError;

const UPSERT_PRODUCT: &str = r#"
    INSERT INTO products (id, batch_id, name, price)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (id, batch_id) DO UPDATE
    SET name = EXCLUDED.name, price = EXCLUDED.price
"#;

/// Loader over a single long-lived connection.
///
/// The pool is capped at one connection, so every batch runs on the same
/// session and transactions never overlap.
#[derive(Debug, Clone)]
pub struct PgLoader {
    pool: PgPool,
}

impl PgLoader {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, LoadError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.connection_url())
            .await?;

        info!(host = %config.host, database = %config.name, "Database connection established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Close the connection. Further loads fail with `LoadError::Connection`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// All rows of one batch, ordered by id
    pub async fn rows_for_batch(&self, batch_id: &str) -> Result<Vec<StoredRow>, LoadError> {
        let rows = sqlx::query(
            "SELECT id, batch_id, name, price FROM products WHERE batch_id = $1 ORDER BY id",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_row).collect()
    }

    /// Every stored version of one business id, ordered by batch
    pub async fn rows_for_id(&self, id: i64) -> Result<Vec<StoredRow>, LoadError> {
        let rows = sqlx::query(
            "SELECT id, batch_id, name, price FROM products WHERE id = $1 ORDER BY batch_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_row).collect()
    }
}

fn stored_row(row: &PgRow) -> Result<StoredRow, LoadError> {
    Ok(StoredRow {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
    })
}

#[async_trait]
impl Loader for PgLoader {
    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn load(&self, batch_id: &str, records: &[TransformedRecord]) -> Result<u64, LoadError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(UPSERT_PRODUCT)
                .bind(record.id)
                .bind(batch_id)
                .bind(&record.name)
                .bind(record.price)
                .execute(&mut *tx)
                .await?;
        }

        // Dropping an uncommitted transaction rolls it back, so any `?` above
        // leaves nothing from this batch behind.
        tx.commit().await?;

        debug!("Batch committed");
        Ok(records.len() as u64)
    }
}
