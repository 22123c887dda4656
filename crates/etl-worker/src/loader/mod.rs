//! Idempotent loader
//!
//! A [`Loader`] writes one batch (the records of one source object) atomically:
//! either every record is visible after `load` returns `Ok`, or none from that
//! call is. Rows are keyed by `(id, batch_id)` and upserted, so loading the
//! same batch again converges on the same rows while a different `batch_id`
//! adds a new history stripe for the same business id.

use async_trait::async_trait;
use etl_common::types::TransformedRecord;
use std::sync::Arc;

use crate::error::LoadError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryLoader;
pub use postgres::PgLoader;

#[async_trait]
pub trait Loader: Send + Sync {
    /// Upsert all `records` under `batch_id` in one transaction.
    ///
    /// Returns the number of records written.
    async fn load(&self, batch_id: &str, records: &[TransformedRecord]) -> Result<u64, LoadError>;
}

#[async_trait]
impl<T: Loader + ?Sized> Loader for Arc<T> {
    async fn load(&self, batch_id: &str, records: &[TransformedRecord]) -> Result<u64, LoadError> {
        (**self).load(batch_id, records).await
    }
}
