//! In-memory loader.
//!
//! Writes go to a staged copy of the table that replaces the committed table
//! only when every record of the batch has been applied, which gives the same
//! all-or-nothing visibility as a database transaction.

use async_trait::async_trait;
use etl_common::types::{StoredRow, TransformedRecord};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::Loader;
use crate::error::LoadError;

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<(i64, String), StoredRow>,
    commits: usize,
    failing_ids: HashSet<i64>,
    transient_failures: u32,
}

#[derive(Debug, Default)]
pub struct MemoryLoader {
    state: Mutex<State>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Any batch containing `id` fails with a constraint violation when that
    /// record is written.
    pub fn fail_on_id(&self, id: i64) {
        self.state().failing_ids.insert(id);
    }

    /// The next `n` loads fail with a connection error before writing.
    pub fn fail_next_loads(&self, n: u32) {
        self.state().transient_failures = n;
    }

    /// All committed rows, ordered by `(id, batch_id)`
    pub fn rows(&self) -> Vec<StoredRow> {
        self.state().rows.values().cloned().collect()
    }

    pub fn rows_for_batch(&self, batch_id: &str) -> Vec<StoredRow> {
        self.state()
            .rows
            .values()
            .filter(|row| row.batch_id == batch_id)
            .cloned()
            .collect()
    }

    pub fn rows_for_id(&self, id: i64) -> Vec<StoredRow> {
        self.state()
            .rows
            .values()
            .filter(|row| row.id == id)
            .cloned()
            .collect()
    }

    /// Number of committed transactions
    pub fn commits(&self) -> usize {
        self.state().commits
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn load(&self, batch_id: &str, records: &[TransformedRecord]) -> Result<u64, LoadError> {
        let mut state = self.state();

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(LoadError::Connection("injected connection failure".to_string()));
        }

        let mut staged = state.rows.clone();
        for record in records {
            if state.failing_ids.contains(&record.id) {
                return Err(LoadError::Constraint(format!(
                    "injected failure writing id {} in batch {}",
                    record.id, batch_id
                )));
            }
            staged.insert(
                (record.id, batch_id.to_string()),
                StoredRow::from_record(batch_id, record),
            );
        }

        state.rows = staged;
        state.commits += 1;
        Ok(records.len() as u64)
    }
}
