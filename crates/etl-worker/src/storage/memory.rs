//! In-memory object store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::ObjectStore;
use crate::error::FetchError;

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<(String, String), Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn put(&self, container: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects()
            .insert((container.to_string(), key.to_string()), body.into());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, FetchError> {
        self.objects()
            .get(&(container.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            })
    }
}
