//! Object fetcher: retrieve a data object and decode it into raw records.
//!
//! No retries here; a failed fetch fails the message and the delivery loop
//! decides what happens next.

use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::FetchError;
use crate::storage::ObjectStore;

/// Untyped record as decoded from the object body
pub type RawRecord = serde_json::Map<String, Value>;

pub struct ObjectFetcher<S> {
    store: S,
}

impl<S: ObjectStore> ObjectFetcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch `container/key` and decode it as a JSON array of objects.
    #[instrument(skip(self))]
    pub async fn fetch(&self, container: &str, key: &str) -> Result<Vec<RawRecord>, FetchError> {
        let body = self.store.get_object(container, key).await?;

        let records = parse_records(&body).map_err(|reason| FetchError::Parse {
            container: container.to_string(),
            key: key.to_string(),
            reason,
        })?;

        debug!(records = records.len(), "Decoded object");
        Ok(records)
    }
}

/// Decode a body into records, keeping array order.
pub fn parse_records(body: &[u8]) -> Result<Vec<RawRecord>, String> {
    let values: Vec<Value> = serde_json::from_slice(body).map_err(|e| e.to_string())?;

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::Object(record) => Ok(record),
            other => Err(format!(
                "element {} is {}, expected an object",
                index,
                json_kind(&other)
            )),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
