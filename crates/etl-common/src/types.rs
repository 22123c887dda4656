//! Domain types exchanged between the producer, the queue and the worker

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};

/// Notification that a data object is ready to be processed.
///
/// The JSON field names (`bucket`, `key`) are fixed by the contract with
/// upstream producers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkNotification {
    /// Blob container holding the object
    #[serde(rename = "bucket")]
    pub container: String,
    /// Object key; doubles as the batch identity of the loaded rows
    pub key: String,
}

impl WorkNotification {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }

    /// Decode a queue message body.
    ///
    /// Both fields must be present and non-empty.
    pub fn from_json(body: &str) -> Result<Self> {
        let notification: Self = serde_json::from_str(body)
            .map_err(|e| EtlError::MalformedPayload(format!("invalid notification: {}", e)))?;

        if notification.container.is_empty() {
            return Err(EtlError::MalformedPayload("empty bucket".to_string()));
        }
        if notification.key.is_empty() {
            return Err(EtlError::MalformedPayload("empty key".to_string()));
        }

        Ok(notification)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A record after transformation, ready to be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedRecord {
    pub id: i64,
    pub name: String,
    pub price: i64,
}

/// A persisted row, identified by `(id, batch_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: i64,
    pub batch_id: String,
    pub name: String,
    pub price: i64,
}

impl StoredRow {
    pub fn from_record(batch_id: &str, record: &TransformedRecord) -> Self {
        Self {
            id: record.id,
            batch_id: batch_id.to_string(),
            name: record.name.clone(),
            price: record.price,
        }
    }
}
