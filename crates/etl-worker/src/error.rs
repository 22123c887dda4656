//! Worker error types
//!
//! Each pipeline stage has its own error enum. Per-message failures are
//! collected into [`ProcessError`], which the delivery loop classifies as
//! transient or permanent. [`WorkerError`] is reserved for process-level
//! failures; only `DependencyUnavailable` terminates the worker.

use thiserror::Error;

/// Whether retrying the same message can succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connectivity hiccups, lock contention, throttling
    Transient,
    /// Bad payloads and data that will fail identically on every delivery
    Permanent,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to retrieve or decode a data object
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Object s3://{container}/{key} does not exist")]
    NotFound { container: String, key: String },

    #[error("Access denied to s3://{container}/{key}")]
    AccessDenied { container: String, key: String },

    #[error("Failed to read s3://{container}/{key}: {reason}")]
    Unreadable {
        container: String,
        key: String,
        reason: String,
    },

    #[error("Object s3://{container}/{key} is not a JSON array of records: {reason}")]
    Parse {
        container: String,
        key: String,
        reason: String,
    },
}

impl FetchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::NotFound { .. } | FetchError::Parse { .. } => ErrorClass::Permanent,
            FetchError::AccessDenied { .. } | FetchError::Unreadable { .. } => {
                ErrorClass::Transient
            },
        }
    }
}

/// A raw record that cannot be transformed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Record {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Record {index} field '{field}' is not an integer: {value}")]
    NotInteger {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("Record {index} field 'name' must be a string or number: {value}")]
    InvalidName { index: usize, value: String },

    #[error("Record {index} price {price} overflows after markup")]
    PriceOverflow { index: usize, price: i64 },
}

/// Failure to commit a batch. The transaction is always rolled back.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Serialization failure: {0}")]
    Serialization(String),
}

impl LoadError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LoadError::Constraint(_) => ErrorClass::Permanent,
            LoadError::Connection(_) | LoadError::Serialization(_) => ErrorClass::Transient,
        }
    }
}

impl From<sqlx::Error> for LoadError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db) = err.as_database_error() {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            // 22: data exception, 23: integrity constraint violation
            if code.starts_with("22") || code.starts_with("23") {
                return LoadError::Constraint(db.message().to_string());
            }
            if code == "40001" || code == "40P01" {
                return LoadError::Serialization(db.message().to_string());
            }
        }
        LoadError::Connection(err.to_string())
    }
}

/// Queue service failures
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to resolve queue '{name}': {reason}")]
    Resolve { name: String, reason: String },

    #[error("Failed to receive messages: {0}")]
    Receive(String),

    #[error("Failed to delete message {message_id}: {reason}")]
    Delete { message_id: String, reason: String },

    #[error("Failed to send message: {0}")]
    Send(String),

    #[error("Failed to dead-letter message {message_id}: {reason}")]
    DeadLetter { message_id: String, reason: String },
}

/// Why one message could not be processed
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl ProcessError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProcessError::MalformedPayload(_) | ProcessError::Validation(_) => {
                ErrorClass::Permanent
            },
            ProcessError::Fetch(e) => e.class(),
            ProcessError::Load(e) => e.class(),
        }
    }

    /// Pipeline stage that failed, for log fields
    pub fn stage(&self) -> &'static str {
        match self {
            ProcessError::MalformedPayload(_) => "parse",
            ProcessError::Fetch(_) => "fetch",
            ProcessError::Validation(_) => "transform",
            ProcessError::Load(_) => "load",
        }
    }
}

impl From<etl_common::EtlError> for ProcessError {
    fn from(err: etl_common::EtlError) -> Self {
        match err {
            etl_common::EtlError::MalformedPayload(reason) => ProcessError::MalformedPayload(reason),
            other => ProcessError::MalformedPayload(other.to_string()),
        }
    }
}

/// Process-level errors
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Dependency '{dependency}' unavailable after {attempts} attempts: {last_error}")]
    DependencyUnavailable {
        dependency: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkerError::DependencyUnavailable { .. })
    }
}

pub type WorkerResult<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_process_error_classes() {
        assert_eq!(
            ProcessError::MalformedPayload("x".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            ProcessError::from(ValidationError::MissingField { index: 0, field: "id" }).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            ProcessError::from(FetchError::NotFound {
                container: "b".into(),
                key: "k".into()
            })
            .class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            ProcessError::from(FetchError::Unreadable {
                container: "b".into(),
                key: "k".into(),
                reason: "reset".into()
            })
            .class(),
            ErrorClass::Transient
        );
        assert_eq!(
            ProcessError::from(LoadError::Connection("gone".into())).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            ProcessError::from(LoadError::Constraint("check".into())).class(),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn test_sqlx_pool_timeout_is_connection_error() {
        let err = LoadError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, LoadError::Connection(_)));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_only_dependency_unavailable_is_fatal() {
        let fatal = WorkerError::DependencyUnavailable {
            dependency: "queue".into(),
            attempts: 3,
            last_error: "refused".into(),
        };
        assert!(fatal.is_fatal());
        assert!(!WorkerError::Config("bad".into()).is_fatal());
    }
}
