//! ETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, error handling and logging for the ETL workspace.
//!
//! # Overview
//!
//! - **Types**: the work notification exchanged with upstream producers and
//!   the record shapes persisted by the worker
//! - **Error Handling**: the shared error and result types
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//!
//! # Example
//!
//! ```no_run
//! use etl_common::types::WorkNotification;
//!
//! fn route(body: &str) -> etl_common::Result<()> {
//!     let notification = WorkNotification::from_json(body)?;
//!     tracing::info!(bucket = %notification.container, key = %notification.key, "Routing object");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{EtlError, Result};
