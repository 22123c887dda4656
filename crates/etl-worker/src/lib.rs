//! ETL worker library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Consumes work notifications from a queue, fetches the referenced object,
//! transforms its records and upserts them into PostgreSQL, deleting each
//! message only after its batch has committed.
//!
//! # Architecture
//!
//! - [`delivery::DeliveryLoop`] owns the three injected handles:
//!   - a [`queue::WorkQueue`] (SQS, or in-memory for tests)
//!   - an [`fetcher::ObjectFetcher`] over a [`storage::ObjectStore`] (S3)
//!   - a [`loader::Loader`] (PostgreSQL)
//! - [`readiness::ReadinessGate`] resolves those handles at startup with a
//!   bounded number of attempts
//! - [`retry::RetryPolicy`] paces empty polls and failures and decides when a
//!   failing message goes to the dead-letter queue
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use etl_worker::delivery::DeliveryLoop;
//! use etl_worker::fetcher::ObjectFetcher;
//! use etl_worker::loader::MemoryLoader;
//! use etl_worker::queue::MemoryQueue;
//! use etl_worker::retry::RetryPolicy;
//! use etl_worker::storage::MemoryObjectStore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let delivery = DeliveryLoop::new(
//!     Arc::new(MemoryQueue::new()),
//!     ObjectFetcher::new(MemoryObjectStore::new()),
//!     MemoryLoader::new(),
//!     RetryPolicy::default(),
//!     Duration::from_secs(10),
//!     Duration::from_secs(30),
//! );
//! let outcome = delivery.poll_once().await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod aws;
pub mod config;
pub mod delivery;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod loader;
pub mod queue;
pub mod readiness;
pub mod retry;
pub mod storage;
pub mod transform;

pub use config::WorkerConfig;
pub use delivery::{CycleOutcome, DeliveryLoop};
pub use error::{ErrorClass, ProcessError, WorkerError, WorkerResult};
