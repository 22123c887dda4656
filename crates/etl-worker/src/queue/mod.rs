//! Work queue abstraction
//!
//! The delivery loop consumes work notifications through [`WorkQueue`].
//! Implementations:
//! - [`SqsQueue`]: AWS SQS (or LocalStack), the production queue
//! - [`MemoryQueue`]: in-process queue with real visibility-window semantics,
//!   for tests and local runs
//!
//! # Message flow
//!
//! 1. [`receive`](WorkQueue::receive) long-polls for one message and hides it
//!    from other consumers for the visibility window
//! 2. After a committed load the worker calls [`delete`](WorkQueue::delete)
//! 3. On failure the worker either does nothing (the message reappears when
//!    the window lapses) or calls [`dead_letter`](WorkQueue::dead_letter)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::QueueError;

pub mod memory;
pub mod sqs;

pub use memory::MemoryQueue;
pub use sqs::SqsQueue;

/// One delivery of a queue message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Stable across redeliveries
    pub message_id: String,
    /// Valid for this delivery only
    pub receipt_handle: String,
    pub body: String,
    /// 1 on first delivery
    pub receive_count: u32,
}

/// Body written to the dead-letter queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEnvelope {
    pub message_id: String,
    pub body: String,
    pub reason: String,
    pub receive_count: u32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterEnvelope {
    pub fn new(message: &QueueMessage, reason: &str) -> Self {
        Self {
            message_id: message.message_id.clone(),
            body: message.body.clone(),
            reason: reason.to_string(),
            receive_count: message.receive_count,
            failed_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Wait up to `wait` for a single message. The returned message stays
    /// invisible to other consumers for `visibility`.
    ///
    /// Returns `Ok(None)` when the wait elapses with nothing available.
    async fn receive(
        &self,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Option<QueueMessage>, QueueError>;

    /// Acknowledge a delivery; the message will not be delivered again.
    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Enqueue a new message.
    async fn send(&self, body: &str) -> Result<(), QueueError>;

    /// Whether [`dead_letter`](WorkQueue::dead_letter) has somewhere to put messages.
    fn has_dead_letter(&self) -> bool {
        false
    }

    /// Move a message to the dead-letter queue and remove it from this queue.
    ///
    /// The copy is written first. If the delete then fails the original is
    /// delivered again and a later call writes a second envelope; consumers
    /// of the dead-letter queue drop duplicates by
    /// [`DeadLetterEnvelope::message_id`].
    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), QueueError>;
}

#[async_trait]
impl<T: WorkQueue + ?Sized> WorkQueue for Arc<T> {
    async fn receive(
        &self,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Option<QueueMessage>, QueueError> {
        (**self).receive(wait, visibility).await
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        (**self).delete(message).await
    }

    async fn send(&self, body: &str) -> Result<(), QueueError> {
        (**self).send(body).await
    }

    fn has_dead_letter(&self) -> bool {
        (**self).has_dead_letter()
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), QueueError> {
        (**self).dead_letter(message, reason).await
    }
}
