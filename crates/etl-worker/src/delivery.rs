//! Delivery loop
//!
//! Receives one notification at a time and drives it through
//! parse → fetch → transform → load. The message is deleted only after the
//! load has committed. Anything else leaves it on the queue for redelivery
//! (or moves it to the dead-letter queue, per [`RetryPolicy::disposition`]).
//!
//! Delivery is at-least-once: a message can be processed again after its
//! visibility window lapses or after a lost delete. The loader's upsert on
//! `(id, batch_id)` absorbs those duplicates.

use etl_common::types::WorkNotification;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Span};

use crate::error::{ProcessError, QueueError};
use crate::fetcher::ObjectFetcher;
use crate::loader::Loader;
use crate::queue::{QueueMessage, WorkQueue};
use crate::retry::{Disposition, RetryPolicy};
use crate::storage::ObjectStore;
use crate::transform;

/// Result of one polling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The long poll ended without a message
    Idle,
    /// The batch was committed. `acknowledged` is false when the delete
    /// failed and the message will be delivered again.
    Committed { records: u64, acknowledged: bool },
    /// Processing failed and the message stays on the queue
    Retained,
    /// Processing failed and the message was moved to the dead-letter queue
    DeadLettered,
}

impl CycleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CycleOutcome::Retained | CycleOutcome::DeadLettered)
    }
}

/// Owns the queue, fetcher and loader handles for the life of the worker.
pub struct DeliveryLoop<Q, S, L> {
    queue: Q,
    fetcher: ObjectFetcher<S>,
    loader: L,
    policy: RetryPolicy,
    wait: Duration,
    visibility: Duration,
}

impl<Q, S, L> DeliveryLoop<Q, S, L>
where
    Q: WorkQueue,
    S: ObjectStore,
    L: Loader,
{
    pub fn new(
        queue: Q,
        fetcher: ObjectFetcher<S>,
        loader: L,
        policy: RetryPolicy,
        wait: Duration,
        visibility: Duration,
    ) -> Self {
        Self {
            queue,
            fetcher,
            loader,
            policy,
            wait,
            visibility,
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Run one full cycle: receive, then process the message if there is one.
    pub async fn poll_once(&self) -> Result<CycleOutcome, QueueError> {
        match self.queue.receive(self.wait, self.visibility).await? {
            Some(message) => Ok(self.handle(&message).await),
            None => {
                debug!("No messages available");
                Ok(CycleOutcome::Idle)
            },
        }
    }

    /// Process until `shutdown` is cancelled.
    ///
    /// Cancellation is observed while waiting for a message or pausing,
    /// never while a message is being processed. Receive errors are retried
    /// with backoff, so the loop only ends on cancellation.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            wait_secs = self.wait.as_secs(),
            visibility_secs = self.visibility.as_secs(),
            dead_letter = self.queue.has_dead_letter(),
            "Delivery loop started"
        );

        let mut consecutive_failures: u32 = 0;

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.queue.receive(self.wait, self.visibility) => received,
            };

            let pause = match received {
                Ok(None) => {
                    debug!("No messages available");
                    self.policy.idle_pause
                },
                Ok(Some(message)) => {
                    let outcome = self.handle(&message).await;
                    if outcome.is_failure() {
                        consecutive_failures = consecutive_failures.saturating_add(1);
                        self.policy.failure_delay(consecutive_failures)
                    } else {
                        consecutive_failures = 0;
                        Duration::ZERO
                    }
                },
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!(error = %e, consecutive_failures, "Receive failed");
                    self.policy.failure_delay(consecutive_failures)
                },
            };

            if pause.is_zero() {
                continue;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {},
            }
        }

        info!("Delivery loop stopped");
    }

    /// Process one delivered message and settle it on the queue.
    #[instrument(
        name = "message",
        skip(self, message),
        fields(
            message_id = %message.message_id,
            receive_count = message.receive_count,
            key = tracing::field::Empty,
        )
    )]
    pub async fn handle(&self, message: &QueueMessage) -> CycleOutcome {
        let records = match self.process(message).await {
            Ok(records) => records,
            Err(err) => return self.settle_failure(message, err).await,
        };

        let acknowledged = match self.queue.delete(message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Batch committed but delete failed; message will be redelivered");
                false
            },
        };

        info!(records, acknowledged, "Message processed");
        CycleOutcome::Committed {
            records,
            acknowledged,
        }
    }

    async fn process(&self, message: &QueueMessage) -> Result<u64, ProcessError> {
        let notification = WorkNotification::from_json(&message.body)?;
        Span::current().record("key", notification.key.as_str());

        let raw = self
            .fetcher
            .fetch(&notification.container, &notification.key)
            .await?;
        let records = transform::transform(&raw)?;

        // The object key is the batch identity.
        let written = self.loader.load(&notification.key, &records).await?;
        Ok(written)
    }

    async fn settle_failure(&self, message: &QueueMessage, err: ProcessError) -> CycleOutcome {
        let class = err.class();
        let key = WorkNotification::from_json(&message.body)
            .map(|n| n.key)
            .unwrap_or_default();

        error!(
            message_id = %message.message_id,
            receive_count = message.receive_count,
            key = %key,
            stage = err.stage(),
            class = %class,
            error = %err,
            "Message processing failed"
        );

        let disposition =
            self.policy
                .disposition(class, message.receive_count, self.queue.has_dead_letter());

        match disposition {
            Disposition::Retain => {
                debug!("Message retained for redelivery");
                CycleOutcome::Retained
            },
            Disposition::DeadLetter => match self.queue.dead_letter(message, &err.to_string()).await {
                Ok(()) => {
                    warn!(class = %class, "Message moved to dead-letter queue");
                    CycleOutcome::DeadLettered
                },
                Err(e) => {
                    error!(error = %e, "Dead-lettering failed; message retained");
                    CycleOutcome::Retained
                },
            },
        }
    }
}
