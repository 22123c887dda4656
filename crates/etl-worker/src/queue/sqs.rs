//! SQS work queue implementation.

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{DeadLetterEnvelope, QueueMessage, WorkQueue};
use crate::error::QueueError;

/// Work queue backed by an SQS queue URL, with an optional dead-letter queue.
#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    dead_letter_url: Option<String>,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            dead_letter_url: None,
        }
    }

    pub fn with_dead_letter_url(mut self, url: impl Into<String>) -> Self {
        self.dead_letter_url = Some(url.into());
        self
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Look up the URL of an existing queue.
    pub async fn resolve_url(client: &Client, name: &str) -> Result<String, QueueError> {
        let response = client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| QueueError::Resolve {
                name: name.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        response
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| QueueError::Resolve {
                name: name.to_string(),
                reason: "response carried no queue URL".to_string(),
            })
    }

    /// Create the queue if missing and return its URL. Idempotent.
    pub async fn create(client: &Client, name: &str) -> Result<String, QueueError> {
        let response = client
            .create_queue()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| QueueError::Resolve {
                name: name.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        response
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| QueueError::Resolve {
                name: name.to_string(),
                reason: "response carried no queue URL".to_string(),
            })
    }

    async fn delete_receipt(&self, message: &QueueMessage) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete {
                message_id: message.message_id.clone(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for SqsQueue {
    #[instrument(skip(self), fields(queue_url = %self.queue_url))]
    async fn receive(
        &self,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Option<QueueMessage>, QueueError> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(wait.as_secs().min(20) as i32)
            .visibility_timeout(visibility.as_secs().min(i32::MAX as u64) as i32)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(&e).to_string()))?;

        let Some(message) = response.messages.unwrap_or_default().into_iter().next() else {
            debug!("Long poll returned no messages");
            return Ok(None);
        };

        let receive_count = message
            .attributes
            .as_ref()
            .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let receipt_handle = message
            .receipt_handle
            .ok_or_else(|| QueueError::Receive("message without receipt handle".to_string()))?;

        Ok(Some(QueueMessage {
            message_id: message.message_id.unwrap_or_default(),
            receipt_handle,
            body: message.body.unwrap_or_default(),
            receive_count,
        }))
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        self.delete_receipt(message).await?;
        debug!(message_id = %message.message_id, "Deleted message");
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<(), QueueError> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Send(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    fn has_dead_letter(&self) -> bool {
        self.dead_letter_url.is_some()
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), QueueError> {
        let dead_letter_error = |reason: String| QueueError::DeadLetter {
            message_id: message.message_id.clone(),
            reason,
        };

        let dlq_url = self
            .dead_letter_url
            .as_deref()
            .ok_or_else(|| dead_letter_error("no dead-letter queue configured".to_string()))?;

        let envelope = serde_json::to_string(&DeadLetterEnvelope::new(message, reason))
            .map_err(|e| dead_letter_error(e.to_string()))?;

        self.client
            .send_message()
            .queue_url(dlq_url)
            .message_body(envelope)
            .send()
            .await
            .map_err(|e| dead_letter_error(DisplayErrorContext(&e).to_string()))?;

        // Remove the original only once the DLQ copy is stored. A failed delete
        // means a redelivery will write another envelope with this message_id.
        if let Err(e) = self.delete_receipt(message).await {
            warn!(
                message_id = %message.message_id,
                error = %e,
                "Stored DLQ copy but original delete failed; expect a duplicate envelope"
            );
            return Err(e);
        }

        info!(message_id = %message.message_id, reason, "Moved message to DLQ");
        Ok(())
    }
}
