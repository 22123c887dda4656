//! In-memory work queue.
//!
//! Mirrors the SQS behaviour the worker depends on: a received message is
//! hidden for its visibility window and then becomes receivable again with a
//! higher receive count and a fresh receipt handle. Deleting with a receipt
//! from an earlier delivery fails. Time is the tokio clock, so tests can run
//! with paused time.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{DeadLetterEnvelope, QueueMessage, WorkQueue};
use crate::error::QueueError;

#[derive(Debug)]
struct Entry {
    message_id: String,
    body: String,
    receipt_handle: Option<String>,
    visible_at: Instant,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct State {
    messages: VecDeque<Entry>,
    dead_letters: Vec<DeadLetterEnvelope>,
    deleted: usize,
    failing_deletes: u32,
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
    arrivals: Notify,
    dead_letter_enabled: bool,
    receive_calls: AtomicUsize,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue whose [`dead_letter`](WorkQueue::dead_letter) keeps envelopes
    /// for inspection.
    pub fn with_dead_letter_queue() -> Self {
        Self {
            dead_letter_enabled: true,
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Messages still on the queue, visible or in flight
    pub fn len(&self) -> usize {
        self.state().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages receivable right now
    pub fn visible_len(&self) -> usize {
        let now = Instant::now();
        self.state()
            .messages
            .iter()
            .filter(|e| e.visible_at <= now)
            .count()
    }

    pub fn deleted_count(&self) -> usize {
        self.state().deleted
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEnvelope> {
        self.state().dead_letters.clone()
    }

    /// Number of `receive` calls made so far
    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    /// Make the next `n` deletes fail, as a lost acknowledgement would.
    pub fn fail_next_deletes(&self, n: u32) {
        self.state().failing_deletes = n;
    }

    fn take_visible(&self, visibility: Duration) -> Option<QueueMessage> {
        let now = Instant::now();
        let mut state = self.state();
        let entry = state.messages.iter_mut().find(|e| e.visible_at <= now)?;

        let receipt_handle = Uuid::new_v4().to_string();
        entry.receipt_handle = Some(receipt_handle.clone());
        entry.visible_at = now + visibility;
        entry.receive_count += 1;

        Some(QueueMessage {
            message_id: entry.message_id.clone(),
            receipt_handle,
            body: entry.body.clone(),
            receive_count: entry.receive_count,
        })
    }

    fn next_visible_at(&self) -> Option<Instant> {
        self.state().messages.iter().map(|e| e.visible_at).min()
    }

    fn delivery_position(state: &State, message: &QueueMessage) -> Option<usize> {
        state.messages.iter().position(|e| {
            e.message_id == message.message_id
                && e.receipt_handle.as_deref() == Some(message.receipt_handle.as_str())
        })
    }

    /// Remove the entry matching this delivery's receipt handle.
    fn remove_delivery(&self, state: &mut State, message: &QueueMessage) -> Option<Entry> {
        let position = Self::delivery_position(state, message)?;
        state.messages.remove(position)
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn receive(
        &self,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Option<QueueMessage>, QueueError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + wait;

        loop {
            // Register before checking so a concurrent send is not missed.
            let arrival = self.arrivals.notified();

            if let Some(message) = self.take_visible(visibility) {
                return Ok(Some(message));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let wake_at = match self.next_visible_at() {
                Some(at) if at > now => at.min(deadline),
                _ => deadline,
            };

            tokio::select! {
                _ = arrival => {},
                _ = tokio::time::sleep_until(wake_at) => {},
            }
        }
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let mut state = self.state();

        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Err(QueueError::Delete {
                message_id: message.message_id.clone(),
                reason: "injected delete failure".to_string(),
            });
        }

        match self.remove_delivery(&mut state, message) {
            Some(_) => {
                state.deleted += 1;
                Ok(())
            },
            None => Err(QueueError::Delete {
                message_id: message.message_id.clone(),
                reason: "receipt handle is no longer valid".to_string(),
            }),
        }
    }

    async fn send(&self, body: &str) -> Result<(), QueueError> {
        self.state().messages.push_back(Entry {
            message_id: Uuid::new_v4().to_string(),
            body: body.to_string(),
            receipt_handle: None,
            visible_at: Instant::now(),
            receive_count: 0,
        });
        self.arrivals.notify_waiters();
        Ok(())
    }

    fn has_dead_letter(&self) -> bool {
        self.dead_letter_enabled
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), QueueError> {
        if !self.dead_letter_enabled {
            return Err(QueueError::DeadLetter {
                message_id: message.message_id.clone(),
                reason: "no dead-letter queue configured".to_string(),
            });
        }

        {
            let mut state = self.state();
            if Self::delivery_position(&state, message).is_none() {
                return Err(QueueError::DeadLetter {
                    message_id: message.message_id.clone(),
                    reason: "receipt handle is no longer valid".to_string(),
                });
            }
            state.dead_letters.push(DeadLetterEnvelope::new(message, reason));
        }

        // Same order as SQS: the copy is stored before the original goes.
        self.delete(message).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const VISIBILITY: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_received_message_is_hidden_until_window_lapses() {
        let queue = MemoryQueue::new();
        queue.send("hello").await.unwrap();

        let first = queue.receive(Duration::ZERO, VISIBILITY).await.unwrap().unwrap();
        assert_eq!(first.receive_count, 1);
        assert_eq!(queue.visible_len(), 0);
        assert!(queue.receive(Duration::ZERO, VISIBILITY).await.unwrap().is_none());

        tokio::time::advance(VISIBILITY).await;

        let second = queue.receive(Duration::ZERO, VISIBILITY).await.unwrap().unwrap();
        assert_eq!(second.message_id, first.message_id);
        assert_eq!(second.receive_count, 2);
        assert_ne!(second.receipt_handle, first.receipt_handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_receipt_cannot_delete() {
        let queue = MemoryQueue::new();
        queue.send("hello").await.unwrap();

        let first = queue.receive(Duration::ZERO, VISIBILITY).await.unwrap().unwrap();
        tokio::time::advance(VISIBILITY).await;
        let second = queue.receive(Duration::ZERO, VISIBILITY).await.unwrap().unwrap();

        assert!(queue.delete(&first).await.is_err());
        queue.delete(&second).await.unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.deleted_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_times_out_empty() {
        let queue = MemoryQueue::new();
        let started = Instant::now();

        let received = queue.receive(Duration::from_secs(10), VISIBILITY).await.unwrap();

        assert!(received.is_none());
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(queue.receive_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_wakes_on_send() {
        let queue = std::sync::Arc::new(MemoryQueue::new());
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            producer.send("late").await.unwrap();
        });

        let started = Instant::now();
        let message = queue
            .receive(Duration::from_secs(10), VISIBILITY)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(message.body, "late");
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_moves_message() {
        let queue = MemoryQueue::with_dead_letter_queue();
        queue.send("poison").await.unwrap();
        let message = queue.receive(Duration::ZERO, VISIBILITY).await.unwrap().unwrap();

        queue.dead_letter(&message, "not json").await.unwrap();

        assert!(queue.is_empty());
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, "poison");
        assert_eq!(dead[0].reason, "not json");
    }

    #[tokio::test]
    async fn test_dead_letter_requires_configured_queue() {
        let queue = MemoryQueue::new();
        queue.send("poison").await.unwrap();
        let message = queue.receive(Duration::ZERO, VISIBILITY).await.unwrap().unwrap();

        assert!(!queue.has_dead_letter());
        assert!(queue.dead_letter(&message, "x").await.is_err());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_keeps_copy_when_delete_fails() {
        let queue = MemoryQueue::with_dead_letter_queue();
        queue.send("poison").await.unwrap();
        let message = queue.receive(Duration::ZERO, VISIBILITY).await.unwrap().unwrap();
        queue.fail_next_deletes(1);

        let err = queue.dead_letter(&message, "not json").await.unwrap_err();

        assert!(matches!(err, QueueError::Delete { .. }), "{err:?}");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dead_letters().len(), 1);
    }
}
