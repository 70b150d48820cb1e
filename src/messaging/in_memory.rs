//! # In-Memory Messaging Service
//!
//! Thread-safe in-memory queue implementation for testing and development.
//!
//! ## Features
//!
//! - **Visibility Timeout**: Messages become invisible after receive, re-visible after timeout
//! - **Peek**: Non-destructive reads leave visibility untouched
//! - **Thread-Safe**: Uses `tokio::sync::RwLock` for concurrent access
//!
//! Visibility is tracked with `tokio::time::Instant`, so tests can drive it
//! with a paused clock.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::errors::{MessagingError, MessagingResult};
use super::service::{MessageId, MessagingService, RawMessage, ReceiptHandle};

#[derive(Debug, Clone)]
struct InMemoryQueuedMessage {
    id: u64,
    payload: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    /// When the message becomes visible again (None = visible now)
    visible_at: Option<Instant>,
    receive_count: u32,
}

impl InMemoryQueuedMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.visible_at.map(|at| at <= now).unwrap_or(true)
    }

    fn to_raw(&self) -> RawMessage {
        RawMessage {
            id: MessageId::from(self.id),
            receipt_handle: ReceiptHandle::new(self.id.to_string()),
            payload: self.payload.clone(),
            receive_count: self.receive_count,
            enqueued_at: self.enqueued_at,
        }
    }
}

#[derive(Debug)]
struct InMemoryQueue {
    messages: VecDeque<InMemoryQueuedMessage>,
    next_id: u64,
}

impl InMemoryQueue {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            next_id: 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMessagingService {
    queues: RwLock<HashMap<String, InMemoryQueue>>,
}

impl InMemoryMessagingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-initialized queues
    pub fn with_queues(queue_names: &[&str]) -> Self {
        let queues = queue_names
            .iter()
            .map(|name| (name.to_string(), InMemoryQueue::new()))
            .collect();
        Self {
            queues: RwLock::new(queues),
        }
    }

    /// Number of messages visible right now (for testing)
    pub async fn visible_count(&self, queue_name: &str) -> usize {
        let now = Instant::now();
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.messages.iter().filter(|m| m.is_visible(now)).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessagingService for InMemoryMessagingService {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        if queue_name.trim().is_empty() {
            return Err(MessagingError::invalid_queue_name(queue_name, "queue name is empty"));
        }
        let mut queues = self.queues.write().await;
        queues
            .entry(queue_name.to_string())
            .or_insert_with(InMemoryQueue::new);
        Ok(())
    }

    async fn send(&self, queue_name: &str, payload: Vec<u8>) -> MessagingResult<MessageId> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let id = queue.next_id;
        queue.next_id += 1;
        queue.messages.push_back(InMemoryQueuedMessage {
            id,
            payload,
            enqueued_at: Utc::now(),
            visible_at: None,
            receive_count: 0,
        });

        Ok(MessageId::from(id))
    }

    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<RawMessage>> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Instant::now();
        let visible_until = now + visibility_timeout;
        let mut received = Vec::new();

        for msg in queue.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if msg.is_visible(now) {
                msg.visible_at = Some(visible_until);
                msg.receive_count += 1;
                received.push(msg.to_raw());
            }
        }

        Ok(received)
    }

    async fn peek(&self, queue_name: &str, max_messages: usize) -> MessagingResult<Vec<RawMessage>> {
        let queues = self.queues.read().await;
        let queue = queues
            .get(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Instant::now();
        Ok(queue
            .messages
            .iter()
            .filter(|m| m.is_visible(now))
            .take(max_messages)
            .map(InMemoryQueuedMessage::to_raw)
            .collect())
    }

    async fn delete(&self, queue_name: &str, receipt_handle: &ReceiptHandle) -> MessagingResult<()> {
        let message_id: u64 = receipt_handle
            .as_str()
            .parse()
            .map_err(|_| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        match queue.messages.iter().position(|m| m.id == message_id) {
            Some(pos) => {
                queue.messages.remove(pos);
                Ok(())
            }
            None => Err(MessagingError::message_not_found(message_id.to_string())),
        }
    }

    async fn queue_length(&self, queue_name: &str) -> MessagingResult<usize> {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.messages.len())
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
