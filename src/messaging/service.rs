//! # Messaging Service
//!
//! Provider-agnostic queue abstraction over raw payload bytes.
//!
//! Payloads stay undecoded at this layer so a consumer can still delete a
//! message it is unable to parse.

use super::errors::MessagingResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Handle for deleting a received or peeked message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as delivered by a provider
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: MessageId,
    pub receipt_handle: ReceiptHandle,
    pub payload: Vec<u8>,
    /// Number of destructive receives, including this one
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

#[async_trait]
pub trait MessagingService: Send + Sync + fmt::Debug {
    /// Create the queue if it does not exist
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()>;

    async fn send(&self, queue_name: &str, payload: Vec<u8>) -> MessagingResult<MessageId>;

    /// Receive visible messages, hiding each for `visibility_timeout`
    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<RawMessage>>;

    /// Read visible messages without hiding them
    async fn peek(&self, queue_name: &str, max_messages: usize) -> MessagingResult<Vec<RawMessage>>;

    /// Remove a message for good
    async fn delete(&self, queue_name: &str, receipt_handle: &ReceiptHandle) -> MessagingResult<()>;

    /// Messages currently stored, visible or not
    async fn queue_length(&self, queue_name: &str) -> MessagingResult<usize>;

    fn provider_name(&self) -> &'static str;
}
