//! # Messaging Module
//!
//! Queue-based dispatch of build work. One request queue and one response
//! queue exist per data standard; monitors poll them independently.

pub mod dispatch;
pub mod errors;
pub mod in_memory;
pub mod message;
pub mod service;

pub use dispatch::BuildDispatchQueue;
pub use errors::{MessagingError, MessagingResult};
pub use in_memory::InMemoryMessagingService;
pub use message::{BuildRequest, BuildResponse, ExitCode, QueueMessage};
pub use service::{MessageId, MessagingService, RawMessage, ReceiptHandle};
