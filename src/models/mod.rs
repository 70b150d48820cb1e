//! # Domain Models
//!
//! Records persisted by the orchestrator and the request shape it accepts.

pub mod build;
pub mod data_standard;
pub mod fingerprint;
pub mod ids;
pub mod job;
pub mod request;
pub mod timestamp;

// Re-export core models for easy access
pub use build::Build;
pub use data_standard::DataStandard;
pub use fingerprint::BuildFingerprint;
pub use ids::{BatchId, InvalidIdentifier, JobId};
pub use job::{Job, NewJob};
pub use request::ExchangeSetRequest;
pub use timestamp::StandardTimestamp;
