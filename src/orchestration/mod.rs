//! # Orchestration
//!
//! The request lifecycle, end to end:
//!
//! - [`AssemblyOrchestrator`] turns a caller's request into a job, deduplicates
//!   it against in-flight and recent builds, and dispatches a build request.
//! - [`BuildRequestMonitor`] runs queued requests through the builder and
//!   enqueues the outcome.
//! - [`BuildResponseMonitor`] applies outcomes through the
//!   [`CompletionOrchestrator`].
//! - [`JobStatusReader`] answers status queries.
//!
//! [`OrchestrationSystem`] wires all of them from one configuration.

pub mod assembly;
pub mod build_monitor;
pub mod completion;
pub mod polling;
pub mod processed_jobs;
pub mod response_monitor;
pub mod status;
pub mod stores;
pub mod system;

pub use assembly::{AssemblyDecision, AssemblyOrchestrator, AssemblyResult};
pub use build_monitor::BuildRequestMonitor;
pub use completion::{CompletionOrchestrator, CompletionOutcome};
pub use polling::{run_until_shutdown, QueueMonitor};
pub use processed_jobs::ProcessedJobTracker;
pub use response_monitor::BuildResponseMonitor;
pub use status::{JobStatus, JobStatusReader};
pub use stores::{table_backend, OrchestratorStores};
pub use system::{ExternalClients, OrchestrationSystem};
