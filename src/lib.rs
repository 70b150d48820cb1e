#![allow(clippy::doc_markdown)] // Allow technical terms like S-100, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Exchange Set Core
//!
//! Build orchestration for nautical chart exchange sets (S-100, S-57, S-63).
//!
//! ## Overview
//!
//! A caller asks for an exchange set by listing products or giving a product
//! filter. The orchestrator records a job, checks the sales catalogue for the
//! current data, and decides whether a new build is needed at all: identical
//! requests against the same catalogue state share one build. Builds run
//! asynchronously off per-standard queues and report back through response
//! queues; completion updates the job and notifies the caller.
//!
//! ## Module Organization
//!
//! - [`storage`] - Chunked entity codec, table backends and typed entity stores
//! - [`models`] - Jobs, builds, fingerprints and per-standard timestamps
//! - [`state_machine`] - Legal job/build state pairs and the signals between them
//! - [`fingerprint`] - Build discriminants and the fingerprint claim table
//! - [`pipeline`] - Tree-structured async workflow engine
//! - [`messaging`] - Queue abstraction and the build request/response messages
//! - [`clients`] - Downstream service seams, retry policy and caller callbacks
//! - [`builder`] - Per-standard exchange set build pipelines
//! - [`orchestration`] - Assembly, completion, queue monitors and status
//! - [`config`] - TOML and environment configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exchange_set_core::config::ConfigLoader;
//! use exchange_set_core::messaging::InMemoryMessagingService;
//! use exchange_set_core::models::{DataStandard, ExchangeSetRequest};
//! use exchange_set_core::orchestration::{table_backend, ExternalClients, OrchestrationSystem};
//! use std::sync::Arc;
//!
//! # async fn example(clients: ExternalClients) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load(Some("config/orchestrator.toml"))?;
//! let backend = table_backend(&config.storage);
//! let system = OrchestrationSystem::bootstrap(
//!     config,
//!     backend,
//!     Arc::new(InMemoryMessagingService::new()),
//!     clients,
//! )
//! .await?;
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let monitors = system.spawn_monitors(shutdown_rx);
//!
//! let request = ExchangeSetRequest::new(DataStandard::S100).with_products(["101GB00001"]);
//! let result = system.submit(request).await?;
//! println!("job {} -> {:?}", result.job.id, result.decision);
//!
//! shutdown_tx.send(true)?;
//! for monitor in monitors {
//!     monitor.await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod clients;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod pipeline;
pub mod state_machine;
pub mod storage;

pub use config::{ConfigLoader, OrchestratorConfig};
pub use error::{OrchestratorError, OrchestratorResult};
pub use models::{DataStandard, ExchangeSetRequest, Job, JobId};
pub use orchestration::{
    AssemblyDecision, AssemblyOrchestrator, CompletionOrchestrator, JobStatusReader,
    OrchestrationSystem,
};
pub use state_machine::{BuildState, JobBuildStateMachine, JobState, StatePair};
