//! # Job/Build State Machine
//!
//! The legal `(JobState, BuildState)` pairs, the named signals that move a job
//! between them, and the machine that validates and persists each transition.

pub mod errors;
pub mod events;
pub mod job_build_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::JobSignal;
pub use job_build_state_machine::{AssemblyErrorSubject, JobBuildStateMachine};
pub use states::{BuildState, JobState, StatePair};
