//! # Pipeline
//!
//! A small domain-free workflow engine. Assembly, completion and every builder
//! are trees of [`PipelineNode`]s over their own context types.

pub mod engine;
pub mod errors;
pub mod node;

pub use engine::{execute_required, ChildExecution, ExecutionOptions, NodeRetry, PipelineNode};
pub use errors::{PipelineError, PipelineResult};
pub use node::{Node, NodeResult, NodeStatus};
