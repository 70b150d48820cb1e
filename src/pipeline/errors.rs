use thiserror::Error;

/// Errors raised by pipeline nodes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Node {node} failed: {message}")]
    NodeError { node: String, message: String },

    #[error("Node {node} received an invalid context: {message}")]
    InvalidContext { node: String, message: String },

    #[error("Pipeline {pipeline} failed at {failed_nodes:?}")]
    PipelineFailed {
        pipeline: String,
        failed_nodes: Vec<String>,
    },
}

impl PipelineError {
    pub fn node(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeError {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn invalid_context(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidContext {
            node: node.into(),
            message: message.into(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
