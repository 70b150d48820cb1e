//! Error types for the exchange set orchestration core.
//!

use crate::clients::ServiceError;
use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::pipeline::PipelineError;
use crate::state_machine::StateMachineError;
use crate::storage::{CodecError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("External service error: {0}")]
    Service(#[from] ServiceError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Job not found: {0}")]
    JobNotFound(String),
    #[error("Build not found for job {job_id} ({data_standard})")]
    BuildNotFound {
        job_id: String,
        data_standard: String,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True when retrying the same operation can never succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Codec(CodecError::EntityTooLarge { .. }) => true,
            Self::Storage(StorageError::Codec(CodecError::EntityTooLarge { .. })) => true,
            Self::Validation(_) | Self::Configuration(_) | Self::JobNotFound(_) => true,
            Self::StateMachine(StateMachineError::InvalidTransition { .. }) => true,
            Self::Service(err) => !err.is_retriable(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(error: serde_json::Error) -> Self {
        OrchestratorError::Validation(format!("JSON serialization error: {error}"))
    }
}

pub type OrchestratorResult<T> = anyhow::Result<T, OrchestratorError>;
