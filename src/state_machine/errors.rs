use crate::storage::StorageError;
use thiserror::Error;

/// Error types for job/build state machine operations
#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from:?} on signal {signal}")]
    InvalidTransition { from: Option<String>, signal: String },

    #[error("Persistence operation failed: {0}")]
    PersistenceFailed(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StateMachineError {
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
