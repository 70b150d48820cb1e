//! # Storage Error Types
//!
//! Structured errors for the chunk codec, the table backends and the entity
//! repository.

use thiserror::Error;

/// Errors raised while encoding or decoding chunked entities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Entity too large: {size_bytes} bytes exceeds chunk capacity of {capacity_bytes} bytes")]
    EntityTooLarge {
        size_bytes: usize,
        capacity_bytes: usize,
    },

    #[error("Entity serialization error: {message}")]
    Serialization { message: String },

    #[error("Entity deserialization error: {message}")]
    Deserialization { message: String },

    #[error("Corrupt chunk set: {message}")]
    CorruptChunkSet { message: String },

    #[error("Invalid chunk layout: {message}")]
    InvalidLayout { message: String },
}

impl CodecError {
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization {
            message: message.into(),
        }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptChunkSet {
            message: message.into(),
        }
    }

    pub fn invalid_layout(message: impl Into<String>) -> Self {
        Self::InvalidLayout {
            message: message.into(),
        }
    }
}

/// Errors raised by table backends and entity stores
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Entity not found: {table}/{partition_key}/{row_key}")]
    NotFound {
        table: String,
        partition_key: String,
        row_key: String,
    },

    #[error("Entity already exists: {table}/{partition_key}/{row_key}")]
    AlreadyExists {
        table: String,
        partition_key: String,
        row_key: String,
    },

    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Property {property} is {size_bytes} bytes, limit is {limit_bytes} bytes")]
    PropertyTooLarge {
        property: String,
        size_bytes: usize,
        limit_bytes: usize,
    },

    #[error("Row has {count} properties, limit is {limit}")]
    TooManyProperties { count: usize, limit: usize },

    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Storage backend error during {operation}: {message}")]
    Backend { operation: String, message: String },
}

impl StorageError {
    pub fn not_found(
        table: impl Into<String>,
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            table: table.into(),
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }

    pub fn already_exists(
        table: impl Into<String>,
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
    ) -> Self {
        Self::AlreadyExists {
            table: table.into(),
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }

    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::backend("io", err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::backend("row_serialization", err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("jobs", "J1", "J1");
        assert_eq!(err.to_string(), "Entity not found: jobs/J1/J1");
        assert!(err.is_not_found());

        let err = CodecError::EntityTooLarge {
            size_bytes: 2_000_000,
            capacity_bytes: 917_504,
        };
        assert!(err.to_string().contains("917504"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io.into();
        assert!(matches!(err, StorageError::Backend { .. }));
    }
}
