//! # Table Backends
//!
//! Key/value table stores addressed by `(table, partition_key, row_key)` whose
//! rows carry a bag of string properties.
//!
//! Backends know nothing about entities; [`EntityStore`](super::EntityStore)
//! converts entities to rows through the chunk codec.
//!
//! ## Providers
//!
//! - [`InMemoryTableBackend`]: tests and development, enforces table-store
//!   property limits
//! - [`FileSystemTableBackend`]: one JSON file per row under a root directory

mod file_system;
mod in_memory;

pub use file_system::FileSystemTableBackend;
pub use in_memory::{InMemoryTableBackend, TableLimits};

use super::errors::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// One stored row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub partition_key: String,
    pub row_key: String,
    pub properties: BTreeMap<String, String>,
    /// Last write time, set by the backend
    pub timestamp: DateTime<Utc>,
}

impl TableRow {
    pub fn new(
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
        properties: BTreeMap<String, String>,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait TableBackend: Send + Sync + Debug {
    /// Provider name for logging
    fn provider_name(&self) -> &'static str;

    async fn create_table_if_not_exists(&self, table: &str) -> StorageResult<()>;

    /// Insert a row; `AlreadyExists` when the key is taken
    async fn insert(&self, table: &str, row: TableRow) -> StorageResult<()>;

    /// Insert or fully replace a row
    async fn upsert(&self, table: &str, row: TableRow) -> StorageResult<()>;

    /// Replace an existing row; `NotFound` when it is absent
    async fn replace(&self, table: &str, row: TableRow) -> StorageResult<()>;

    async fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<Option<TableRow>>;

    /// All rows of one partition, ordered by row key
    async fn query_partition(&self, table: &str, partition_key: &str)
        -> StorageResult<Vec<TableRow>>;

    /// Delete a row, returning whether it existed
    async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> StorageResult<bool>;
}
