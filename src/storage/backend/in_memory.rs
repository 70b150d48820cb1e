//! # In-Memory Table Backend
//!
//! Thread-safe table store for testing and development.
//!
//! ## Features
//!
//! - **Table-store limits**: rows are rejected when a property exceeds the
//!   per-property byte limit or the row carries too many properties
//! - **Thread-Safe**: Uses `tokio::sync::RwLock` for concurrent access
//! - **Conditional insert**: `insert` is atomic under the table lock, so two
//!   racing inserts of the same key resolve to exactly one winner

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{TableBackend, TableRow};
use crate::storage::errors::{StorageError, StorageResult};

/// Per-row limits mirroring a cloud table store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLimits {
    pub max_property_bytes: usize,
    pub max_properties: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            max_property_bytes: 64 * 1024,
            max_properties: 252,
        }
    }
}

type Partition = BTreeMap<String, TableRow>;
type Table = HashMap<String, Partition>;

#[derive(Debug, Default)]
pub struct InMemoryTableBackend {
    tables: RwLock<HashMap<String, Table>>,
    limits: TableLimits,
}

impl InMemoryTableBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: TableLimits) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            limits,
        }
    }

    /// Number of rows in a table (0 for a missing table)
    pub async fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(|t| t.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    fn check_limits(&self, row: &TableRow) -> StorageResult<()> {
        if row.properties.len() > self.limits.max_properties {
            return Err(StorageError::TooManyProperties {
                count: row.properties.len(),
                limit: self.limits.max_properties,
            });
        }
        for (name, value) in &row.properties {
            if value.len() > self.limits.max_property_bytes {
                return Err(StorageError::PropertyTooLarge {
                    property: name.clone(),
                    size_bytes: value.len(),
                    limit_bytes: self.limits.max_property_bytes,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TableBackend for InMemoryTableBackend {
    fn provider_name(&self) -> &'static str {
        "in_memory"
    }

    async fn create_table_if_not_exists(&self, table: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.contains_key(table) {
            tables.insert(table.to_string(), Table::new());
            debug!(table = %table, "Created in-memory table");
        }
        Ok(())
    }

    async fn insert(&self, table: &str, mut row: TableRow) -> StorageResult<()> {
        self.check_limits(&row)?;
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::table_not_found(table))?;
        let partition = rows.entry(row.partition_key.clone()).or_default();

        if partition.contains_key(&row.row_key) {
            return Err(StorageError::already_exists(
                table,
                &row.partition_key,
                &row.row_key,
            ));
        }
        row.timestamp = Utc::now();
        partition.insert(row.row_key.clone(), row);
        Ok(())
    }

    async fn upsert(&self, table: &str, mut row: TableRow) -> StorageResult<()> {
        self.check_limits(&row)?;
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::table_not_found(table))?;
        row.timestamp = Utc::now();
        rows.entry(row.partition_key.clone())
            .or_default()
            .insert(row.row_key.clone(), row);
        Ok(())
    }

    async fn replace(&self, table: &str, mut row: TableRow) -> StorageResult<()> {
        self.check_limits(&row)?;
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::table_not_found(table))?;
        let existing = rows
            .get_mut(&row.partition_key)
            .and_then(|partition| partition.get_mut(&row.row_key))
            .ok_or_else(|| StorageError::not_found(table, &row.partition_key, &row.row_key))?;
        row.timestamp = Utc::now();
        *existing = row;
        Ok(())
    }

    async fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<Option<TableRow>> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| StorageError::table_not_found(table))?;
        Ok(rows
            .get(partition_key)
            .and_then(|partition| partition.get(row_key))
            .cloned())
    }

    async fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> StorageResult<Vec<TableRow>> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| StorageError::table_not_found(table))?;
        Ok(rows
            .get(partition_key)
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::table_not_found(table))?;
        Ok(rows
            .get_mut(partition_key)
            .map(|partition| partition.remove(row_key).is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pk: &str, rk: &str, value: &str) -> TableRow {
        let mut properties = BTreeMap::new();
        properties.insert("P0".to_string(), value.to_string());
        TableRow::new(pk, rk, properties)
    }

    #[tokio::test]
    async fn test_missing_table_is_an_error() {
        let backend = InMemoryTableBackend::new();
        let result = backend.get("jobs", "a", "a").await;
        assert!(matches!(result, Err(StorageError::TableNotFound { .. })));
    }

    #[tokio::test]
    async fn test_insert_is_conditional() {
        let backend = InMemoryTableBackend::new();
        backend.create_table_if_not_exists("jobs").await.unwrap();

        backend.insert("jobs", row("a", "1", "first")).await.unwrap();
        let err = backend
            .insert("jobs", row("a", "1", "second"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());

        let stored = backend.get("jobs", "a", "1").await.unwrap().unwrap();
        assert_eq!(stored.properties["P0"], "first");
    }

    #[tokio::test]
    async fn test_replace_requires_existing_row() {
        let backend = InMemoryTableBackend::new();
        backend.create_table_if_not_exists("jobs").await.unwrap();

        let err = backend.replace("jobs", row("a", "1", "x")).await.unwrap_err();
        assert!(err.is_not_found());

        backend.upsert("jobs", row("a", "1", "x")).await.unwrap();
        backend.replace("jobs", row("a", "1", "y")).await.unwrap();
        let stored = backend.get("jobs", "a", "1").await.unwrap().unwrap();
        assert_eq!(stored.properties["P0"], "y");
    }

    #[tokio::test]
    async fn test_partition_query_and_delete() {
        let backend = InMemoryTableBackend::new();
        backend.create_table_if_not_exists("fp").await.unwrap();
        backend.upsert("fp", row("s100", "b", "2")).await.unwrap();
        backend.upsert("fp", row("s100", "a", "1")).await.unwrap();
        backend.upsert("fp", row("s57", "a", "3")).await.unwrap();

        let rows = backend.query_partition("fp", "s100").await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.row_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);

        assert!(backend.delete("fp", "s100", "a").await.unwrap());
        assert!(!backend.delete("fp", "s100", "a").await.unwrap());
        assert_eq!(backend.row_count("fp").await, 2);
    }

    #[tokio::test]
    async fn test_property_limits_are_enforced() {
        let backend = InMemoryTableBackend::with_limits(TableLimits {
            max_property_bytes: 4,
            max_properties: 2,
        });
        backend.create_table_if_not_exists("t").await.unwrap();

        let err = backend.upsert("t", row("a", "1", "12345")).await.unwrap_err();
        assert!(matches!(err, StorageError::PropertyTooLarge { .. }));

        let mut properties = BTreeMap::new();
        for i in 0..3 {
            properties.insert(format!("P{i}"), "x".to_string());
        }
        let err = backend
            .upsert("t", TableRow::new("a", "1", properties))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TooManyProperties { count: 3, limit: 2 }));
    }
}
