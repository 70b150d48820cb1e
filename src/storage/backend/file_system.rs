//! # File-System Table Backend
//!
//! Stores each row as `{root}/{table}/{partition_key}/{row_key}.json`.
//!
//! Keys reaching this backend have already been sanitized by the entity store,
//! so they are safe single path segments. Every write goes to a temporary
//! sibling file first. Conditional inserts hard-link it into place, which the
//! operating system refuses when the target exists; upserts rename it over the
//! target.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{TableBackend, TableRow};
use crate::storage::errors::{StorageError, StorageResult};

const ROW_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileSystemTableBackend {
    root: PathBuf,
}

impl FileSystemTableBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    fn partition_dir(&self, table: &str, partition_key: &str) -> PathBuf {
        self.table_dir(table).join(partition_key)
    }

    fn row_path(&self, table: &str, partition_key: &str, row_key: &str) -> PathBuf {
        self.partition_dir(table, partition_key)
            .join(format!("{row_key}.{ROW_EXTENSION}"))
    }

    async fn ensure_table(&self, table: &str) -> StorageResult<()> {
        match fs::metadata(self.table_dir(table)).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::table_not_found(table)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::table_not_found(table)),
            Err(e) => Err(StorageError::backend("stat_table", e.to_string())),
        }
    }

    async fn read_row(path: &Path) -> StorageResult<Option<TableRow>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::backend("read_row", e.to_string())),
        }
    }

    /// Fully written row in a hidden temporary file inside `dir`
    async fn write_temp(dir: &Path, row: &TableRow) -> StorageResult<PathBuf> {
        let bytes = serde_json::to_vec(row)?;
        let temp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        if let Err(e) = fs::write(&temp, &bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(StorageError::backend("write_row", e.to_string()));
        }
        Ok(temp)
    }

    /// Write via a temporary sibling and rename so readers never see a partial row
    async fn write_row_atomically(&self, path: &Path, row: &TableRow) -> StorageResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::backend("write_row", "row path has no parent"))?;
        fs::create_dir_all(parent).await?;

        let temp = Self::write_temp(parent, row).await?;
        if let Err(e) = fs::rename(&temp, path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(StorageError::backend("rename_row", e.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TableBackend for FileSystemTableBackend {
    fn provider_name(&self) -> &'static str {
        "file_system"
    }

    async fn create_table_if_not_exists(&self, table: &str) -> StorageResult<()> {
        fs::create_dir_all(self.table_dir(table))
            .await
            .map_err(|e| StorageError::backend("create_table", e.to_string()))?;
        debug!(table = %table, root = %self.root.display(), "Ensured table directory");
        Ok(())
    }

    async fn insert(&self, table: &str, mut row: TableRow) -> StorageResult<()> {
        self.ensure_table(table).await?;
        let partition = self.partition_dir(table, &row.partition_key);
        fs::create_dir_all(&partition).await?;

        row.timestamp = Utc::now();
        let path = self.row_path(table, &row.partition_key, &row.row_key);
        let temp = Self::write_temp(&partition, &row).await?;

        // link fails when the target exists, so readers only ever see a whole row
        let linked = fs::hard_link(&temp, &path).await;
        if let Err(e) = fs::remove_file(&temp).await {
            warn!(path = %temp.display(), error = %e, "Failed to remove temporary row file");
        }
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StorageError::already_exists(
                table,
                &row.partition_key,
                &row.row_key,
            )),
            Err(e) => Err(StorageError::backend("insert_row", e.to_string())),
        }
    }

    async fn upsert(&self, table: &str, mut row: TableRow) -> StorageResult<()> {
        self.ensure_table(table).await?;
        row.timestamp = Utc::now();
        let path = self.row_path(table, &row.partition_key, &row.row_key);
        self.write_row_atomically(&path, &row).await
    }

    async fn replace(&self, table: &str, mut row: TableRow) -> StorageResult<()> {
        self.ensure_table(table).await?;
        let path = self.row_path(table, &row.partition_key, &row.row_key);
        if fs::metadata(&path).await.is_err() {
            return Err(StorageError::not_found(
                table,
                &row.partition_key,
                &row.row_key,
            ));
        }
        row.timestamp = Utc::now();
        self.write_row_atomically(&path, &row).await
    }

    async fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<Option<TableRow>> {
        self.ensure_table(table).await?;
        Self::read_row(&self.row_path(table, partition_key, row_key)).await
    }

    async fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> StorageResult<Vec<TableRow>> {
        self.ensure_table(table).await?;
        let dir = self.partition_dir(table, partition_key);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::backend("query_partition", e.to_string())),
        };

        let mut rows = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_row = path.extension().is_some_and(|ext| ext == ROW_EXTENSION)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_row {
                continue;
            }
            if let Some(row) = Self::read_row(&path).await? {
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| a.row_key.cmp(&b.row_key));
        Ok(rows)
    }

    async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> StorageResult<bool> {
        self.ensure_table(table).await?;
        match fs::remove_file(self.row_path(table, partition_key, row_key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::backend("delete_row", e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn row(pk: &str, rk: &str, value: &str) -> TableRow {
        let mut properties = BTreeMap::new();
        properties.insert("P0".to_string(), value.to_string());
        TableRow::new(pk, rk, properties)
    }

    async fn backend() -> (TempDir, FileSystemTableBackend) {
        let dir = TempDir::new().unwrap();
        let backend = FileSystemTableBackend::new(dir.path());
        backend.create_table_if_not_exists("jobs").await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_rows_land_at_predictable_paths() {
        let (dir, backend) = backend().await;
        backend.upsert("jobs", row("J1", "J1", "{}")).await.unwrap();
        assert!(dir.path().join("jobs/J1/J1.json").exists());
    }

    #[tokio::test]
    async fn test_insert_rejects_existing_row() {
        let (_dir, backend) = backend().await;
        backend.insert("jobs", row("J1", "J1", "a")).await.unwrap();
        let err = backend.insert("jobs", row("J1", "J1", "b")).await.unwrap_err();
        assert!(err.is_already_exists());

        let stored = backend.get("jobs", "J1", "J1").await.unwrap().unwrap();
        assert_eq!(stored.properties["P0"], "a");
    }

    #[tokio::test]
    async fn test_racing_inserts_leave_one_complete_row() {
        let (dir, backend) = backend().await;
        let backend = std::sync::Arc::new(backend);

        let inserts = (0..16).map(|i| {
            let backend = backend.clone();
            tokio::spawn(async move { backend.insert("jobs", row("J1", "J1", &format!("v{i}"))).await })
        });
        let readers = (0..16).map(|_| {
            let backend = backend.clone();
            tokio::spawn(async move { backend.get("jobs", "J1", "J1").await })
        });
        let inserts: Vec<_> = futures::future::join_all(inserts).await;
        let reads: Vec<_> = futures::future::join_all(readers).await;

        let won = inserts.iter().filter(|r| matches!(r, Ok(Ok(())))).count();
        assert_eq!(won, 1);
        for result in inserts.into_iter().map(|r| r.unwrap()) {
            if let Err(e) = result {
                assert!(e.is_already_exists());
            }
        }
        // Readers see nothing or a whole row, never a half-written one
        for read in reads {
            if let Some(stored) = read.unwrap().unwrap() {
                assert!(stored.properties["P0"].starts_with('v'));
            }
        }

        let leftovers = std::fs::read_dir(dir.path().join("jobs/J1"))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_upsert_replace_and_delete() {
        let (_dir, backend) = backend().await;
        assert!(backend.replace("jobs", row("J1", "J1", "a")).await.unwrap_err().is_not_found());

        backend.upsert("jobs", row("J1", "J1", "a")).await.unwrap();
        backend.replace("jobs", row("J1", "J1", "b")).await.unwrap();
        let stored = backend.get("jobs", "J1", "J1").await.unwrap().unwrap();
        assert_eq!(stored.properties["P0"], "b");

        assert!(backend.delete("jobs", "J1", "J1").await.unwrap());
        assert!(backend.get("jobs", "J1", "J1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_partition_skips_temporary_files() {
        let (dir, backend) = backend().await;
        backend.upsert("jobs", row("s100", "b", "2")).await.unwrap();
        backend.upsert("jobs", row("s100", "a", "1")).await.unwrap();
        std::fs::write(dir.path().join("jobs/s100/.stray.tmp"), "junk").unwrap();

        let rows = backend.query_partition("jobs", "s100").await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.row_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);

        assert!(backend.query_partition("jobs", "missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_table_is_an_error() {
        let dir = TempDir::new().unwrap();
        let backend = FileSystemTableBackend::new(dir.path());
        let err = backend.get("nope", "a", "b").await.unwrap_err();
        assert!(matches!(err, StorageError::TableNotFound { .. }));
    }
}
