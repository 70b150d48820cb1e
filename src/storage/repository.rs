//! # Entity Store
//!
//! Typed CRUD over one table. Entities go through the
//! [`ChunkedEntityCodec`](super::ChunkedEntityCodec) on the way in and out, and
//! their keys are sanitized before they reach the backend.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use super::backend::{TableBackend, TableRow};
use super::codec::ChunkedEntityCodec;
use super::errors::{StorageError, StorageResult};
use super::keys::checked_key;

/// A record addressable by partition and row key
pub trait TableEntity: Serialize + DeserializeOwned + Send + Sync {
    fn partition_key(&self) -> String;
    fn row_key(&self) -> String;
}

pub struct EntityStore<T> {
    backend: Arc<dyn TableBackend>,
    table: String,
    codec: ChunkedEntityCodec,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for EntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            table: self.table.clone(),
            codec: self.codec,
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Debug for EntityStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("table", &self.table)
            .field("backend", &self.backend.provider_name())
            .field("codec", &self.codec)
            .finish()
    }
}

impl<T: TableEntity> EntityStore<T> {
    pub fn new(
        backend: Arc<dyn TableBackend>,
        table: impl Into<String>,
        codec: ChunkedEntityCodec,
    ) -> Self {
        Self {
            backend,
            table: table.into(),
            codec,
            _entity: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn create_if_not_exists(&self) -> StorageResult<()> {
        self.backend.create_table_if_not_exists(&self.table).await
    }

    /// Insert a new entity; fails with `AlreadyExists` when the key is taken
    #[instrument(skip(self, entity), fields(table = %self.table))]
    pub async fn add(&self, entity: &T) -> StorageResult<()> {
        let row = self.to_row(entity)?;
        debug!(partition_key = %row.partition_key, row_key = %row.row_key, "Adding entity");
        self.backend.insert(&self.table, row).await
    }

    /// Insert or fully replace an entity
    #[instrument(skip(self, entity), fields(table = %self.table))]
    pub async fn upsert(&self, entity: &T) -> StorageResult<()> {
        let row = self.to_row(entity)?;
        debug!(partition_key = %row.partition_key, row_key = %row.row_key, "Upserting entity");
        self.backend.upsert(&self.table, row).await
    }

    /// Replace an existing entity; fails with `NotFound` when absent
    #[instrument(skip(self, entity), fields(table = %self.table))]
    pub async fn update(&self, entity: &T) -> StorageResult<()> {
        let row = self.to_row(entity)?;
        self.backend.replace(&self.table, row).await
    }

    pub async fn get(&self, partition_key: &str, row_key: &str) -> StorageResult<Option<T>> {
        let partition_key = checked_key(partition_key)?;
        let row_key = checked_key(row_key)?;
        match self
            .backend
            .get(&self.table, &partition_key, &row_key)
            .await?
        {
            Some(row) => Ok(Some(self.from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but absent entities are a `NotFound` error
    pub async fn get_required(&self, partition_key: &str, row_key: &str) -> StorageResult<T> {
        self.get(partition_key, row_key).await?.ok_or_else(|| {
            StorageError::not_found(&self.table, partition_key, row_key)
        })
    }

    pub async fn list_by_partition(&self, partition_key: &str) -> StorageResult<Vec<T>> {
        let partition_key = checked_key(partition_key)?;
        let rows = self
            .backend
            .query_partition(&self.table, &partition_key)
            .await?;
        rows.iter().map(|row| self.from_row(row)).collect()
    }

    /// Delete an entity, returning whether it existed
    pub async fn delete(&self, partition_key: &str, row_key: &str) -> StorageResult<bool> {
        let partition_key = checked_key(partition_key)?;
        let row_key = checked_key(row_key)?;
        self.backend
            .delete(&self.table, &partition_key, &row_key)
            .await
    }

    fn to_row(&self, entity: &T) -> StorageResult<TableRow> {
        let partition_key = checked_key(&entity.partition_key())?;
        let row_key = checked_key(&entity.row_key())?;
        let properties = self.codec.encode(entity)?;
        Ok(TableRow::new(partition_key, row_key, properties))
    }

    fn from_row(&self, row: &TableRow) -> StorageResult<T> {
        Ok(self.codec.decode(&row.properties)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChunkLayout, CodecError, InMemoryTableBackend};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        group: String,
        name: String,
        body: String,
    }

    impl TableEntity for Widget {
        fn partition_key(&self) -> String {
            self.group.clone()
        }

        fn row_key(&self) -> String {
            self.name.clone()
        }
    }

    fn widget(group: &str, name: &str, body: &str) -> Widget {
        Widget {
            group: group.to_string(),
            name: name.to_string(),
            body: body.to_string(),
        }
    }

    async fn store() -> EntityStore<Widget> {
        let store = EntityStore::new(
            Arc::new(InMemoryTableBackend::new()),
            "widgets",
            ChunkedEntityCodec::default(),
        );
        store.create_if_not_exists().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_add_get_and_conflict() {
        let store = store().await;
        let w = widget("g", "w1", "hello");

        store.add(&w).await.unwrap();
        assert_eq!(store.get("g", "w1").await.unwrap(), Some(w.clone()));
        assert!(store.add(&w).await.unwrap_err().is_already_exists());
    }

    #[tokio::test]
    async fn test_update_requires_existing_entity() {
        let store = store().await;
        let w = widget("g", "w1", "hello");
        assert!(store.update(&w).await.unwrap_err().is_not_found());

        store.upsert(&w).await.unwrap();
        let changed = widget("g", "w1", "changed");
        store.update(&changed).await.unwrap();
        assert_eq!(store.get_required("g", "w1").await.unwrap(), changed);
    }

    #[tokio::test]
    async fn test_keys_are_sanitized_consistently() {
        let store = store().await;
        let w = widget(" a/b ", "c d", "x");
        store.upsert(&w).await.unwrap();

        assert_eq!(store.get("a_b", "c_d").await.unwrap(), Some(w.clone()));
        assert_eq!(store.get(" a/b", "c d ").await.unwrap(), Some(w));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = store().await;
        store.upsert(&widget("g", "w2", "2")).await.unwrap();
        store.upsert(&widget("g", "w1", "1")).await.unwrap();
        store.upsert(&widget("h", "w1", "3")).await.unwrap();

        let listed = store.list_by_partition("g").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "w1");

        assert!(store.delete("g", "w1").await.unwrap());
        assert!(store.get("g", "w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_large_entity_spans_slots_and_oversized_is_rejected() {
        let backend = Arc::new(InMemoryTableBackend::new());
        let codec = ChunkedEntityCodec::new(ChunkLayout::new(3, 64).unwrap());
        let store: EntityStore<Widget> = EntityStore::new(backend, "widgets", codec);
        store.create_if_not_exists().await.unwrap();

        let big = widget("g", "w", &"x".repeat(120));
        store.upsert(&big).await.unwrap();
        assert_eq!(store.get("g", "w").await.unwrap(), Some(big));

        let too_big = widget("g", "w2", &"x".repeat(500));
        let err = store.upsert(&too_big).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Codec(CodecError::EntityTooLarge { .. })
        ));
        assert!(store.get("g", "w2").await.unwrap().is_none());
    }
}
