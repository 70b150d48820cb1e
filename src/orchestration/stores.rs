//! Table wiring shared by the orchestrators.

use crate::config::{ConfigResult, StorageBackendKind, StorageConfig};
use crate::models::{Build, BuildFingerprint, Job, StandardTimestamp};
use crate::storage::{
    ChunkedEntityCodec, EntityStore, FileSystemTableBackend, InMemoryTableBackend, StorageResult,
    TableBackend,
};
use std::sync::Arc;
use tracing::info;

/// Build the table backend named by the storage configuration
pub fn table_backend(config: &StorageConfig) -> Arc<dyn TableBackend> {
    match config.backend {
        StorageBackendKind::InMemory => Arc::new(InMemoryTableBackend::new()),
        StorageBackendKind::FileSystem => Arc::new(FileSystemTableBackend::new(config.root_path.clone())),
    }
}

/// The four tables the orchestrator owns
#[derive(Debug, Clone)]
pub struct OrchestratorStores {
    pub jobs: EntityStore<Job>,
    pub builds: EntityStore<Build>,
    pub fingerprints: EntityStore<BuildFingerprint>,
    pub timestamps: EntityStore<StandardTimestamp>,
}

impl OrchestratorStores {
    pub fn new(backend: Arc<dyn TableBackend>, config: &StorageConfig) -> ConfigResult<Self> {
        let codec = ChunkedEntityCodec::new(config.chunk_layout()?);
        Ok(Self {
            jobs: EntityStore::new(backend.clone(), &config.jobs_table, codec),
            builds: EntityStore::new(backend.clone(), &config.builds_table, codec),
            fingerprints: EntityStore::new(backend.clone(), &config.fingerprints_table, codec),
            timestamps: EntityStore::new(backend, &config.timestamps_table, codec),
        })
    }

    /// Idempotent table bootstrap
    pub async fn create_tables(&self) -> StorageResult<()> {
        self.jobs.create_if_not_exists().await?;
        self.builds.create_if_not_exists().await?;
        self.fingerprints.create_if_not_exists().await?;
        self.timestamps.create_if_not_exists().await?;
        info!(
            jobs = self.jobs.table(),
            builds = self.builds.table(),
            fingerprints = self.fingerprints.table(),
            timestamps = self.timestamps.table(),
            "🗄️ Orchestrator tables ready"
        );
        Ok(())
    }
}
