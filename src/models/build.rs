use super::{BatchId, DataStandard, JobId};
use crate::storage::TableEntity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build attempt for a job
///
/// `metadata` belongs to the builder; the orchestrator only persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub job_id: JobId,
    pub data_standard: DataStandard,
    #[serde(default)]
    pub batch_id: BatchId,
    /// Fingerprint discriminant of the inputs this build was scheduled for
    #[serde(default)]
    pub discriminant: Option<String>,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Set once every post-build step of a successful build has run
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Build {
    pub fn new(job_id: JobId, data_standard: DataStandard) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            data_standard,
            batch_id: BatchId::none(),
            discriminant: None,
            products: Vec::new(),
            filter: None,
            metadata: serde_json::Value::Null,
            finalized_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl TableEntity for Build {
    fn partition_key(&self) -> String {
        self.job_id.to_string()
    }

    fn row_key(&self) -> String {
        self.job_id.to_string()
    }
}
