use super::{BatchId, DataStandard, JobId};
use crate::storage::TableEntity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claim on a set of logical build inputs
///
/// Stored under `(data_standard, discriminant)`. The job it names owns the one
/// build allowed for those inputs; later equivalent requests are deduplicated
/// against that job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFingerprint {
    pub job_id: JobId,
    pub discriminant: String,
    #[serde(default)]
    pub batch_id: BatchId,
    pub data_standard: DataStandard,
    /// Catalogue freshness timestamp the discriminant was computed over
    pub timestamp: DateTime<Utc>,
    pub claimed_at: DateTime<Utc>,
}

impl BuildFingerprint {
    pub fn new(
        job_id: JobId,
        data_standard: DataStandard,
        discriminant: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            discriminant: discriminant.into(),
            batch_id: BatchId::none(),
            data_standard,
            timestamp,
            claimed_at: Utc::now(),
        }
    }

    /// Whether a build made at this fingerprint's timestamp still reflects `catalogue_timestamp`
    pub fn is_fresh_for(&self, catalogue_timestamp: DateTime<Utc>) -> bool {
        self.timestamp >= catalogue_timestamp
    }
}

impl TableEntity for BuildFingerprint {
    fn partition_key(&self) -> String {
        self.data_standard.to_string()
    }

    fn row_key(&self) -> String {
        self.discriminant.clone()
    }
}
