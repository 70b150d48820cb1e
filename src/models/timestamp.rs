use super::{DataStandard, JobId};
use crate::storage::TableEntity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest catalogue timestamp covered by a successful build, per data standard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardTimestamp {
    pub data_standard: DataStandard,
    pub timestamp: DateTime<Utc>,
    pub job_id: JobId,
    pub updated_at: DateTime<Utc>,
}

impl StandardTimestamp {
    pub fn new(data_standard: DataStandard, timestamp: DateTime<Utc>, job_id: JobId) -> Self {
        Self {
            data_standard,
            timestamp,
            job_id,
            updated_at: Utc::now(),
        }
    }
}

impl TableEntity for StandardTimestamp {
    fn partition_key(&self) -> String {
        self.data_standard.to_string()
    }

    fn row_key(&self) -> String {
        self.data_standard.to_string()
    }
}
