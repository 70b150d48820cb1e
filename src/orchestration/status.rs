//! Read-only job and build lookups for status endpoints and callers.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{Build, DataStandard, Job, JobId, StandardTimestamp};
use crate::state_machine::StatePair;
use crate::storage::EntityStore;
use serde::{Deserialize, Serialize};

/// Status view of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    pub data_standard: DataStandard,
    pub state: StatePair,
    pub batch_id: Option<String>,
    pub duplicate_of: Option<JobId>,
}

impl From<&Job> for JobStatus {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            data_standard: job.data_standard,
            state: job.state_pair(),
            batch_id: job.batch_id.clone().into_option().map(|b| b.to_string()),
            duplicate_of: job.duplicate_of.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobStatusReader {
    jobs: EntityStore<Job>,
    builds: EntityStore<Build>,
    timestamps: EntityStore<StandardTimestamp>,
}

impl JobStatusReader {
    pub fn new(
        jobs: EntityStore<Job>,
        builds: EntityStore<Build>,
        timestamps: EntityStore<StandardTimestamp>,
    ) -> Self {
        Self {
            jobs,
            builds,
            timestamps,
        }
    }

    pub async fn get_job(&self, job_id: &JobId) -> OrchestratorResult<Job> {
        self.jobs
            .get(job_id.as_str(), job_id.as_str())
            .await?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))
    }

    pub async fn get_status(&self, job_id: &JobId) -> OrchestratorResult<JobStatus> {
        Ok(JobStatus::from(&self.get_job(job_id).await?))
    }

    /// The build record of a job; duplicate and up-to-date jobs have none
    pub async fn get_build(
        &self,
        job_id: &JobId,
        data_standard: DataStandard,
    ) -> OrchestratorResult<Build> {
        self.builds
            .get(job_id.as_str(), job_id.as_str())
            .await?
            .filter(|build| build.data_standard == data_standard)
            .ok_or_else(|| OrchestratorError::BuildNotFound {
                job_id: job_id.to_string(),
                data_standard: data_standard.to_string(),
            })
    }

    /// Newest catalogue timestamp with a successful build, if any
    pub async fn latest_timestamp(
        &self,
        data_standard: DataStandard,
    ) -> OrchestratorResult<Option<StandardTimestamp>> {
        let key = data_standard.as_str();
        Ok(self.timestamps.get(key, key).await?)
    }
}
