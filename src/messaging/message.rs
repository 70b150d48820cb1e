//! # Build Queue Messages
//!
//! JSON messages exchanged between the orchestrator and the builders. Requests
//! travel on `{standard}-build-requests`, responses on
//! `{standard}-build-responses`.

use super::errors::{MessagingError, MessagingResult};
use crate::models::{BatchId, DataStandard, Job, JobId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte encoding of queue payloads
pub trait QueueMessage: Sized {
    fn to_bytes(&self) -> MessagingResult<Vec<u8>>;
    fn from_bytes(bytes: &[u8]) -> MessagingResult<Self>;
}

impl<T: Serialize + DeserializeOwned> QueueMessage for T {
    fn to_bytes(&self) -> MessagingResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| MessagingError::message_serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> MessagingResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| MessagingError::message_deserialization(e.to_string()))
    }
}

/// Work item for the builder pool of one data standard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub job_id: JobId,
    pub data_standard: DataStandard,
    /// When the request was dispatched
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub batch_id: BatchId,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub filter: Option<String>,
    pub correlation_id: String,
}

impl BuildRequest {
    pub fn for_job(job: &Job, correlation_id: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            data_standard: job.data_standard,
            timestamp: Utc::now(),
            batch_id: job.batch_id.clone(),
            products: job.build_products().to_vec(),
            filter: job.requested_filter.clone(),
            correlation_id: correlation_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitCode {
    Success,
    Failed,
}

impl ExitCode {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Builder outcome for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResponse {
    pub job_id: JobId,
    pub data_standard: DataStandard,
    pub exit_code: ExitCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
}

impl BuildResponse {
    pub fn success(request: &BuildRequest, batch_id: BatchId) -> Self {
        Self {
            job_id: request.job_id.clone(),
            data_standard: request.data_standard,
            exit_code: ExitCode::Success,
            batch_id: batch_id.into_option(),
        }
    }

    pub fn failed(request: &BuildRequest, batch_id: BatchId) -> Self {
        Self {
            job_id: request.job_id.clone(),
            data_standard: request.data_standard,
            exit_code: ExitCode::Failed,
            batch_id: batch_id.into_option(),
        }
    }
}
