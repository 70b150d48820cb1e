//! # Caller Callbacks
//!
//! Notifies the caller's callback URI once a job has completed. A failed
//! notification is reported back to completion, which marks the job
//! `(Failed, Succeeded)`.

use super::errors::{ServiceError, ServiceResult};
use super::retry::RetryPolicy;
use crate::config::CallbackConfig;
use crate::models::{BatchId, DataStandard, Job, JobId};
use crate::state_machine::{BuildState, JobState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, instrument};

const SERVICE: &str = "callback";

/// Job summary posted to the callback URI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub job_id: JobId,
    pub data_standard: DataStandard,
    pub job_state: JobState,
    pub build_state: BuildState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<JobId>,
}

impl From<&Job> for CallbackPayload {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            data_standard: job.data_standard,
            job_state: job.job_state(),
            build_state: job.build_state(),
            batch_id: job.batch_id.clone().into_option(),
            duplicate_of: job.duplicate_of.clone(),
        }
    }
}

#[async_trait]
pub trait CallbackNotifier: Send + Sync + Debug {
    async fn notify(&self, callback_uri: &str, payload: &CallbackPayload) -> ServiceResult<()>;
}

/// Posts the payload as JSON through the retry policy
#[derive(Debug, Clone)]
pub struct HttpCallbackNotifier {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpCallbackNotifier {
    pub fn new(config: &CallbackConfig, retry: RetryPolicy) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ServiceError::other(SERVICE, e.to_string()))?;
        Ok(Self { client, retry })
    }

    async fn post_once(&self, callback_uri: &str, payload: &CallbackPayload) -> ServiceResult<()> {
        let response = self
            .client
            .post(callback_uri)
            .json(payload)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ServiceError::http_status(SERVICE, status.as_u16(), body));
        }
        Ok(())
    }
}

#[async_trait]
impl CallbackNotifier for HttpCallbackNotifier {
    #[instrument(skip(self, payload), fields(job_id = %payload.job_id))]
    async fn notify(&self, callback_uri: &str, payload: &CallbackPayload) -> ServiceResult<()> {
        self.retry
            .execute("notify_callback", || self.post_once(callback_uri, payload))
            .await?;
        debug!(callback_uri, "📣 Callback delivered");
        Ok(())
    }
}
