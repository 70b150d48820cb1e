//! # Job Model
//!
//! One job exists per accepted logical request. A job's `(JobState, BuildState)`
//! pair is private to this module and only changes through the named signals of
//! [`JobBuildStateMachine`](crate::state_machine::JobBuildStateMachine).
//!
//! A request that has not been persisted yet is a [`NewJob`]; it carries no state
//! pair at all, which is how the state machine tells "never persisted" apart from
//! every persisted pair.

use super::{BatchId, DataStandard, ExchangeSetRequest, JobId};
use crate::state_machine::states::{BuildState, JobState, StatePair};
use crate::storage::TableEntity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job that has not been through any state transition yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub id: JobId,
    pub timestamp: DateTime<Utc>,
    pub data_standard: DataStandard,
    pub data_standard_timestamp: Option<DateTime<Utc>>,
    pub requested_products: Vec<String>,
    pub requested_filter: Option<String>,
    /// Products the catalogue resolved the request to
    pub catalogue_products: Vec<String>,
    pub callback_uri: Option<String>,
    pub batch_id: BatchId,
    pub duplicate_of: Option<JobId>,
}

impl NewJob {
    pub fn from_request(id: JobId, request: &ExchangeSetRequest) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            data_standard: request.data_standard,
            data_standard_timestamp: None,
            requested_products: request.products.clone(),
            requested_filter: request.filter.clone(),
            catalogue_products: Vec::new(),
            callback_uri: request.callback_uri.clone(),
            batch_id: BatchId::none(),
            duplicate_of: None,
        }
    }

    pub fn build_products(&self) -> &[String] {
        build_products(&self.catalogue_products, &self.requested_products)
    }

    pub(crate) fn into_job(self, pair: StatePair) -> Job {
        Job {
            id: self.id,
            timestamp: self.timestamp,
            data_standard_timestamp: self.data_standard_timestamp,
            data_standard: self.data_standard,
            job_state: pair.job,
            build_state: pair.build,
            requested_products: self.requested_products,
            requested_filter: self.requested_filter,
            catalogue_products: self.catalogue_products,
            batch_id: self.batch_id,
            callback_uri: self.callback_uri,
            duplicate_of: self.duplicate_of,
        }
    }
}

fn build_products<'a>(catalogue: &'a [String], requested: &'a [String]) -> &'a [String] {
    if catalogue.is_empty() {
        requested
    } else {
        catalogue
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data_standard_timestamp: Option<DateTime<Utc>>,
    pub data_standard: DataStandard,
    job_state: JobState,
    build_state: BuildState,
    #[serde(default)]
    pub requested_products: Vec<String>,
    #[serde(default)]
    pub requested_filter: Option<String>,
    #[serde(default)]
    pub catalogue_products: Vec<String>,
    #[serde(default)]
    pub batch_id: BatchId,
    #[serde(default)]
    pub callback_uri: Option<String>,
    /// Job that owns the build this job was deduplicated against
    #[serde(default)]
    pub duplicate_of: Option<JobId>,
}

impl Job {
    pub fn job_state(&self) -> JobState {
        self.job_state
    }

    pub fn build_state(&self) -> BuildState {
        self.build_state
    }

    pub fn state_pair(&self) -> StatePair {
        StatePair::new(self.job_state, self.build_state)
    }

    /// Products the builder packages: the catalogue's resolution when there is one
    pub fn build_products(&self) -> &[String] {
        build_products(&self.catalogue_products, &self.requested_products)
    }

    pub fn is_terminal(&self) -> bool {
        self.job_state.is_terminal()
    }

    pub(crate) fn set_state_pair(&mut self, pair: StatePair) {
        self.job_state = pair.job;
        self.build_state = pair.build;
    }
}

impl TableEntity for Job {
    fn partition_key(&self) -> String {
        self.id.to_string()
    }

    fn row_key(&self) -> String {
        self.id.to_string()
    }
}
