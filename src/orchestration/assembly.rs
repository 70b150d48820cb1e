//! # Assembly Orchestrator
//!
//! Decides whether a request needs a build and, when it does, dispatches one.
//!
//! The workflow is a pipeline tree:
//!
//! ```text
//! assembly
//! ├── query-catalogue     freshness timestamp for the requested products
//! ├── claim-fingerprint   insert-if-absent claim on (standard, discriminant)
//! ├── record-job          persist Job (+ Build) through the state machine
//! └── dispatch-build      enqueue BuildRequest, then (Submitted, Scheduled)
//! ```
//!
//! When the claim already belongs to another job, that job decides the outcome:
//!
//! | owner                                   | new job                     |
//! |-----------------------------------------|-----------------------------|
//! | build succeeded, fingerprint still fresh | `(UpToDate, None)`, owner's batch |
//! | created or submitted                    | `(Duplicate, NotScheduled)` |
//! | claimed moments ago, job not yet recorded | `(Duplicate, NotScheduled)` |
//! | failed without a build, stale or missing | takes over the claim, builds |
//!
//! Any failure along the way ends with `(Failed, None)`; the job is always
//! persisted before [`AssemblyOrchestrator::assemble`] returns. A fingerprint
//! claimed by the failed job is released first, so the next equivalent request
//! builds instead of deduplicating against a job that will never produce one.

use crate::clients::{CatalogueSnapshot, RetryPolicy, SalesCatalogueClient};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::fingerprint::{ClaimResult, FingerprintInputs, FingerprintService};
use crate::messaging::{BuildDispatchQueue, BuildRequest};
use crate::models::{
    BatchId, Build, BuildFingerprint, ExchangeSetRequest, Job, JobId, NewJob,
};
use crate::pipeline::{Node, NodeResult, PipelineError, PipelineNode, PipelineResult};
use crate::state_machine::{AssemblyErrorSubject, BuildState, JobBuildStateMachine};
use crate::storage::EntityStore;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// How long a claim whose owner job is not persisted yet still counts as in flight
fn unrecorded_owner_grace() -> chrono::Duration {
    chrono::Duration::minutes(5)
}

/// How assembly resolved a request
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyDecision {
    /// A build request was enqueued for this job
    BuildScheduled,
    /// An equivalent build owned by `of` is in flight
    Duplicate { of: JobId },
    /// The build owned by `of` is still fresh
    UpToDate { of: JobId, batch_id: BatchId },
    /// Assembly failed; the job is `(Failed, None)`
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct AssemblyResult {
    pub job: Job,
    pub decision: AssemblyDecision,
}

/// Decision reached by the claim step, before anything is persisted
#[derive(Debug, Clone, PartialEq)]
enum ClaimOutcome {
    BuildRequired,
    Duplicate { of: JobId },
    UpToDate { of: JobId, batch_id: BatchId },
}

#[derive(Debug, Default)]
struct AssemblyProgress {
    new_job: Option<NewJob>,
    job: Option<Job>,
    snapshot: Option<CatalogueSnapshot>,
    fingerprint: Option<BuildFingerprint>,
    outcome: Option<ClaimOutcome>,
}

/// Shared state of one assembly run
pub struct AssemblyContext {
    request: ExchangeSetRequest,
    correlation_id: String,
    progress: Mutex<AssemblyProgress>,
}

impl AssemblyContext {
    fn new(new_job: NewJob, request: ExchangeSetRequest, correlation_id: String) -> Self {
        Self {
            request,
            correlation_id,
            progress: Mutex::new(AssemblyProgress {
                new_job: Some(new_job),
                ..AssemblyProgress::default()
            }),
        }
    }

    fn outcome(&self) -> Option<ClaimOutcome> {
        self.progress.lock().outcome.clone()
    }

    fn job(&self) -> Option<Job> {
        self.progress.lock().job.clone()
    }

    /// The claim this run holds, when it claimed or took over the fingerprint
    fn owned_fingerprint(&self) -> Option<BuildFingerprint> {
        let progress = self.progress.lock();
        match progress.outcome {
            Some(ClaimOutcome::BuildRequired) => progress.fingerprint.clone(),
            _ => None,
        }
    }

    /// Whatever should receive the assembly error
    fn error_subject(&self) -> Option<AssemblyErrorSubject> {
        let mut progress = self.progress.lock();
        if let Some(job) = progress.job.take() {
            return Some(job.into());
        }
        progress.new_job.take().map(Into::into)
    }
}

struct AssemblyServices {
    catalogue: Arc<dyn SalesCatalogueClient>,
    retry: RetryPolicy,
    fingerprints: FingerprintService,
    state_machine: JobBuildStateMachine,
    builds: EntityStore<Build>,
    dispatch: BuildDispatchQueue,
}

struct QueryCatalogueNode(Arc<AssemblyServices>);
struct ClaimFingerprintNode(Arc<AssemblyServices>);
struct RecordJobNode(Arc<AssemblyServices>);
struct DispatchBuildNode(Arc<AssemblyServices>);

#[async_trait]
impl Node<AssemblyContext> for QueryCatalogueNode {
    fn name(&self) -> &str {
        "query-catalogue"
    }

    async fn execute(&self, context: &AssemblyContext) -> PipelineResult<NodeResult> {
        let request = &context.request;
        let snapshot = self
            .0
            .retry
            .execute("get_products", || {
                self.0.catalogue.get_products(
                    request.data_standard,
                    &request.products,
                    request.filter.as_deref(),
                )
            })
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;

        let timestamp = snapshot.freshness_timestamp;
        let mut progress = context.progress.lock();
        if let Some(new_job) = progress.new_job.as_mut() {
            new_job.data_standard_timestamp = Some(timestamp);
            new_job.catalogue_products = snapshot.products.clone();
        }
        progress.snapshot = Some(snapshot);
        Ok(NodeResult::succeeded_with(timestamp.to_rfc3339()))
    }
}

impl ClaimFingerprintNode {
    /// Resolve a claim held by another job
    async fn resolve_existing(
        &self,
        existing: BuildFingerprint,
        candidate: &BuildFingerprint,
    ) -> PipelineResult<ClaimOutcome> {
        let owner = self
            .0
            .state_machine
            .jobs()
            .get(existing.job_id.as_str(), existing.job_id.as_str())
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;

        match owner {
            Some(owner)
                if owner.build_state() == BuildState::Succeeded
                    && existing.is_fresh_for(candidate.timestamp) =>
            {
                let batch_id = if existing.batch_id.is_none() {
                    owner.batch_id.clone()
                } else {
                    existing.batch_id.clone()
                };
                Ok(ClaimOutcome::UpToDate {
                    of: owner.id,
                    batch_id,
                })
            }
            Some(owner) if owner.job_state().is_in_flight() => {
                Ok(ClaimOutcome::Duplicate { of: owner.id })
            }
            // The owner claimed first and is still recording its job
            None if Utc::now() - existing.claimed_at < unrecorded_owner_grace() => {
                Ok(ClaimOutcome::Duplicate {
                    of: existing.job_id,
                })
            }
            owner => {
                info!(
                    job_id = %candidate.job_id,
                    previous_owner = %existing.job_id,
                    owner_state = ?owner.as_ref().map(Job::state_pair),
                    "Previous owner cannot provide the build; taking over fingerprint"
                );
                self.0
                    .fingerprints
                    .take_over(candidate)
                    .await
                    .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;
                Ok(ClaimOutcome::BuildRequired)
            }
        }
    }
}

#[async_trait]
impl Node<AssemblyContext> for ClaimFingerprintNode {
    fn name(&self) -> &str {
        "claim-fingerprint"
    }

    async fn execute(&self, context: &AssemblyContext) -> PipelineResult<NodeResult> {
        let (job_id, catalogue_timestamp) = {
            let progress = context.progress.lock();
            let job_id = progress
                .new_job
                .as_ref()
                .map(|j| j.id.clone())
                .ok_or_else(|| PipelineError::invalid_context(self.name(), "job already recorded"))?;
            let timestamp = progress
                .snapshot
                .as_ref()
                .map(|s| s.freshness_timestamp)
                .ok_or_else(|| PipelineError::invalid_context(self.name(), "catalogue not queried"))?;
            (job_id, timestamp)
        };

        let request = &context.request;
        let discriminant = FingerprintService::discriminant(FingerprintInputs {
            data_standard: request.data_standard,
            products: &request.products,
            filter: request.filter.as_deref(),
            catalogue_timestamp,
        });
        let candidate = BuildFingerprint::new(
            job_id,
            request.data_standard,
            discriminant,
            catalogue_timestamp,
        );

        let claim = self
            .0
            .fingerprints
            .claim(&candidate)
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;

        let outcome = match claim {
            ClaimResult::Claimed => ClaimOutcome::BuildRequired,
            ClaimResult::Exists(existing) => self.resolve_existing(*existing, &candidate).await?,
        };

        let mut progress = context.progress.lock();
        progress.fingerprint = Some(candidate);
        progress.outcome = Some(outcome.clone());
        Ok(NodeResult::succeeded_with(format!("{outcome:?}")))
    }
}

#[async_trait]
impl Node<AssemblyContext> for RecordJobNode {
    fn name(&self) -> &str {
        "record-job"
    }

    async fn execute(&self, context: &AssemblyContext) -> PipelineResult<NodeResult> {
        let (new_job, outcome, fingerprint) = {
            let progress = context.progress.lock();
            (
                progress.new_job.clone(),
                progress.outcome.clone(),
                progress.fingerprint.clone(),
            )
        };
        let mut new_job =
            new_job.ok_or_else(|| PipelineError::invalid_context(self.name(), "job already recorded"))?;
        let outcome =
            outcome.ok_or_else(|| PipelineError::invalid_context(self.name(), "no claim decision"))?;
        let node_error = |e: &dyn std::fmt::Display| PipelineError::node("record-job", e.to_string());

        let job = match outcome {
            ClaimOutcome::BuildRequired => {
                let mut build = Build::new(new_job.id.clone(), new_job.data_standard);
                build.discriminant = fingerprint.map(|f| f.discriminant);
                build.products = new_job.build_products().to_vec();
                build.filter = new_job.requested_filter.clone();
                self.0.builds.upsert(&build).await.map_err(|e| node_error(&e))?;

                self.0
                    .state_machine
                    .signal_build_required(new_job)
                    .await
                    .map_err(|e| node_error(&e))?
            }
            ClaimOutcome::Duplicate { of } => {
                new_job.duplicate_of = Some(of);
                self.0
                    .state_machine
                    .signal_build_duplicated(new_job)
                    .await
                    .map_err(|e| node_error(&e))?
            }
            ClaimOutcome::UpToDate { of, batch_id } => {
                new_job.duplicate_of = Some(of);
                new_job.batch_id = batch_id;
                self.0
                    .state_machine
                    .signal_no_build_required(new_job)
                    .await
                    .map_err(|e| node_error(&e))?
            }
        };

        let pair = job.state_pair();
        let mut progress = context.progress.lock();
        progress.new_job = None;
        progress.job = Some(job);
        Ok(NodeResult::succeeded_with(pair.to_string()))
    }
}

#[async_trait]
impl Node<AssemblyContext> for DispatchBuildNode {
    fn name(&self) -> &str {
        "dispatch-build"
    }

    async fn execute(&self, context: &AssemblyContext) -> PipelineResult<NodeResult> {
        let mut job = context
            .job()
            .ok_or_else(|| PipelineError::invalid_context(self.name(), "job not recorded"))?;

        let request = BuildRequest::for_job(&job, context.correlation_id.clone());
        let message_id = self
            .0
            .dispatch
            .enqueue_request(&request)
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;

        let scheduled = self.0.state_machine.signal_build_scheduled(&mut job).await;
        // Keep whichever version of the job is persisted
        context.progress.lock().job = Some(job);
        scheduled.map_err(|e| PipelineError::node(self.name(), e.to_string()))?;

        Ok(NodeResult::succeeded_with(message_id.to_string()))
    }
}

/// Entry point for accepted requests
pub struct AssemblyOrchestrator {
    services: Arc<AssemblyServices>,
    pipeline: PipelineNode<AssemblyContext>,
}

impl std::fmt::Debug for AssemblyOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblyOrchestrator")
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl AssemblyOrchestrator {
    pub fn new(
        catalogue: Arc<dyn SalesCatalogueClient>,
        retry: RetryPolicy,
        fingerprints: FingerprintService,
        state_machine: JobBuildStateMachine,
        builds: EntityStore<Build>,
        dispatch: BuildDispatchQueue,
    ) -> Self {
        let services = Arc::new(AssemblyServices {
            catalogue,
            retry,
            fingerprints,
            state_machine,
            builds,
            dispatch,
        });

        let pipeline = PipelineNode::composite("assembly")
            .child(PipelineNode::leaf(QueryCatalogueNode(services.clone())))
            .child(PipelineNode::leaf(ClaimFingerprintNode(services.clone())))
            .child(PipelineNode::leaf(RecordJobNode(services.clone())))
            .child(
                PipelineNode::leaf(DispatchBuildNode(services.clone())).with_predicate(
                    |context: &AssemblyContext| {
                        context.outcome() == Some(ClaimOutcome::BuildRequired)
                    },
                ),
            );

        Self { services, pipeline }
    }

    /// Assemble `request` under `job_id`
    ///
    /// Returns an error only for invalid requests and when the job could not be
    /// persisted at all; every other failure yields a `(Failed, None)` job.
    #[instrument(skip_all, fields(job_id = %job_id, data_standard = %request.data_standard, correlation_id))]
    pub async fn assemble(
        &self,
        job_id: JobId,
        request: ExchangeSetRequest,
        correlation_id: &str,
    ) -> OrchestratorResult<AssemblyResult> {
        let request = request.normalized()?;
        let new_job = NewJob::from_request(job_id, &request);
        let context = AssemblyContext::new(new_job, request, correlation_id.to_string());

        let failure = match self.pipeline.execute(&context).await {
            Ok(result) if !result.is_failed() => None,
            Ok(result) => Some(format!(
                "{} ({})",
                result.error.unwrap_or_else(|| "assembly failed".to_string()),
                result.failed_nodes.join(", ")
            )),
            Err(e) => Some(e.to_string()),
        };

        if let Some(reason) = failure {
            return self.fail(&context, reason).await;
        }

        let job = context
            .job()
            .ok_or_else(|| OrchestratorError::internal("assembly finished without a job"))?;
        let decision = match context.outcome() {
            Some(ClaimOutcome::BuildRequired) => AssemblyDecision::BuildScheduled,
            Some(ClaimOutcome::Duplicate { of }) => AssemblyDecision::Duplicate { of },
            Some(ClaimOutcome::UpToDate { of, batch_id }) => AssemblyDecision::UpToDate { of, batch_id },
            None => return Err(OrchestratorError::internal("assembly finished without a decision")),
        };

        info!(state = %job.state_pair(), ?decision, "🧩 Assembly finished");
        Ok(AssemblyResult { job, decision })
    }

    async fn fail(&self, context: &AssemblyContext, reason: String) -> OrchestratorResult<AssemblyResult> {
        warn!(reason = %reason, "❌ Assembly failed");
        self.release_claim(context).await;
        let subject = context
            .error_subject()
            .ok_or_else(|| OrchestratorError::internal("assembly lost its job"))?;
        let job = self.services.state_machine.signal_assembly_error(subject).await?;
        Ok(AssemblyResult {
            job,
            decision: AssemblyDecision::Failed { reason },
        })
    }

    async fn release_claim(&self, context: &AssemblyContext) {
        let Some(fingerprint) = context.owned_fingerprint() else {
            return;
        };
        if let Err(e) = self
            .services
            .fingerprints
            .release(
                fingerprint.data_standard,
                &fingerprint.discriminant,
                &fingerprint.job_id,
            )
            .await
        {
            warn!(
                discriminant = %fingerprint.discriminant,
                error = %e,
                "Could not release fingerprint of failed assembly"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ServiceError, ServiceResult};
    use crate::config::QueuesConfig;
    use crate::messaging::{InMemoryMessagingService, MessagingService, QueueMessage};
    use crate::models::DataStandard;
    use crate::state_machine::StatePair;
    use crate::storage::{
        ChunkedEntityCodec, InMemoryTableBackend, StorageError, StorageResult, TableBackend,
        TableRow,
    };
    use chrono::{DateTime, TimeZone, Utc};

    #[derive(Debug)]
    struct FixedCatalogue {
        timestamp: Option<DateTime<Utc>>,
    }

    /// In-memory tables whose job writes fail for one job id
    #[derive(Debug)]
    struct JobWritesFailFor {
        inner: InMemoryTableBackend,
        job_id: &'static str,
    }

    impl JobWritesFailFor {
        fn check(&self, table: &str, row: &TableRow) -> StorageResult<()> {
            if table == "jobs" && row.partition_key == self.job_id {
                return Err(StorageError::backend("write_row", "disk unavailable"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TableBackend for JobWritesFailFor {
        fn provider_name(&self) -> &'static str {
            "job_writes_fail"
        }

        async fn create_table_if_not_exists(&self, table: &str) -> StorageResult<()> {
            self.inner.create_table_if_not_exists(table).await
        }

        async fn insert(&self, table: &str, row: TableRow) -> StorageResult<()> {
            self.check(table, &row)?;
            self.inner.insert(table, row).await
        }

        async fn upsert(&self, table: &str, row: TableRow) -> StorageResult<()> {
            self.check(table, &row)?;
            self.inner.upsert(table, row).await
        }

        async fn replace(&self, table: &str, row: TableRow) -> StorageResult<()> {
            self.check(table, &row)?;
            self.inner.replace(table, row).await
        }

        async fn get(
            &self,
            table: &str,
            partition_key: &str,
            row_key: &str,
        ) -> StorageResult<Option<TableRow>> {
            self.inner.get(table, partition_key, row_key).await
        }

        async fn query_partition(
            &self,
            table: &str,
            partition_key: &str,
        ) -> StorageResult<Vec<TableRow>> {
            self.inner.query_partition(table, partition_key).await
        }

        async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> StorageResult<bool> {
            self.inner.delete(table, partition_key, row_key).await
        }
    }

    /// Resolves every filter to the same two products
    #[derive(Debug)]
    struct FilteringCatalogue;

    #[async_trait]
    impl SalesCatalogueClient for FilteringCatalogue {
        async fn get_products(
            &self,
            _: DataStandard,
            _: &[String],
            _: Option<&str>,
        ) -> ServiceResult<CatalogueSnapshot> {
            Ok(CatalogueSnapshot {
                products: vec!["101GB001".to_string(), "101GB002".to_string()],
                freshness_timestamp: t0(),
            })
        }
    }

    #[async_trait]
    impl SalesCatalogueClient for FixedCatalogue {
        async fn get_products(
            &self,
            _: crate::models::DataStandard,
            products: &[String],
            _: Option<&str>,
        ) -> ServiceResult<CatalogueSnapshot> {
            match self.timestamp {
                Some(freshness_timestamp) => Ok(CatalogueSnapshot {
                    products: products.to_vec(),
                    freshness_timestamp,
                }),
                None => Err(ServiceError::http_status("catalogue", 500, "down")),
            }
        }
    }

    struct Harness {
        orchestrator: AssemblyOrchestrator,
        queues: Arc<InMemoryMessagingService>,
        state_machine: JobBuildStateMachine,
    }

    async fn harness(timestamp: Option<DateTime<Utc>>) -> Harness {
        harness_with(
            Arc::new(InMemoryTableBackend::new()),
            Arc::new(FixedCatalogue { timestamp }),
        )
        .await
    }

    async fn harness_with(
        backend: Arc<dyn TableBackend>,
        catalogue: Arc<dyn SalesCatalogueClient>,
    ) -> Harness {
        let codec = ChunkedEntityCodec::default();
        let jobs = EntityStore::new(backend.clone(), "jobs", codec);
        let builds = EntityStore::new(backend.clone(), "builds", codec);
        let fingerprints = EntityStore::new(backend, "fingerprints", codec);
        jobs.create_if_not_exists().await.unwrap();
        builds.create_if_not_exists().await.unwrap();
        fingerprints.create_if_not_exists().await.unwrap();

        let queues = Arc::new(InMemoryMessagingService::new());
        let dispatch = BuildDispatchQueue::new(queues.clone(), QueuesConfig::default());
        dispatch.ensure_queues().await.unwrap();

        let state_machine = JobBuildStateMachine::new(jobs);
        Harness {
            orchestrator: AssemblyOrchestrator::new(
                catalogue,
                RetryPolicy::none(),
                FingerprintService::new(fingerprints),
                state_machine.clone(),
                builds,
                dispatch,
            ),
            queues,
            state_machine,
        }
    }

    fn request() -> ExchangeSetRequest {
        ExchangeSetRequest::new(DataStandard::S100).with_filter("f1")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_new_request_is_scheduled() {
        let h = harness(Some(t0())).await;
        let result = h
            .orchestrator
            .assemble(JobId::new("J1").unwrap(), request(), "c-1")
            .await
            .unwrap();

        assert_eq!(result.decision, AssemblyDecision::BuildScheduled);
        assert_eq!(result.job.state_pair(), StatePair::SUBMITTED);
        assert_eq!(result.job.data_standard_timestamp, Some(t0()));
        assert_eq!(h.queues.queue_length("s100-build-requests").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_duplicate_is_not_enqueued() {
        let h = harness(Some(t0())).await;
        h.orchestrator
            .assemble(JobId::new("J1").unwrap(), request(), "c-1")
            .await
            .unwrap();
        let second = h
            .orchestrator
            .assemble(JobId::new("J2").unwrap(), request(), "c-2")
            .await
            .unwrap();

        assert_eq!(
            second.decision,
            AssemblyDecision::Duplicate {
                of: JobId::new("J1").unwrap()
            }
        );
        assert_eq!(second.job.state_pair(), StatePair::DUPLICATE);
        assert_eq!(second.job.duplicate_of, Some(JobId::new("J1").unwrap()));
        assert_eq!(h.queues.queue_length("s100-build-requests").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_completed_build_makes_request_up_to_date() {
        let h = harness(Some(t0())).await;
        let first = h
            .orchestrator
            .assemble(JobId::new("J1").unwrap(), request(), "c-1")
            .await
            .unwrap();
        let mut owner = first.job;
        h.state_machine
            .signal_completed(&mut owner, BatchId::new("B1").unwrap())
            .await
            .unwrap();

        let third = h
            .orchestrator
            .assemble(JobId::new("J3").unwrap(), request(), "c-3")
            .await
            .unwrap();

        assert_eq!(third.job.state_pair(), StatePair::UP_TO_DATE);
        assert_eq!(third.job.batch_id, BatchId::new("B1").unwrap());
        assert_eq!(h.queues.queue_length("s100-build-requests").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_owner_is_taken_over() {
        let h = harness(Some(t0())).await;
        let first = h
            .orchestrator
            .assemble(JobId::new("J1").unwrap(), request(), "c-1")
            .await
            .unwrap();
        let mut owner = first.job;
        h.state_machine.signal_build_failure(&mut owner).await.unwrap();

        let retry = h
            .orchestrator
            .assemble(JobId::new("J2").unwrap(), request(), "c-2")
            .await
            .unwrap();

        assert_eq!(retry.decision, AssemblyDecision::BuildScheduled);
        assert_eq!(h.queues.queue_length("s100-build-requests").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_catalogue_failure_fails_the_job() {
        let h = harness(None).await;
        let result = h
            .orchestrator
            .assemble(JobId::new("J1").unwrap(), request(), "c-1")
            .await
            .unwrap();

        assert!(matches!(result.decision, AssemblyDecision::Failed { .. }));
        assert_eq!(result.job.state_pair(), StatePair::ASSEMBLY_FAILED);

        let persisted = h.state_machine.jobs().get("J1", "J1").await.unwrap().unwrap();
        assert_eq!(persisted.state_pair(), StatePair::ASSEMBLY_FAILED);
        assert_eq!(h.queues.queue_length("s100-build-requests").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_failure_fails_created_job() {
        let h = harness(Some(t0())).await;
        // Unknown queues make the enqueue fail after the job is recorded
        let broken = AssemblyOrchestrator::new(
            Arc::new(FixedCatalogue { timestamp: Some(t0()) }),
            RetryPolicy::none(),
            h.orchestrator.services.fingerprints.clone(),
            h.state_machine.clone(),
            h.orchestrator.services.builds.clone(),
            BuildDispatchQueue::new(
                Arc::new(InMemoryMessagingService::new()),
                QueuesConfig::default(),
            ),
        );

        let result = broken
            .assemble(JobId::new("J1").unwrap(), request(), "c-1")
            .await
            .unwrap();
        assert_eq!(result.job.state_pair(), StatePair::ASSEMBLY_FAILED);
        assert!(matches!(result.decision, AssemblyDecision::Failed { .. }));
    }

    #[tokio::test]
    async fn test_unpersistable_job_releases_its_claim() {
        let backend = Arc::new(JobWritesFailFor {
            inner: InMemoryTableBackend::new(),
            job_id: "J1",
        });
        let h = harness_with(backend, Arc::new(FixedCatalogue { timestamp: Some(t0()) })).await;

        let first = h
            .orchestrator
            .assemble(JobId::new("J1").unwrap(), request(), "c-1")
            .await;
        assert!(first.is_err());

        let second = h
            .orchestrator
            .assemble(JobId::new("J2").unwrap(), request(), "c-2")
            .await
            .unwrap();
        assert_eq!(second.decision, AssemblyDecision::BuildScheduled);
        assert_eq!(second.job.state_pair(), StatePair::SUBMITTED);
        assert_eq!(h.queues.queue_length("s100-build-requests").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_assembly_lets_next_request_build() {
        let h = harness(Some(t0())).await;
        let broken = AssemblyOrchestrator::new(
            Arc::new(FixedCatalogue { timestamp: Some(t0()) }),
            RetryPolicy::none(),
            h.orchestrator.services.fingerprints.clone(),
            h.state_machine.clone(),
            h.orchestrator.services.builds.clone(),
            BuildDispatchQueue::new(
                Arc::new(InMemoryMessagingService::new()),
                QueuesConfig::default(),
            ),
        );
        broken
            .assemble(JobId::new("J1").unwrap(), request(), "c-1")
            .await
            .unwrap();

        let next = h
            .orchestrator
            .assemble(JobId::new("J2").unwrap(), request(), "c-2")
            .await
            .unwrap();
        assert_eq!(next.decision, AssemblyDecision::BuildScheduled);
    }

    #[tokio::test]
    async fn test_filter_request_dispatches_catalogue_products() {
        let h = harness_with(Arc::new(InMemoryTableBackend::new()), Arc::new(FilteringCatalogue)).await;
        let result = h
            .orchestrator
            .assemble(JobId::new("J1").unwrap(), request(), "c-1")
            .await
            .unwrap();

        assert!(result.job.requested_products.is_empty());
        assert_eq!(result.job.catalogue_products, vec!["101GB001", "101GB002"]);

        let queued = h.queues.peek("s100-build-requests", 1).await.unwrap();
        let dispatched = BuildRequest::from_bytes(&queued[0].payload).unwrap();
        assert_eq!(dispatched.products, vec!["101GB001", "101GB002"]);
        assert_eq!(dispatched.filter.as_deref(), Some("f1"));

        let build = h.orchestrator.services.builds.get("J1", "J1").await.unwrap().unwrap();
        assert_eq!(build.products, vec!["101GB001", "101GB002"]);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_without_a_job() {
        let h = harness(Some(t0())).await;
        let err = h
            .orchestrator
            .assemble(
                JobId::new("J1").unwrap(),
                ExchangeSetRequest::new(DataStandard::S57),
                "c-1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert!(h.state_machine.jobs().get("J1", "J1").await.unwrap().is_none());
    }
}
