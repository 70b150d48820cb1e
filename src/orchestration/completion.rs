//! # Completion Orchestrator
//!
//! Applies a builder's [`BuildResponse`] to its job.
//!
//! A successful build moves the job to `(Completed, Succeeded)` first, then
//! runs the post-build pipeline:
//!
//! ```text
//! completion
//! ├── update-build        batch id onto the build record
//! ├── record-fingerprint  batch id onto the fingerprint claim
//! ├── record-timestamp    newest built catalogue timestamp per standard
//! ├── notify-caller       callback, when the job has a callback URI
//! └── finalize-build      marks the build record finalized
//! ```
//!
//! If any of those fail the job ends `(Failed, Succeeded)`: the batch exists
//! but the job is reported failed. Every step is idempotent, so a redelivered
//! response for a `(Completed, Succeeded)` job whose build is not finalized yet
//! runs the pipeline again instead of being dropped. A failed build moves the job to
//! `(Failed, Failed)` and only the caller notification runs.

use crate::clients::{CallbackNotifier, CallbackPayload};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::fingerprint::FingerprintService;
use crate::messaging::BuildResponse;
use crate::models::{BatchId, Build, Job, StandardTimestamp};
use crate::pipeline::{Node, NodeResult, PipelineError, PipelineNode, PipelineResult};
use crate::state_machine::{JobBuildStateMachine, StatePair};
use crate::storage::EntityStore;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What completion did with a response
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// `(Completed, Succeeded)`
    Completed { job: Job },
    /// `(Failed, Failed)`
    BuildFailed { job: Job },
    /// `(Failed, Succeeded)`: post-build steps failed
    CompletionFailed { job: Job, reason: String },
    /// The job was already terminal; the response is a redelivery
    AlreadyTerminal { job: Job },
}

impl CompletionOutcome {
    pub fn job(&self) -> &Job {
        match self {
            Self::Completed { job }
            | Self::BuildFailed { job }
            | Self::CompletionFailed { job, .. }
            | Self::AlreadyTerminal { job } => job,
        }
    }
}

/// Shared state of one completion run
pub struct CompletionContext {
    pub job: Job,
    pub response: BuildResponse,
}

impl CompletionContext {
    fn succeeded(&self) -> bool {
        self.response.exit_code.is_success()
    }
}

struct CompletionServices {
    builds: EntityStore<Build>,
    fingerprints: FingerprintService,
    timestamps: EntityStore<StandardTimestamp>,
    notifier: Arc<dyn CallbackNotifier>,
}

struct UpdateBuildNode(Arc<CompletionServices>);
struct RecordFingerprintNode(Arc<CompletionServices>);
struct RecordTimestampNode(Arc<CompletionServices>);
struct NotifyCallerNode(Arc<CompletionServices>);
struct FinalizeBuildNode(Arc<CompletionServices>);

impl UpdateBuildNode {
    async fn load_build(&self, job: &Job) -> PipelineResult<Build> {
        self.0
            .builds
            .get(job.id.as_str(), job.id.as_str())
            .await
            .map_err(|e| PipelineError::node("update-build", e.to_string()))?
            .ok_or_else(|| PipelineError::node("update-build", "build record missing"))
    }
}

#[async_trait]
impl Node<CompletionContext> for UpdateBuildNode {
    fn name(&self) -> &str {
        "update-build"
    }

    async fn execute(&self, context: &CompletionContext) -> PipelineResult<NodeResult> {
        let mut build = self.load_build(&context.job).await?;
        build.batch_id = context.job.batch_id.clone();
        build.touch();
        self.0
            .builds
            .upsert(&build)
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;
        Ok(NodeResult::succeeded_with(build.batch_id.to_string()))
    }
}

#[async_trait]
impl Node<CompletionContext> for RecordFingerprintNode {
    fn name(&self) -> &str {
        "record-fingerprint"
    }

    async fn execute(&self, context: &CompletionContext) -> PipelineResult<NodeResult> {
        let job = &context.job;
        let build = self
            .0
            .builds
            .get(job.id.as_str(), job.id.as_str())
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;
        let Some(discriminant) = build.and_then(|b| b.discriminant) else {
            return Ok(NodeResult::not_run());
        };

        let recorded = self
            .0
            .fingerprints
            .record_batch(job.data_standard, &discriminant, &job.id, &job.batch_id)
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;
        if !recorded {
            // Another job took the claim over; its own completion records the batch
            warn!(job_id = %job.id, "Fingerprint no longer owned by this job");
        }
        Ok(NodeResult::succeeded())
    }
}

#[async_trait]
impl Node<CompletionContext> for RecordTimestampNode {
    fn name(&self) -> &str {
        "record-timestamp"
    }

    async fn should_execute(&self, context: &CompletionContext) -> bool {
        context.job.data_standard_timestamp.is_some()
    }

    async fn execute(&self, context: &CompletionContext) -> PipelineResult<NodeResult> {
        let job = &context.job;
        let Some(timestamp) = job.data_standard_timestamp else {
            return Ok(NodeResult::not_run());
        };
        let key = job.data_standard.as_str();

        let current = self
            .0
            .timestamps
            .get(key, key)
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;
        if current.is_some_and(|c| c.timestamp >= timestamp) {
            return Ok(NodeResult::succeeded_with("unchanged"));
        }

        self.0
            .timestamps
            .upsert(&StandardTimestamp::new(job.data_standard, timestamp, job.id.clone()))
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;
        Ok(NodeResult::succeeded_with(timestamp.to_rfc3339()))
    }
}

#[async_trait]
impl Node<CompletionContext> for NotifyCallerNode {
    fn name(&self) -> &str {
        "notify-caller"
    }

    async fn should_execute(&self, context: &CompletionContext) -> bool {
        context.job.callback_uri.is_some()
    }

    async fn execute(&self, context: &CompletionContext) -> PipelineResult<NodeResult> {
        let Some(uri) = context.job.callback_uri.as_deref() else {
            return Ok(NodeResult::not_run());
        };
        self.0
            .notifier
            .notify(uri, &CallbackPayload::from(&context.job))
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;
        Ok(NodeResult::succeeded_with(uri))
    }
}

#[async_trait]
impl Node<CompletionContext> for FinalizeBuildNode {
    fn name(&self) -> &str {
        "finalize-build"
    }

    async fn execute(&self, context: &CompletionContext) -> PipelineResult<NodeResult> {
        let job = &context.job;
        let mut build = self
            .0
            .builds
            .get(job.id.as_str(), job.id.as_str())
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?
            .ok_or_else(|| PipelineError::node(self.name(), "build record missing"))?;
        build.finalized_at = Some(Utc::now());
        build.touch();
        self.0
            .builds
            .upsert(&build)
            .await
            .map_err(|e| PipelineError::node(self.name(), e.to_string()))?;
        Ok(NodeResult::succeeded())
    }
}

pub struct CompletionOrchestrator {
    state_machine: JobBuildStateMachine,
    builds: EntityStore<Build>,
    pipeline: PipelineNode<CompletionContext>,
}

impl std::fmt::Debug for CompletionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionOrchestrator")
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl CompletionOrchestrator {
    pub fn new(
        state_machine: JobBuildStateMachine,
        builds: EntityStore<Build>,
        fingerprints: FingerprintService,
        timestamps: EntityStore<StandardTimestamp>,
        notifier: Arc<dyn CallbackNotifier>,
    ) -> Self {
        let services = Arc::new(CompletionServices {
            builds: builds.clone(),
            fingerprints,
            timestamps,
            notifier,
        });
        let on_success = |context: &CompletionContext| context.succeeded();

        let pipeline = PipelineNode::composite("completion")
            .child(PipelineNode::leaf(UpdateBuildNode(services.clone())).with_predicate(on_success))
            .child(
                PipelineNode::leaf(RecordFingerprintNode(services.clone()))
                    .with_predicate(on_success),
            )
            .child(
                PipelineNode::leaf(RecordTimestampNode(services.clone())).with_predicate(on_success),
            )
            .child(PipelineNode::leaf(NotifyCallerNode(services.clone())))
            .child(PipelineNode::leaf(FinalizeBuildNode(services)).with_predicate(on_success));

        Self {
            state_machine,
            builds,
            pipeline,
        }
    }

    /// A completed job whose post-build steps never all ran
    async fn is_unfinalized(&self, job: &Job) -> OrchestratorResult<bool> {
        if job.state_pair() != StatePair::COMPLETED {
            return Ok(false);
        }
        let build = self.builds.get(job.id.as_str(), job.id.as_str()).await?;
        Ok(build.is_some_and(|b| !b.is_finalized()))
    }

    #[instrument(skip_all, fields(job_id = %response.job_id, data_standard = %response.data_standard, exit_code = %response.exit_code))]
    pub async fn complete(&self, response: &BuildResponse) -> OrchestratorResult<CompletionOutcome> {
        let mut job = self
            .state_machine
            .jobs()
            .get(response.job_id.as_str(), response.job_id.as_str())
            .await?
            .ok_or_else(|| OrchestratorError::JobNotFound(response.job_id.to_string()))?;

        if job.data_standard != response.data_standard {
            return Err(OrchestratorError::validation(format!(
                "response for {} carries data standard {}, job has {}",
                job.id, response.data_standard, job.data_standard
            )));
        }

        let transition = if response.exit_code.is_success() {
            let batch_id = response.batch_id.clone().unwrap_or_else(BatchId::none);
            self.state_machine.signal_completed(&mut job, batch_id).await
        } else {
            self.state_machine.signal_build_failure(&mut job).await
        };

        if let Err(e) = transition {
            if !e.is_invalid_transition() || !job.is_terminal() {
                return Err(e.into());
            }
            if !(response.exit_code.is_success() && self.is_unfinalized(&job).await?) {
                info!(state = %job.state_pair(), "Ignoring redelivered build response");
                return Ok(CompletionOutcome::AlreadyTerminal { job });
            }
            info!("🔁 Resuming unfinished post-build steps");
        }

        let context = CompletionContext {
            job,
            response: response.clone(),
        };
        let failure = match self.pipeline.execute(&context).await {
            Ok(result) if !result.is_failed() => None,
            Ok(result) => Some(format!(
                "{} ({})",
                result.error.unwrap_or_else(|| "post-build step failed".to_string()),
                result.failed_nodes.join(", ")
            )),
            Err(e) => Some(e.to_string()),
        };
        let mut job = context.job;

        if !response.exit_code.is_success() {
            if let Some(reason) = failure {
                warn!(reason = %reason, "Could not report failed build to caller");
            }
            info!("❌ Build failed");
            return Ok(CompletionOutcome::BuildFailed { job });
        }

        match failure {
            None => {
                info!(batch_id = %job.batch_id, "🎉 Job completed");
                Ok(CompletionOutcome::Completed { job })
            }
            Some(reason) => {
                warn!(reason = %reason, "⚠️ Post-build steps failed");
                self.state_machine.signal_completion_failure(&mut job).await?;
                Ok(CompletionOutcome::CompletionFailed { job, reason })
            }
        }
    }
}
