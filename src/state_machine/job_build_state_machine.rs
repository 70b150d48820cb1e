use super::{errors::StateMachineResult, events::JobSignal};
use crate::logging::log_job_operation;
use crate::models::{BatchId, Job, NewJob};
use crate::storage::EntityStore;
use tracing::{debug, warn};

/// Job receiving an assembly error: either never persisted, or persisted as created
#[derive(Debug, Clone)]
pub enum AssemblyErrorSubject {
    New(NewJob),
    Existing(Job),
}

impl From<NewJob> for AssemblyErrorSubject {
    fn from(job: NewJob) -> Self {
        Self::New(job)
    }
}

impl From<Job> for AssemblyErrorSubject {
    fn from(job: Job) -> Self {
        Self::Existing(job)
    }
}

/// Authoritative owner of job state transitions
///
/// Each signal validates the job's current pair against the transition table,
/// persists the job with its new pair and only then reports success. Signals
/// that take `&mut Job` leave the job untouched when validation or persistence
/// fails.
#[derive(Debug, Clone)]
pub struct JobBuildStateMachine {
    jobs: EntityStore<Job>,
}

impl JobBuildStateMachine {
    pub fn new(jobs: EntityStore<Job>) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> &EntityStore<Job> {
        &self.jobs
    }

    /// `(Created, NotScheduled)`: a build is needed and not yet dispatched
    pub async fn signal_build_required(&self, job: NewJob) -> StateMachineResult<Job> {
        self.admit(job, JobSignal::BuildRequired).await
    }

    /// `(Duplicate, NotScheduled)`: an equivalent build is already in flight
    pub async fn signal_build_duplicated(&self, job: NewJob) -> StateMachineResult<Job> {
        self.admit(job, JobSignal::BuildDuplicated).await
    }

    /// `(UpToDate, None)`: the last successful build is still fresh
    pub async fn signal_no_build_required(&self, job: NewJob) -> StateMachineResult<Job> {
        self.admit(job, JobSignal::NoBuildRequired).await
    }

    /// `(Failed, None)`: assembly could not finish
    pub async fn signal_assembly_error(
        &self,
        subject: impl Into<AssemblyErrorSubject>,
    ) -> StateMachineResult<Job> {
        match subject.into() {
            AssemblyErrorSubject::New(job) => self.admit(job, JobSignal::AssemblyError).await,
            AssemblyErrorSubject::Existing(mut job) => {
                self.transition(&mut job, JobSignal::AssemblyError, |_| {})
                    .await?;
                Ok(job)
            }
        }
    }

    /// `(Submitted, Scheduled)`: the build request was enqueued
    pub async fn signal_build_scheduled(&self, job: &mut Job) -> StateMachineResult<()> {
        self.transition(job, JobSignal::BuildScheduled, |_| {}).await
    }

    /// `(Failed, Failed)`: the builder reported failure
    pub async fn signal_build_failure(&self, job: &mut Job) -> StateMachineResult<()> {
        self.transition(job, JobSignal::BuildFailure, |_| {}).await
    }

    /// `(Completed, Succeeded)`: the builder produced `batch_id`
    pub async fn signal_completed(&self, job: &mut Job, batch_id: BatchId) -> StateMachineResult<()> {
        self.transition(job, JobSignal::Completed, move |next| {
            if !batch_id.is_none() {
                next.batch_id = batch_id;
            }
        })
        .await
    }

    /// `(Failed, Succeeded)`: the build succeeded but post-build steps failed
    pub async fn signal_completion_failure(&self, job: &mut Job) -> StateMachineResult<()> {
        self.transition(job, JobSignal::CompletionFailure, |_| {})
            .await
    }

    async fn admit(&self, job: NewJob, signal: JobSignal) -> StateMachineResult<Job> {
        let target = signal.determine_target(None)?;
        let job = job.into_job(target);

        self.jobs.upsert(&job).await.inspect_err(|e| {
            warn!(job_id = %job.id, signal = signal.signal_type(), error = %e, "Failed to persist new job");
        })?;

        log_job_operation(
            signal.signal_type(),
            job.id.as_str(),
            Some(job.data_standard.as_str()),
            &target.to_string(),
            None,
        );
        Ok(job)
    }

    async fn transition(
        &self,
        job: &mut Job,
        signal: JobSignal,
        apply: impl FnOnce(&mut Job),
    ) -> StateMachineResult<()> {
        let current = job.state_pair();
        let target = signal.determine_target(Some(current)).inspect_err(|_| {
            debug!(job_id = %job.id, from = %current, signal = signal.signal_type(), "Rejected transition");
        })?;

        let mut next = job.clone();
        apply(&mut next);
        next.set_state_pair(target);

        self.jobs.upsert(&next).await.inspect_err(|e| {
            warn!(job_id = %job.id, signal = signal.signal_type(), error = %e, "Failed to persist transition");
        })?;

        log_job_operation(
            signal.signal_type(),
            next.id.as_str(),
            Some(next.data_standard.as_str()),
            &target.to_string(),
            Some(&format!("from {current}")),
        );
        *job = next;
        Ok(())
    }
}
