//! # Build Request Monitor
//!
//! Consumes one data standard's request queue and hands each request to the
//! builder. The builder's outcome is enqueued on the response queue before the
//! request message is deleted, so a crash in between redelivers the request
//! rather than losing the build.
//!
//! Two poll modes are supported. `receive` hides a delivered message for the
//! visibility timeout. `peek` leaves it visible, so the same request shows up on
//! every poll until it is deleted; the [`ProcessedJobTracker`] stops it being
//! built more than once. Peeked duplicates of a job whose response is already
//! enqueued are deleted, so they cannot hold up the requests behind them.

use super::polling::QueueMonitor;
use super::processed_jobs::ProcessedJobTracker;
use crate::builder::BuildRunner;
use crate::config::{MonitorConfig, PollMode};
use crate::error::OrchestratorResult;
use crate::logging::log_queue_operation;
use crate::messaging::{BuildDispatchQueue, BuildRequest, MessagingService, QueueMessage, RawMessage};
use crate::models::DataStandard;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

#[derive(Debug)]
pub struct BuildRequestMonitor {
    data_standard: DataStandard,
    dispatch: BuildDispatchQueue,
    runner: Arc<dyn BuildRunner>,
    config: MonitorConfig,
    processed: Arc<ProcessedJobTracker>,
}

impl BuildRequestMonitor {
    pub fn new(
        data_standard: DataStandard,
        dispatch: BuildDispatchQueue,
        runner: Arc<dyn BuildRunner>,
        config: MonitorConfig,
        processed: Arc<ProcessedJobTracker>,
    ) -> Self {
        Self {
            data_standard,
            dispatch,
            runner,
            config,
            processed,
        }
    }

    pub fn data_standard(&self) -> DataStandard {
        self.data_standard
    }

    pub fn queue(&self) -> String {
        self.dispatch.request_queue(self.data_standard)
    }

    async fn fetch(&self, queue: &str) -> OrchestratorResult<Vec<RawMessage>> {
        let service = self.dispatch.service();
        let messages = match self.config.poll_mode {
            PollMode::Receive => {
                service
                    .receive(queue, self.config.batch_size, self.config.visibility_timeout())
                    .await?
            }
            PollMode::Peek => service.peek(queue, self.config.batch_size).await?,
        };
        Ok(messages)
    }

    /// Handle one delivery; false when it was skipped
    async fn handle(&self, queue: &str, message: &RawMessage) -> OrchestratorResult<bool> {
        let request = match BuildRequest::from_bytes(&message.payload) {
            Ok(request) => request,
            Err(e) if e.is_poison() => {
                warn!(queue, message_id = %message.id.as_str(), error = %e, "☠️ Dropping undecodable build request");
                self.delete(queue, message).await?;
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        };

        if request.data_standard != self.data_standard {
            warn!(
                queue,
                job_id = %request.job_id,
                data_standard = %request.data_standard,
                "Dropping build request routed to the wrong queue"
            );
            self.delete(queue, message).await?;
            return Ok(true);
        }

        if !self.processed.try_claim(&request.job_id) {
            return self.skip_claimed(queue, message, &request).await;
        }

        self.build(queue, message, &request).await
    }

    /// A delivery whose job this process already claimed
    ///
    /// Received copies are redundant and go. A peeked copy is only deleted once
    /// the claimed build's response is enqueued, otherwise it stays for the
    /// claim holder to delete; it must not linger at the head of the queue.
    async fn skip_claimed(
        &self,
        queue: &str,
        message: &RawMessage,
        request: &BuildRequest,
    ) -> OrchestratorResult<bool> {
        match self.config.poll_mode {
            PollMode::Receive => {
                debug!(job_id = %request.job_id, "Dropping duplicate of a claimed build request");
                self.delete(queue, message).await?;
                Ok(true)
            }
            PollMode::Peek if self.processed.is_responded(&request.job_id) => {
                debug!(job_id = %request.job_id, "Dropping duplicate of an answered build request");
                self.delete(queue, message).await?;
                Ok(true)
            }
            PollMode::Peek => {
                debug!(job_id = %request.job_id, "Build already claimed in this process");
                Ok(false)
            }
        }
    }

    #[instrument(skip_all, fields(job_id = %request.job_id, data_standard = %request.data_standard, correlation_id = %request.correlation_id))]
    async fn build(
        &self,
        queue: &str,
        message: &RawMessage,
        request: &BuildRequest,
    ) -> OrchestratorResult<bool> {
        let response = self.runner.run(request).await;

        if let Err(e) = self.dispatch.enqueue_response(&response).await {
            // Leave the request queued; it is built again on redelivery
            self.processed.release(&request.job_id);
            return Err(e.into());
        }
        self.processed.mark_responded(&request.job_id);

        self.delete(queue, message).await?;
        log_queue_operation(
            "build_request",
            queue,
            Some(request.job_id.as_str()),
            "completed",
            Some(&response.exit_code.to_string()),
        );
        Ok(true)
    }

    async fn delete(&self, queue: &str, message: &RawMessage) -> OrchestratorResult<()> {
        self.dispatch
            .service()
            .delete(queue, &message.receipt_handle)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl QueueMonitor for BuildRequestMonitor {
    fn name(&self) -> String {
        format!("build-requests-{}", self.data_standard)
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    async fn poll_once(&self) -> OrchestratorResult<usize> {
        let queue = self.queue();
        let messages = self.fetch(&queue).await?;
        if messages.is_empty() {
            return Ok(0);
        }
        debug!(queue = %queue, count = messages.len(), "Processing build requests");

        let mut handled = 0;
        for message in &messages {
            match self.handle(&queue, message).await {
                Ok(true) => handled += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(
                        queue = %queue,
                        message_id = %message.id.as_str(),
                        receive_count = message.receive_count,
                        error = %e,
                        "Failed to process build request"
                    );
                }
            }
        }
        Ok(handled)
    }
}
