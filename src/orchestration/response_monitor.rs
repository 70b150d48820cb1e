//! # Build Response Monitor
//!
//! Consumes one data standard's response queue and applies each response
//! through the [`CompletionOrchestrator`]. Responses are always received
//! destructively: completion is idempotent on a terminal job, so a redelivery
//! after a crash is harmless.
//!
//! A response is deleted once it is applied, or when it can never be applied
//! (undecodable, unknown job, invalid transition). Transient failures leave it
//! on the queue for redelivery.

use super::completion::{CompletionOrchestrator, CompletionOutcome};
use super::polling::QueueMonitor;
use crate::config::MonitorConfig;
use crate::error::OrchestratorResult;
use crate::logging::{log_error, log_job_operation};
use crate::messaging::{BuildDispatchQueue, BuildResponse, MessagingService, QueueMessage, RawMessage};
use crate::models::DataStandard;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug)]
pub struct BuildResponseMonitor {
    data_standard: DataStandard,
    dispatch: BuildDispatchQueue,
    completion: Arc<CompletionOrchestrator>,
    config: MonitorConfig,
}

impl BuildResponseMonitor {
    pub fn new(
        data_standard: DataStandard,
        dispatch: BuildDispatchQueue,
        completion: Arc<CompletionOrchestrator>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            data_standard,
            dispatch,
            completion,
            config,
        }
    }

    pub fn queue(&self) -> String {
        self.dispatch.response_queue(self.data_standard)
    }

    async fn handle(&self, queue: &str, message: &RawMessage) -> OrchestratorResult<()> {
        let response = match BuildResponse::from_bytes(&message.payload) {
            Ok(response) => response,
            Err(e) if e.is_poison() => {
                warn!(queue, message_id = %message.id.as_str(), error = %e, "☠️ Dropping undecodable build response");
                return self.delete(queue, message).await;
            }
            Err(e) => return Err(e.into()),
        };

        match self.completion.complete(&response).await {
            Ok(outcome) => {
                let status = match &outcome {
                    CompletionOutcome::Completed { .. } => "completed",
                    CompletionOutcome::BuildFailed { .. } => "build_failed",
                    CompletionOutcome::CompletionFailed { .. } => "completion_failed",
                    CompletionOutcome::AlreadyTerminal { .. } => "already_terminal",
                };
                log_job_operation(
                    "complete",
                    response.job_id.as_str(),
                    Some(response.data_standard.as_str()),
                    status,
                    None,
                );
                self.delete(queue, message).await
            }
            Err(e) if e.is_permanent() => {
                log_error(
                    "build_response_monitor",
                    "complete",
                    &e.to_string(),
                    Some(response.job_id.as_str()),
                );
                self.delete(queue, message).await
            }
            Err(e) => Err(e),
        }
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
impl QueueMonitor for BuildResponseMonitor {
    fn name(&self) -> String {
        format!("build-responses-{}", self.data_standard)
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    async fn poll_once(&self) -> OrchestratorResult<usize> {
        let queue = self.queue();
        let messages = self
            .dispatch
            .service()
            .receive(&queue, self.config.batch_size, self.config.visibility_timeout())
            .await?;
        if messages.is_empty() {
            return Ok(0);
        }
        debug!(queue = %queue, count = messages.len(), "Processing build responses");

        let mut handled = 0;
        for message in &messages {
            match self.handle(&queue, message).await {
                Ok(()) => handled += 1,
                Err(e) => {
                    error!(
                        queue = %queue,
                        message_id = %message.id.as_str(),
                        receive_count = message.receive_count,
                        error = %e,
                        "Failed to apply build response; leaving it for redelivery"
                    );
                }
            }
        }
        Ok(handled)
    }
}
