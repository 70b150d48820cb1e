//! A fully wired system over the in-memory table and queue backends.

use super::fakes::{catalogue_time, FakeCatalogue, FakeFileShare, FakeTool, RecordingNotifier};
use exchange_set_core::config::{MonitorConfig, OrchestratorConfig, PollMode, RetryConfig};
use exchange_set_core::messaging::{InMemoryMessagingService, MessagingService};
use exchange_set_core::models::{DataStandard, Job, JobId};
use exchange_set_core::orchestration::{
    ExternalClients, OrchestrationSystem, QueueMonitor,
};
use exchange_set_core::storage::InMemoryTableBackend;
use std::sync::Arc;

pub struct TestSystem {
    pub system: OrchestrationSystem,
    pub messaging: Arc<InMemoryMessagingService>,
    pub catalogue: Arc<FakeCatalogue>,
    pub file_share: Arc<FakeFileShare>,
    pub tool: Arc<FakeTool>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn test_config(poll_mode: PollMode) -> OrchestratorConfig {
    OrchestratorConfig {
        monitor: MonitorConfig {
            poll_mode,
            batch_size: 10,
            poll_interval_ms: 100,
            ..MonitorConfig::default()
        },
        retry: RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        },
        ..OrchestratorConfig::default()
    }
}

impl TestSystem {
    pub async fn start() -> Self {
        Self::with_config(test_config(PollMode::Receive)).await
    }

    pub async fn with_config(config: OrchestratorConfig) -> Self {
        let messaging = Arc::new(InMemoryMessagingService::new());
        let catalogue = Arc::new(FakeCatalogue::new(catalogue_time(12)));
        let file_share = Arc::new(FakeFileShare::default());
        let tool = Arc::new(FakeTool::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let system = OrchestrationSystem::bootstrap(
            config,
            Arc::new(InMemoryTableBackend::new()),
            messaging.clone(),
            ExternalClients {
                catalogue: catalogue.clone(),
                file_share: file_share.clone(),
                tool: tool.clone(),
                notifier: notifier.clone(),
            },
        )
        .await
        .expect("system bootstraps");

        Self {
            system,
            messaging,
            catalogue,
            file_share,
            tool,
            notifier,
        }
    }

    /// Run queued builds for one standard, then apply their responses
    pub async fn run_builds(&self, data_standard: DataStandard) -> (usize, usize) {
        let built = self
            .system
            .request_monitor(data_standard)
            .poll_once()
            .await
            .expect("request poll");
        let completed = self
            .system
            .response_monitor(data_standard)
            .poll_once()
            .await
            .expect("response poll");
        (built, completed)
    }

    pub async fn job(&self, job_id: &JobId) -> Job {
        self.system.status().get_job(job_id).await.expect("job exists")
    }

    pub async fn queue_length(&self, queue: &str) -> usize {
        self.messaging.queue_length(queue).await.expect("queue exists")
    }

    pub async fn request_queue_length(&self, data_standard: DataStandard) -> usize {
        self.queue_length(&self.system.dispatch().request_queue(data_standard))
            .await
    }

    pub async fn response_queue_length(&self, data_standard: DataStandard) -> usize {
        self.queue_length(&self.system.dispatch().response_queue(data_standard))
            .await
    }
}
