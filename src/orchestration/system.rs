//! # Orchestration System
//!
//! Wires stores, queues, orchestrators and monitors from one
//! [`OrchestratorConfig`], and spawns a request and a response monitor per
//! data standard.

use super::assembly::{AssemblyOrchestrator, AssemblyResult};
use super::build_monitor::BuildRequestMonitor;
use super::completion::CompletionOrchestrator;
use super::polling::run_until_shutdown;
use super::processed_jobs::ProcessedJobTracker;
use super::response_monitor::BuildResponseMonitor;
use super::status::JobStatusReader;
use super::stores::OrchestratorStores;
use crate::builder::{BuildRunner, BuilderServices, ExchangeSetBuilder};
use crate::clients::{
    CallbackNotifier, ExchangeSetToolClient, FileShareClient, RetryPolicy, SalesCatalogueClient,
};
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorResult;
use crate::fingerprint::FingerprintService;
use crate::messaging::{BuildDispatchQueue, MessagingService};
use crate::models::{DataStandard, ExchangeSetRequest, JobId};
use crate::state_machine::JobBuildStateMachine;
use crate::storage::TableBackend;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument};
use uuid::Uuid;

/// Downstream services the system talks to
#[derive(Debug, Clone)]
pub struct ExternalClients {
    pub catalogue: Arc<dyn SalesCatalogueClient>,
    pub file_share: Arc<dyn FileShareClient>,
    pub tool: Arc<dyn ExchangeSetToolClient>,
    pub notifier: Arc<dyn CallbackNotifier>,
}

#[derive(Debug)]
pub struct OrchestrationSystem {
    config: OrchestratorConfig,
    stores: OrchestratorStores,
    dispatch: BuildDispatchQueue,
    assembly: AssemblyOrchestrator,
    completion: Arc<CompletionOrchestrator>,
    runner: Arc<dyn BuildRunner>,
    processed: Arc<ProcessedJobTracker>,
    status: JobStatusReader,
}

impl OrchestrationSystem {
    /// Build the system and create its tables and queues
    #[instrument(skip_all)]
    pub async fn bootstrap(
        config: OrchestratorConfig,
        backend: Arc<dyn TableBackend>,
        messaging: Arc<dyn MessagingService>,
        clients: ExternalClients,
    ) -> OrchestratorResult<Self> {
        config.validate()?;

        let stores = OrchestratorStores::new(backend, &config.storage)?;
        stores.create_tables().await?;

        let dispatch = BuildDispatchQueue::new(messaging, config.queues.clone());
        dispatch.ensure_queues().await?;

        let retry = RetryPolicy::new(config.retry.clone());
        let state_machine = JobBuildStateMachine::new(stores.jobs.clone());
        let fingerprints = FingerprintService::new(stores.fingerprints.clone());

        let assembly = AssemblyOrchestrator::new(
            clients.catalogue,
            retry.clone(),
            fingerprints.clone(),
            state_machine.clone(),
            stores.builds.clone(),
            dispatch.clone(),
        );
        let completion = Arc::new(CompletionOrchestrator::new(
            state_machine,
            stores.builds.clone(),
            fingerprints,
            stores.timestamps.clone(),
            clients.notifier,
        ));
        let runner: Arc<dyn BuildRunner> = Arc::new(ExchangeSetBuilder::new(BuilderServices {
            file_share: clients.file_share,
            tool: clients.tool,
            retry,
        }));
        let status = JobStatusReader::new(
            stores.jobs.clone(),
            stores.builds.clone(),
            stores.timestamps.clone(),
        );
        let processed = Arc::new(ProcessedJobTracker::from_config(&config.monitor));

        info!(
            backend = ?config.storage.backend,
            poll_mode = ?config.monitor.poll_mode,
            messaging = dispatch.service().provider_name(),
            "✅ Orchestration system ready"
        );

        Ok(Self {
            config,
            stores,
            dispatch,
            assembly,
            completion,
            runner,
            processed,
            status,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn stores(&self) -> &OrchestratorStores {
        &self.stores
    }

    pub fn dispatch(&self) -> &BuildDispatchQueue {
        &self.dispatch
    }

    pub fn status(&self) -> &JobStatusReader {
        &self.status
    }

    pub fn completion(&self) -> &CompletionOrchestrator {
        &self.completion
    }

    /// Accept a request under a fresh job id
    pub async fn submit(&self, request: ExchangeSetRequest) -> OrchestratorResult<AssemblyResult> {
        let correlation_id = Uuid::new_v4().to_string();
        self.assembly
            .assemble(JobId::generate(), request, &correlation_id)
            .await
    }

    pub fn request_monitor(&self, data_standard: DataStandard) -> BuildRequestMonitor {
        BuildRequestMonitor::new(
            data_standard,
            self.dispatch.clone(),
            self.runner.clone(),
            self.config.monitor.clone(),
            self.processed.clone(),
        )
    }

    pub fn response_monitor(&self, data_standard: DataStandard) -> BuildResponseMonitor {
        BuildResponseMonitor::new(
            data_standard,
            self.dispatch.clone(),
            self.completion.clone(),
            self.config.monitor.clone(),
        )
    }

    /// Spawn a request and a response monitor for every data standard
    pub fn spawn_monitors(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(DataStandard::ALL.len() * 2);
        for data_standard in DataStandard::ALL {
            let requests = self.request_monitor(data_standard);
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move {
                run_until_shutdown(&requests, rx).await
            }));

            let responses = self.response_monitor(data_standard);
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move {
                run_until_shutdown(&responses, rx).await
            }));
        }
        info!(monitors = handles.len(), "🚀 Queue monitors started");
        handles
    }
}
