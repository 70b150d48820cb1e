//! # Orchestrator Configuration
//!
//! Typed configuration for storage, queues, monitors, external-call retries and
//! caller callbacks.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use exchange_set_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Defaults, then config/orchestrator.toml if present, then EXCHANGE_SET_* variables
//! let config = ConfigLoader::load(Some("config/orchestrator.toml"))?;
//!
//! let interval = config.monitor.poll_interval();
//! let layout = config.storage.chunk_layout()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::models::DataStandard;
use crate::storage::{ChunkLayout, DEFAULT_SLOT_COUNT, DEFAULT_SLOT_SIZE_BYTES};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

const STANDARD_PLACEHOLDER: &str = "{standard}";

/// Upper bound on retries of one external call
pub const MAX_RETRIES_LIMIT: u32 = 20;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub storage: StorageConfig,
    pub queues: QueuesConfig,
    pub monitor: MonitorConfig,
    pub retry: RetryConfig,
    pub callback: CallbackConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    #[default]
    InMemory,
    FileSystem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    /// Root directory of the file-system backend
    pub root_path: PathBuf,
    pub chunk_slot_count: usize,
    pub chunk_slot_size_bytes: usize,
    pub jobs_table: String,
    pub builds_table: String,
    pub fingerprints_table: String,
    pub timestamps_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::InMemory,
            root_path: PathBuf::from("data"),
            chunk_slot_count: DEFAULT_SLOT_COUNT,
            chunk_slot_size_bytes: DEFAULT_SLOT_SIZE_BYTES,
            jobs_table: "jobs".to_string(),
            builds_table: "builds".to_string(),
            fingerprints_table: "fingerprints".to_string(),
            timestamps_table: "timestamps".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn chunk_layout(&self) -> ConfigResult<ChunkLayout> {
        ChunkLayout::new(self.chunk_slot_count, self.chunk_slot_size_bytes).map_err(|e| {
            ConfigurationError::invalid_value(
                "storage.chunk_slot_count/chunk_slot_size_bytes",
                format!("{}x{}", self.chunk_slot_count, self.chunk_slot_size_bytes),
                e.to_string(),
            )
        })
    }
}

/// Queue name templates; `{standard}` is replaced by the lower-case data standard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub request_queue_template: String,
    pub response_queue_template: String,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            request_queue_template: "{standard}-build-requests".to_string(),
            response_queue_template: "{standard}-build-responses".to_string(),
        }
    }
}

impl QueuesConfig {
    pub fn request_queue(&self, data_standard: DataStandard) -> String {
        self.request_queue_template
            .replace(STANDARD_PLACEHOLDER, data_standard.as_str())
    }

    pub fn response_queue(&self, data_standard: DataStandard) -> String {
        self.response_queue_template
            .replace(STANDARD_PLACEHOLDER, data_standard.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    /// Destructive receive with a visibility timeout
    #[default]
    Receive,
    /// Non-destructive peek; claimed jobs are tracked in memory
    Peek,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_mode: PollMode,
    /// Sleep between empty polls
    pub poll_interval_ms: u64,
    pub visibility_timeout_seconds: u64,
    /// Messages taken per poll
    pub batch_size: usize,
    /// How long a claimed job stays in the processed set; defaults to the visibility timeout
    pub processed_job_ttl_seconds: Option<u64>,
    pub processed_job_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_mode: PollMode::Receive,
            poll_interval_ms: 5_000,
            visibility_timeout_seconds: 600,
            batch_size: 1,
            processed_job_ttl_seconds: None,
            processed_job_capacity: 10_000,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    pub fn processed_job_ttl(&self) -> Duration {
        Duration::from_secs(
            self.processed_job_ttl_seconds
                .unwrap_or(self.visibility_timeout_seconds),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

/// Retry policy for calls to external services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub delay_ms: u64,
    pub backoff: BackoffStrategy,
    pub max_delay_ms: u64,
    /// HTTP statuses treated as transient
    pub retriable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 2_000,
            backoff: BackoffStrategy::Fixed,
            max_delay_ms: 30_000,
            retriable_status_codes: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 15_000,
        }
    }
}

impl OrchestratorConfig {
    /// Reject values the orchestrator cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        self.storage.chunk_layout()?;

        for (field, value) in [
            ("storage.jobs_table", &self.storage.jobs_table),
            ("storage.builds_table", &self.storage.builds_table),
            ("storage.fingerprints_table", &self.storage.fingerprints_table),
            ("storage.timestamps_table", &self.storage.timestamps_table),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field,
                    "storage configuration",
                ));
            }
        }

        if self.storage.backend == StorageBackendKind::FileSystem
            && self.storage.root_path.as_os_str().is_empty()
        {
            return Err(ConfigurationError::missing_required_field(
                "storage.root_path",
                "file_system storage backend",
            ));
        }

        for (field, template) in [
            ("queues.request_queue_template", &self.queues.request_queue_template),
            ("queues.response_queue_template", &self.queues.response_queue_template),
        ] {
            if !template.contains(STANDARD_PLACEHOLDER) {
                return Err(ConfigurationError::invalid_value(
                    field,
                    template.as_str(),
                    "template must contain {standard}",
                ));
            }
        }
        if self.queues.request_queue_template == self.queues.response_queue_template {
            return Err(ConfigurationError::invalid_value(
                "queues.response_queue_template",
                self.queues.response_queue_template.as_str(),
                "request and response queues must differ",
            ));
        }

        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "monitor.poll_interval_ms",
                "0",
                "poll interval must be greater than 0",
            ));
        }
        if self.monitor.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "monitor.batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }
        if self.monitor.visibility_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "monitor.visibility_timeout_seconds",
                "0",
                "visibility timeout must be greater than 0",
            ));
        }
        if self.monitor.processed_job_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "monitor.processed_job_capacity",
                "0",
                "processed job capacity must be greater than 0",
            ));
        }

        if self.retry.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigurationError::invalid_value(
                "retry.max_retries",
                self.retry.max_retries.to_string(),
                format!("at most {MAX_RETRIES_LIMIT} retries are allowed"),
            ));
        }
        if self.retry.backoff == BackoffStrategy::Exponential
            && self.retry.max_delay_ms < self.retry.delay_ms
        {
            return Err(ConfigurationError::invalid_value(
                "retry.max_delay_ms",
                self.retry.max_delay_ms.to_string(),
                "max delay must not be below the base delay",
            ));
        }

        Ok(())
    }
}
