use crate::clients::{ExchangeSetToolClient, FileShareClient, ProductFile, RetryPolicy};
use crate::messaging::BuildRequest;
use crate::models::BatchId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Services a builder pipeline calls
#[derive(Debug, Clone)]
pub struct BuilderServices {
    pub file_share: Arc<dyn FileShareClient>,
    pub tool: Arc<dyn ExchangeSetToolClient>,
    pub retry: RetryPolicy,
}

/// What the pipeline has produced so far
#[derive(Debug, Clone, Default)]
pub struct BuildProgress {
    pub batch_id: BatchId,
    pub files: Vec<ProductFile>,
    pub workspace: Option<String>,
    pub archive: Option<Vec<u8>>,
    pub committed: bool,
}

/// Shared state of one build run
pub struct BuildContext {
    pub request: BuildRequest,
    progress: Mutex<BuildProgress>,
}

impl BuildContext {
    pub fn new(request: BuildRequest) -> Self {
        let progress = BuildProgress {
            batch_id: request.batch_id.clone(),
            ..BuildProgress::default()
        };
        Self {
            request,
            progress: Mutex::new(progress),
        }
    }

    pub fn progress(&self) -> BuildProgress {
        self.progress.lock().clone()
    }

    pub fn batch_id(&self) -> BatchId {
        self.progress.lock().batch_id.clone()
    }

    pub fn workspace(&self) -> Option<String> {
        self.progress.lock().workspace.clone()
    }

    pub(crate) fn update(&self, apply: impl FnOnce(&mut BuildProgress)) {
        apply(&mut self.progress.lock());
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("job_id", &self.request.job_id)
            .field("data_standard", &self.request.data_standard)
            .field("progress", &*self.progress.lock())
            .finish()
    }
}
