//! # Exchange Set Builders
//!
//! Builder workflows for the three data standards. All three share one tree
//! shape; the node set for a standard is picked by [`BuilderNodeSet`]:
//!
//! ```text
//! build-{standard}
//! ├── create-batch        (skipped when the request already carries a batch)
//! ├── prepare             (parallel)
//! │   ├── fetch-products
//! │   └── create-workspace
//! ├── add-content
//! ├── sign                (S-100 and S-63 only)
//! ├── extract
//! ├── upload
//! └── commit
//! ```

pub mod context;
pub mod nodes;

pub use context::{BuildContext, BuildProgress, BuilderServices};

use crate::messaging::{BuildRequest, BuildResponse};
use crate::models::DataStandard;
use crate::pipeline::{NodeRetry, PipelineNode};
use async_trait::async_trait;
use nodes::{
    AddContentNode, CommitNode, CreateBatchNode, CreateWorkspaceNode, ExtractNode,
    FetchProductsNode, SignNode, UploadNode,
};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Node set of one data standard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderNodeSet {
    S100,
    S57,
    S63,
}

impl BuilderNodeSet {
    pub fn for_standard(data_standard: DataStandard) -> Self {
        match data_standard {
            DataStandard::S100 => Self::S100,
            DataStandard::S57 => Self::S57,
            DataStandard::S63 => Self::S63,
        }
    }

    pub fn data_standard(&self) -> DataStandard {
        match self {
            Self::S100 => DataStandard::S100,
            Self::S57 => DataStandard::S57,
            Self::S63 => DataStandard::S63,
        }
    }

    /// S-57 exchange sets are published unsigned
    pub fn signs_exchange_set(&self) -> bool {
        !matches!(self, Self::S57)
    }

    pub fn pipeline(&self, services: Arc<BuilderServices>) -> PipelineNode<BuildContext> {
        let prepare = PipelineNode::composite("prepare")
            .parallel()
            .child(PipelineNode::leaf(FetchProductsNode::new(services.clone())))
            .child(PipelineNode::leaf(CreateWorkspaceNode::new(services.clone())));

        let mut root = PipelineNode::composite(format!("build-{}", self.data_standard()))
            .child(PipelineNode::leaf(CreateBatchNode::new(services.clone())))
            .child(prepare)
            .child(PipelineNode::leaf(AddContentNode::new(services.clone())));

        if self.signs_exchange_set() {
            root = root.child(PipelineNode::leaf(SignNode::new(services.clone())));
        }

        root.child(PipelineNode::leaf(ExtractNode::new(services.clone())))
            .child(
                PipelineNode::leaf(UploadNode::new(services.clone())).with_retry(NodeRetry {
                    max_attempts: 2,
                    delay: Duration::from_secs(1),
                }),
            )
            .child(PipelineNode::leaf(CommitNode::new(services)))
    }
}

/// Runs the build for one request and reports the outcome
#[async_trait]
pub trait BuildRunner: Send + Sync + Debug {
    async fn run(&self, request: &BuildRequest) -> BuildResponse;
}

/// Builder backed by the per-standard pipelines
pub struct ExchangeSetBuilder {
    pipelines: HashMap<DataStandard, PipelineNode<BuildContext>>,
}

impl ExchangeSetBuilder {
    pub fn new(services: BuilderServices) -> Self {
        let services = Arc::new(services);
        let pipelines = DataStandard::ALL
            .into_iter()
            .map(|ds| (ds, BuilderNodeSet::for_standard(ds).pipeline(services.clone())))
            .collect();
        Self { pipelines }
    }

    pub fn pipeline(&self, data_standard: DataStandard) -> Option<&PipelineNode<BuildContext>> {
        self.pipelines.get(&data_standard)
    }
}

impl Debug for ExchangeSetBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSetBuilder")
            .field("pipelines", &self.pipelines.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl BuildRunner for ExchangeSetBuilder {
    #[instrument(skip(self, request), fields(job_id = %request.job_id, data_standard = %request.data_standard))]
    async fn run(&self, request: &BuildRequest) -> BuildResponse {
        let context = BuildContext::new(request.clone());
        let Some(pipeline) = self.pipelines.get(&request.data_standard) else {
            warn!("No builder pipeline registered");
            return BuildResponse::failed(request, context.batch_id());
        };

        match pipeline.execute(&context).await {
            Ok(result) if !result.is_failed() => {
                info!(batch_id = %context.batch_id(), "✅ Exchange set built");
                BuildResponse::success(request, context.batch_id())
            }
            Ok(result) => {
                warn!(failed = ?result.failed_nodes, error = ?result.error, "❌ Exchange set build failed");
                BuildResponse::failed(request, context.batch_id())
            }
            Err(e) => {
                warn!(error = %e, "❌ Exchange set build raised an error");
                BuildResponse::failed(request, context.batch_id())
            }
        }
    }
}
