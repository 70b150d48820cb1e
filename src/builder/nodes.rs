//! Builder pipeline steps. Each step calls one external operation through the
//! retry policy and records what it produced on the [`BuildContext`].

use super::context::{BuildContext, BuilderServices};
use crate::clients::ServiceError;
use crate::pipeline::{Node, NodeResult, PipelineError, PipelineResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

fn service_failure(node: &str, error: ServiceError) -> PipelineError {
    PipelineError::node(node, error.to_string())
}

fn missing(node: &str, what: &str) -> PipelineError {
    PipelineError::invalid_context(node, format!("{what} is not available yet"))
}

macro_rules! builder_node {
    ($name:ident, $label:literal) => {
        pub struct $name {
            services: Arc<BuilderServices>,
        }

        impl $name {
            pub const NAME: &'static str = $label;

            pub fn new(services: Arc<BuilderServices>) -> Self {
                Self { services }
            }
        }
    };
}

builder_node!(CreateBatchNode, "create-batch");
builder_node!(FetchProductsNode, "fetch-products");
builder_node!(CreateWorkspaceNode, "create-workspace");
builder_node!(AddContentNode, "add-content");
builder_node!(SignNode, "sign");
builder_node!(ExtractNode, "extract");
builder_node!(UploadNode, "upload");
builder_node!(CommitNode, "commit");

#[async_trait]
impl Node<BuildContext> for CreateBatchNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    // A redelivered request may already carry its batch
    async fn should_execute(&self, context: &BuildContext) -> bool {
        context.batch_id().is_none()
    }

    async fn execute(&self, context: &BuildContext) -> PipelineResult<NodeResult> {
        let request = &context.request;
        let batch_id = self
            .services
            .retry
            .execute("create_batch", || {
                self.services
                    .file_share
                    .create_batch(request.data_standard, &request.job_id)
            })
            .await
            .map_err(|e| service_failure(Self::NAME, e))?;

        debug!(job_id = %request.job_id, batch_id = %batch_id, "📦 Batch created");
        context.update(|p| p.batch_id = batch_id.clone());
        Ok(NodeResult::succeeded_with(batch_id.as_str()))
    }
}

#[async_trait]
impl Node<BuildContext> for FetchProductsNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &BuildContext) -> PipelineResult<NodeResult> {
        let request = &context.request;
        if request.products.is_empty() {
            return Ok(NodeResult::failed("no products to build"));
        }
        let files = self
            .services
            .retry
            .execute("search_products", || {
                self.services
                    .file_share
                    .search(request.data_standard, &request.products)
            })
            .await
            .map_err(|e| service_failure(Self::NAME, e))?;

        if files.is_empty() {
            return Ok(NodeResult::failed("no product files found"));
        }
        let count = files.len();
        context.update(|p| p.files = files);
        Ok(NodeResult::succeeded_with(format!("{count} files")))
    }
}

#[async_trait]
impl Node<BuildContext> for CreateWorkspaceNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &BuildContext) -> PipelineResult<NodeResult> {
        let request = &context.request;
        let workspace = self
            .services
            .retry
            .execute("create_workspace", || {
                self.services
                    .tool
                    .create_workspace(&request.job_id, request.data_standard)
            })
            .await
            .map_err(|e| service_failure(Self::NAME, e))?;

        context.update(|p| p.workspace = Some(workspace.clone()));
        Ok(NodeResult::succeeded_with(workspace))
    }
}

#[async_trait]
impl Node<BuildContext> for AddContentNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &BuildContext) -> PipelineResult<NodeResult> {
        let progress = context.progress();
        let workspace = progress
            .workspace
            .ok_or_else(|| missing(Self::NAME, "workspace"))?;
        let files = progress.files;

        self.services
            .retry
            .execute("add_content", || self.services.tool.add_content(&workspace, &files))
            .await
            .map_err(|e| service_failure(Self::NAME, e))?;
        Ok(NodeResult::succeeded())
    }
}

#[async_trait]
impl Node<BuildContext> for SignNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &BuildContext) -> PipelineResult<NodeResult> {
        let workspace = context
            .workspace()
            .ok_or_else(|| missing(Self::NAME, "workspace"))?;

        self.services
            .retry
            .execute("sign", || self.services.tool.sign(&workspace))
            .await
            .map_err(|e| service_failure(Self::NAME, e))?;
        Ok(NodeResult::succeeded())
    }
}

#[async_trait]
impl Node<BuildContext> for ExtractNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &BuildContext) -> PipelineResult<NodeResult> {
        let workspace = context
            .workspace()
            .ok_or_else(|| missing(Self::NAME, "workspace"))?;

        let archive = self
            .services
            .retry
            .execute("extract", || self.services.tool.extract(&workspace))
            .await
            .map_err(|e| service_failure(Self::NAME, e))?;

        if archive.is_empty() {
            return Ok(NodeResult::failed("exchange set archive is empty"));
        }
        context.update(|p| p.archive = Some(archive));
        Ok(NodeResult::succeeded())
    }
}

#[async_trait]
impl Node<BuildContext> for UploadNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &BuildContext) -> PipelineResult<NodeResult> {
        let progress = context.progress();
        if progress.batch_id.is_none() {
            return Err(missing(Self::NAME, "batch"));
        }
        let archive = progress
            .archive
            .ok_or_else(|| missing(Self::NAME, "archive"))?;
        let file_name = format!(
            "{}-{}.zip",
            context.request.data_standard, context.request.job_id
        );

        self.services
            .retry
            .execute("add_file", || {
                self.services
                    .file_share
                    .add_file(&progress.batch_id, &file_name, archive.clone())
            })
            .await
            .map_err(|e| service_failure(Self::NAME, e))?;
        Ok(NodeResult::succeeded_with(file_name))
    }
}

#[async_trait]
impl Node<BuildContext> for CommitNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &BuildContext) -> PipelineResult<NodeResult> {
        let batch_id = context.batch_id();
        if batch_id.is_none() {
            return Err(missing(Self::NAME, "batch"));
        }

        self.services
            .retry
            .execute("commit_batch", || self.services.file_share.commit_batch(&batch_id))
            .await
            .map_err(|e| service_failure(Self::NAME, e))?;

        context.update(|p| p.committed = true);
        Ok(NodeResult::succeeded_with(batch_id.as_str()))
    }
}
