use super::errors::PipelineResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Skipped by its predicate, or never reached
    NotRun,
    Succeeded,
    Failed,
}

/// Outcome of one node (and, for composites, its subtree)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: NodeStatus,
    /// What the node produced, e.g. a batch id
    pub subject: Option<String>,
    pub error: Option<String>,
    /// Names of the failed nodes in this subtree, depth first
    #[serde(default)]
    pub failed_nodes: Vec<String>,
}

impl NodeResult {
    pub fn succeeded() -> Self {
        Self {
            status: NodeStatus::Succeeded,
            subject: None,
            error: None,
            failed_nodes: Vec::new(),
        }
    }

    pub fn succeeded_with(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::succeeded()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Failed,
            subject: None,
            error: Some(error.into()),
            failed_nodes: Vec::new(),
        }
    }

    pub fn not_run() -> Self {
        Self {
            status: NodeStatus::NotRun,
            subject: None,
            error: None,
            failed_nodes: Vec::new(),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == NodeStatus::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        self.status == NodeStatus::Failed
    }
}

/// A unit of work in a pipeline tree
///
/// Nodes share state through the context, which is borrowed immutably; contexts
/// hold their mutable parts behind locks.
#[async_trait]
pub trait Node<C: Send + Sync>: Send + Sync {
    fn name(&self) -> &str;

    /// Skip this node (without failing) when false
    async fn should_execute(&self, _context: &C) -> bool {
        true
    }

    async fn execute(&self, context: &C) -> PipelineResult<NodeResult>;
}
