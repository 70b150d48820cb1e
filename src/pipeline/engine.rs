//! # Pipeline Engine
//!
//! Executes a tree of [`PipelineNode`]s against a shared context.
//!
//! A node may carry its own unit of work, a skip predicate, a retry budget and
//! any number of children. Execution of one node:
//!
//! 1. If the predicate (or the work's own `should_execute`) says no, the node
//!    is `NotRun` and counts as not failed.
//! 2. The work runs, retried up to the node's attempt budget while it fails.
//!    A returned error is propagated when `throw_on_error` is set and is
//!    otherwise captured as a `Failed` result.
//! 3. If the work failed, children do not run.
//! 4. Children run in declared order (or concurrently for parallel nodes). A
//!    failed required child stops the remaining siblings unless
//!    `continue_on_failure` is set.
//!
//! A node succeeds iff its work (if any) and every required child that ran
//! succeeded or was skipped.

use super::errors::{PipelineError, PipelineResult};
use super::node::{Node, NodeResult, NodeStatus};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub type Predicate<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Keep running siblings after a required child fails
    pub continue_on_failure: bool,
    /// Propagate node errors instead of capturing them as failed results
    pub throw_on_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRetry {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for NodeRetry {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExecution {
    Sequential,
    Parallel,
}

pub struct PipelineNode<C: Send + Sync> {
    name: String,
    work: Option<Arc<dyn Node<C>>>,
    predicate: Option<Predicate<C>>,
    retry: NodeRetry,
    children: Vec<PipelineNode<C>>,
    child_execution: ChildExecution,
    options: Option<ExecutionOptions>,
    required: bool,
}

impl<C: Send + Sync> fmt::Debug for PipelineNode<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineNode")
            .field("name", &self.name)
            .field("has_work", &self.work.is_some())
            .field("retry", &self.retry)
            .field("child_execution", &self.child_execution)
            .field("options", &self.options)
            .field("required", &self.required)
            .field("children", &self.children)
            .finish()
    }
}

impl<C: Send + Sync> PipelineNode<C> {
    /// A node without work of its own that runs its children
    pub fn composite(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            work: None,
            predicate: None,
            retry: NodeRetry::default(),
            children: Vec::new(),
            child_execution: ChildExecution::Sequential,
            options: None,
            required: true,
        }
    }

    /// A node running `work`, named after it
    pub fn leaf(work: impl Node<C> + 'static) -> Self {
        let name = work.name().to_string();
        Self {
            work: Some(Arc::new(work)),
            ..Self::composite(name)
        }
    }

    pub fn with_predicate(mut self, predicate: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with_retry(mut self, retry: NodeRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Options for this subtree; unset nodes inherit their parent's
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn parallel(mut self) -> Self {
        self.child_execution = ChildExecution::Parallel;
        self
    }

    /// Failure of this node does not fail its parent
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn child(mut self, child: PipelineNode<C>) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = PipelineNode<C>>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Run the tree rooted at this node
    pub async fn execute(&self, context: &C) -> PipelineResult<NodeResult> {
        self.run(context, ExecutionOptions::default()).await
    }

    fn run<'a>(
        &'a self,
        context: &'a C,
        inherited: ExecutionOptions,
    ) -> BoxFuture<'a, PipelineResult<NodeResult>> {
        async move {
            let options = self.options.unwrap_or(inherited);

            if !self.should_execute(context).await {
                debug!(node = %self.name, "⏭️ Skipping node");
                return Ok(NodeResult::not_run());
            }

            let mut result = match &self.work {
                Some(work) => self.run_work(work.as_ref(), context, options).await?,
                None => NodeResult::succeeded(),
            };

            if result.is_failed() {
                result.failed_nodes.insert(0, self.name.clone());
                return Ok(result);
            }

            let child_results = match self.child_execution {
                ChildExecution::Sequential => self.run_sequential(context, options).await?,
                ChildExecution::Parallel => self.run_parallel(context, options).await?,
            };

            for (child, child_result) in child_results {
                if child_result.is_failed() && child.required {
                    result.status = NodeStatus::Failed;
                    if result.error.is_none() {
                        result.error = child_result.error.clone();
                    }
                    result.failed_nodes.extend(child_result.failed_nodes);
                }
            }

            if result.is_failed() {
                debug!(node = %self.name, failed = ?result.failed_nodes, "Node subtree failed");
            }
            Ok(result)
        }
        .boxed()
    }

    async fn should_execute(&self, context: &C) -> bool {
        if let Some(predicate) = &self.predicate {
            if !predicate(context) {
                return false;
            }
        }
        match &self.work {
            Some(work) => work.should_execute(context).await,
            None => true,
        }
    }

    async fn run_work(
        &self,
        work: &dyn Node<C>,
        context: &C,
        options: ExecutionOptions,
    ) -> PipelineResult<NodeResult> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last = NodeResult::failed(format!("{} did not run", self.name));

        for attempt in 1..=attempts {
            match work.execute(context).await {
                Ok(result) if !result.is_failed() => return Ok(result),
                Ok(result) => {
                    warn!(node = %self.name, attempt, error = ?result.error, "⚠️ Node failed");
                    last = result;
                }
                Err(e) => {
                    warn!(node = %self.name, attempt, error = %e, "⚠️ Node raised an error");
                    if attempt == attempts && options.throw_on_error {
                        return Err(e);
                    }
                    last = NodeResult::failed(e.to_string());
                }
            }

            if attempt < attempts && !self.retry.delay.is_zero() {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        Ok(last)
    }

    async fn run_sequential(
        &self,
        context: &C,
        options: ExecutionOptions,
    ) -> PipelineResult<Vec<(&PipelineNode<C>, NodeResult)>> {
        let mut results = Vec::with_capacity(self.children.len());
        for child in &self.children {
            let result = child.run(context, options).await?;
            let stop = result.is_failed() && child.required && !options.continue_on_failure;
            results.push((child, result));
            if stop {
                debug!(node = %self.name, child = %child.name, "Stopping after failed child");
                break;
            }
        }
        Ok(results)
    }

    async fn run_parallel(
        &self,
        context: &C,
        options: ExecutionOptions,
    ) -> PipelineResult<Vec<(&PipelineNode<C>, NodeResult)>> {
        let outcomes = join_all(self.children.iter().map(|child| child.run(context, options))).await;
        self.children
            .iter()
            .zip(outcomes)
            .map(|(child, outcome)| outcome.map(|result| (child, result)))
            .collect()
    }
}

/// Run a tree and turn a failed outcome into [`PipelineError::PipelineFailed`]
pub async fn execute_required<C: Send + Sync>(
    root: &PipelineNode<C>,
    context: &C,
) -> PipelineResult<NodeResult> {
    let result = root.execute(context).await?;
    if result.is_failed() {
        return Err(PipelineError::PipelineFailed {
            pipeline: root.name().to_string(),
            failed_nodes: result.failed_nodes,
        });
    }
    Ok(result)
}
