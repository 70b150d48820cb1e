//! Poll loop shared by the queue monitors.
//!
//! A monitor polls one batch at a time. When a batch handles nothing, or the
//! poll fails, the loop waits one poll interval before trying again. A full
//! batch polls again immediately. Shutdown is a `watch` channel: the loop
//! stops when the flag turns true or every sender is dropped.

use crate::error::OrchestratorResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[async_trait]
pub trait QueueMonitor: Send + Sync {
    /// Name for logs
    fn name(&self) -> String;

    fn poll_interval(&self) -> Duration;

    /// Poll and handle one batch; returns how many messages were handled
    async fn poll_once(&self) -> OrchestratorResult<usize>;
}

/// Drive `monitor` until shutdown is signalled
pub async fn run_until_shutdown<M: QueueMonitor + ?Sized>(
    monitor: &M,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = monitor.name();
    info!(monitor = %name, interval_ms = monitor.poll_interval().as_millis() as u64, "🚀 Starting monitor");

    while !*shutdown.borrow() {
        let idle = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            result = monitor.poll_once() => match result {
                Ok(handled) => handled == 0,
                Err(e) => {
                    error!(monitor = %name, error = %e, "Error polling queue");
                    true
                }
            },
        };

        if idle {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(monitor.poll_interval()) => {}
            }
        }
    }

    info!(monitor = %name, "🛑 Monitor stopped");
}
