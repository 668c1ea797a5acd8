use super::WorkQueue;
use crate::library::communication::store::ListStore;
use crate::library::EmptyResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, trace, warn};

/// Tunable parameters of a [`DeadLetterMonitor`]
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pause between two inspections
    pub interval: Duration,
    /// Number of dead-lettered tasks reported per inspection
    pub limit: usize,
    /// Pause after a transport failure
    pub error_pause: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            limit: 5,
            error_pause: Duration::from_secs(10),
        }
    }
}

/// Observability loop polling a work queue's dead-letter list
///
/// Strictly read-only; it reports quarantined tasks on a fixed interval and
/// never mutates the list.
pub struct DeadLetterMonitor<S: ListStore> {
    queue: Arc<WorkQueue<S>>,
    config: MonitorConfig,
}

impl<S: ListStore> DeadLetterMonitor<S> {
    /// Creates a new instance from raw parts
    pub fn new(queue: Arc<WorkQueue<S>>, config: MonitorConfig) -> Self {
        Self { queue, config }
    }

    /// Runs the inspection loop indefinitely
    pub async fn run(&self) -> EmptyResult {
        loop {
            match self.queue.dead_letter_items(self.config.limit).await {
                Ok(tasks) if tasks.is_empty() => trace!("Dead-letter list is empty"),
                Ok(tasks) => {
                    warn!(count = tasks.len(), "Dead-lettered tasks awaiting intervention");
                    for task in tasks {
                        warn!(
                            task_id = task.task_id.as_str(),
                            retries = task.retries,
                            "Dead-lettered task"
                        );
                    }
                }
                Err(e) => {
                    error!(error = %e, "Unable to inspect dead-letter list");
                    sleep(self.config.error_pause).await;
                    continue;
                }
            }

            sleep(self.config.interval).await;
        }
    }
}
