use super::{WorkQueue, WorkTask};
use crate::library::communication::store::ListStore;
use crate::library::communication::CauseChain;
use crate::library::EmptyResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// The single business action a [`QueueWorker`] executes per task
///
/// Returning an error counts against the task's bounded retry budget; it does
/// not affect the worker's circuit breaker, which only watches infrastructure
/// failures.
#[async_trait]
pub trait WorkProcessor: Send + Sync {
    /// Executes the action against the task's payload
    async fn process(&self, task: &WorkTask) -> EmptyResult;
}

/// Tunable parameters of a [`QueueWorker`]
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Consecutive infrastructure failures after which the worker gives up
    pub failure_threshold: u32,
    /// Pause after an infrastructure failure
    pub failure_pause: Duration,
    /// Pause after an empty dequeue before the next attempt
    pub idle_pause: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            failure_pause: Duration::from_secs(2),
            idle_pause: Duration::from_secs(1),
        }
    }
}

/// Fatal conditions that terminate a worker loop
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The circuit breaker tripped
    ///
    /// Repeated infrastructure failure is indistinguishable from poison-pill
    /// looping at this layer, so the loop stops instead of retrying forever.
    /// Requires operator intervention.
    #[error("worker stopped after {0} consecutive infrastructure failures")]
    TooManyFailures(u32),
}

/// Process loop draining a [`WorkQueue`]
///
/// Dequeues one task at a time (bounded blocking, so shutdown stays
/// observable), runs the [`WorkProcessor`] against it and reports the outcome
/// back to the queue: completion record on success, bounded retry or
/// dead-letter on failure. A consecutive-failure counter across iterations
/// (not tied to any single task) acts as a circuit breaker against broker
/// outages and terminates the loop once it reaches the configured threshold.
pub struct QueueWorker<S: ListStore, P: WorkProcessor> {
    queue: Arc<WorkQueue<S>>,
    processor: P,
    config: WorkerConfig,
}

impl<S: ListStore, P: WorkProcessor> QueueWorker<S, P> {
    /// Creates a new instance from raw parts
    pub fn new(queue: Arc<WorkQueue<S>>, processor: P, config: WorkerConfig) -> Self {
        Self {
            queue,
            processor,
            config,
        }
    }

    /// Runs the drain loop until the circuit breaker trips
    pub async fn run(&self) -> Result<(), WorkerError> {
        let mut consecutive_failures = 0u32;

        info!(
            queue = self.queue.config().queue_key.as_str(),
            "Starting queue worker"
        );

        loop {
            match self.queue.dequeue().await {
                Ok(Some(task)) => match self.processor.process(&task).await {
                    Ok(()) => match self.queue.mark_as_completed(task).await {
                        Ok(()) => consecutive_failures = 0,
                        Err(e) => {
                            consecutive_failures += 1;
                            error!(
                                error = %e,
                                consecutive_failures,
                                "Unable to record task completion"
                            );
                            sleep(self.config.failure_pause).await;
                        }
                    },
                    Err(cause) => {
                        let description = CauseChain::from_boxed(&cause).to_string();
                        warn!(
                            task_id = task.task_id.as_str(),
                            error = description.as_str(),
                            "Task processing failed"
                        );

                        match self.queue.mark_as_retry(task).await {
                            Ok(true) => consecutive_failures = 0,
                            Ok(false) => {
                                error!("Task exhausted its retry budget and was dead-lettered");
                                consecutive_failures = 0;
                            }
                            Err(e) => {
                                consecutive_failures += 1;
                                error!(
                                    error = %e,
                                    consecutive_failures,
                                    "Unable to hand failed task back to the queue"
                                );
                                sleep(self.config.failure_pause).await;
                            }
                        }
                    }
                },
                Ok(None) => {
                    debug!("Queue empty");
                    sleep(self.config.idle_pause).await;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    error!(error = %e, consecutive_failures, "Unable to dequeue");
                    sleep(self.config.failure_pause).await;
                }
            }

            if consecutive_failures >= self.config.failure_threshold {
                error!(
                    consecutive_failures,
                    "Too many consecutive failures, stopping worker"
                );
                return Err(WorkerError::TooManyFailures(consecutive_failures));
            }
        }
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::implementation::memory::MemoryListStore;
    use crate::library::communication::store::ListStore;
    use crate::library::communication::work::{TaskStatus, WorkQueueConfig};
    use crate::library::communication::TransportError;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value};
    use tokio::time::timeout;

    struct StubProcessor {
        fail: bool,
    }

    #[async_trait]
    impl WorkProcessor for StubProcessor {
        async fn process(&self, _task: &WorkTask) -> EmptyResult {
            if self.fail {
                Err("business action failed".into())
            } else {
                Ok(())
            }
        }
    }

    fn queue() -> Arc<WorkQueue<MemoryListStore>> {
        let mut config = WorkQueueConfig::for_channel("notifications");
        config.pop_timeout = Duration::from_millis(10);

        Arc::new(WorkQueue::new(MemoryListStore::new(), config))
    }

    fn fast_worker_config() -> WorkerConfig {
        WorkerConfig {
            failure_threshold: 10,
            failure_pause: Duration::from_millis(1),
            idle_pause: Duration::from_millis(1),
        }
    }

    fn payload() -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("user_id".into(), Value::from(7));
        payload
    }

    #[tokio::test]
    async fn record_completions_and_drain_the_queue() {
        let queue = queue();
        let task_id = queue.enqueue(payload()).await.unwrap();

        let worker_queue = queue.clone();
        let worker = tokio::spawn(async move {
            QueueWorker::new(worker_queue, StubProcessor { fail: false }, fast_worker_config())
                .run()
                .await
        });

        timeout(Duration::from_secs(5), async {
            while queue.completed(&task_id).await.unwrap().is_none() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("completion record never appeared");
        worker.abort();

        let record = queue.completed(&task_id).await.unwrap().unwrap();
        assert_eq!(record.task.status, Some(TaskStatus::Completed));
        assert_eq!(queue.stats().await.unwrap().queue_length, 0);
        assert_eq!(queue.stats().await.unwrap().dlq_length, 0);
    }

    #[tokio::test]
    async fn dead_letter_tasks_whose_action_keeps_failing() {
        let queue = queue();
        queue.enqueue(payload()).await.unwrap();

        let worker_queue = queue.clone();
        let worker = tokio::spawn(async move {
            QueueWorker::new(worker_queue, StubProcessor { fail: true }, fast_worker_config())
                .run()
                .await
        });

        timeout(Duration::from_secs(5), async {
            while queue.stats().await.unwrap().dlq_length == 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("task never reached the dead-letter list");
        worker.abort();

        let quarantined = queue.dead_letter_items(10).await.unwrap();
        assert_eq!(quarantined[0].retries, 3);
        assert_eq!(quarantined[0].status, Some(TaskStatus::Failed));
        assert_eq!(queue.stats().await.unwrap().queue_length, 0);
    }

    struct DownListStore;

    #[async_trait]
    impl ListStore for DownListStore {
        async fn push(&self, _key: &str, _value: String) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn pop(
            &self,
            _key: &str,
            _timeout: Duration,
        ) -> Result<Option<String>, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn length(&self, _key: &str) -> Result<usize, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn peek(&self, _key: &str, _limit: usize) -> Result<Vec<String>, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn clear(&self, _key: &str) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn put_expiring(
            &self,
            _key: &str,
            _value: String,
            _ttl: Duration,
        ) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn fetch(&self, _key: &str) -> Result<Option<String>, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn trip_the_circuit_breaker_on_persistent_infrastructure_failure() {
        let queue = Arc::new(WorkQueue::new(
            DownListStore,
            WorkQueueConfig::for_channel("notifications"),
        ));

        let config = WorkerConfig {
            failure_threshold: 3,
            failure_pause: Duration::from_millis(1),
            idle_pause: Duration::from_millis(1),
        };

        let outcome = QueueWorker::new(queue, StubProcessor { fail: false }, config)
            .run()
            .await;

        assert!(matches!(outcome, Err(WorkerError::TooManyFailures(3))));
    }
}
