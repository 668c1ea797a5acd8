use super::{CompletedTask, TaskAttempt, TaskStatus, WorkTask};
use crate::library::communication::store::ListStore;
use crate::library::communication::TransportError;
use chrono::Utc;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tunable parameters of a [`WorkQueue`]
#[derive(Debug, Clone)]
pub struct WorkQueueConfig {
    /// List key holding pending tasks
    pub queue_key: String,
    /// List key holding dead-lettered tasks
    pub dead_letter_key: String,
    /// Key prefix under which completed-task snapshots are stored
    pub completed_prefix: String,
    /// Number of re-deliveries granted to a failing task before it is quarantined
    pub max_retries: u32,
    /// Upper bound on how long a dequeue blocks waiting for a task
    pub pop_timeout: Duration,
    /// Retention window of completed-task snapshots
    pub completed_ttl: Duration,
}

impl WorkQueueConfig {
    /// Derives the conventional key set for a named channel
    ///
    /// A channel `notifications` uses `queues:notifications` for pending tasks
    /// and `dlq:notifications` for the quarantine area.
    pub fn for_channel(channel: &str) -> Self {
        Self {
            queue_key: format!("queues:{}", channel),
            dead_letter_key: format!("dlq:{}", channel),
            completed_prefix: "completed:".into(),
            max_retries: 3,
            pop_timeout: Duration::from_secs(1),
            completed_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Point-in-time lengths of the pending list and its quarantine area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks waiting to be dequeued
    pub queue_length: usize,
    /// Tasks that exhausted their retry budget
    pub dlq_length: usize,
}

/// FIFO work queue with per-task retry bookkeeping and a dead-letter list
///
/// Mirrors the delivery contract of the [event bus](super::super::event): each
/// task is handed to one dequeuer at a time, failing tasks are re-enqueued a
/// bounded number of times and finally quarantined, completed tasks leave an
/// expiring audit record.
pub struct WorkQueue<S: ListStore> {
    store: S,
    config: WorkQueueConfig,
}

impl<S: ListStore> WorkQueue<S> {
    /// Creates a new instance from raw parts
    pub fn new(store: S, config: WorkQueueConfig) -> Self {
        Self { store, config }
    }

    /// Appends a fresh task around the given payload, returning its identifier
    pub async fn enqueue(&self, payload: Map<String, Value>) -> Result<String, TransportError> {
        let task = WorkTask::new(payload);
        let wire = encode(&task)?;

        self.store.push(&self.config.queue_key, wire).await?;
        info!(task_id = task.task_id.as_str(), "Task enqueued");

        Ok(task.task_id)
    }

    /// Takes the next task off the queue, blocking for at most the configured timeout
    ///
    /// Returns `None` when the timeout elapsed; callers are expected to loop.
    /// A value that does not decode as a task is logged and dropped; the
    /// producer side wrote garbage and there is no meaningful retry for it.
    pub async fn dequeue(&self) -> Result<Option<WorkTask>, TransportError> {
        let value = match self
            .store
            .pop(&self.config.queue_key, self.config.pop_timeout)
            .await?
        {
            Some(value) => value,
            None => return Ok(None),
        };

        match serde_json::from_str::<WorkTask>(&value) {
            Ok(task) => {
                debug!(task_id = task.task_id.as_str(), "Task dequeued");
                Ok(Some(task))
            }
            Err(e) => {
                error!(error = %e, "Dropping undecodable value popped from work queue");
                Ok(None)
            }
        }
    }

    /// Grants a failed task another delivery or quarantines it
    ///
    /// Increments the retry counter; while the budget lasts the task is
    /// re-enqueued with an attempt record and `true` is returned. Once the
    /// budget is exhausted the task is marked failed, pushed onto the
    /// dead-letter list and `false` is returned. Dead-lettered tasks always
    /// carry a retry counter equal to the configured maximum.
    pub async fn mark_as_retry(&self, mut task: WorkTask) -> Result<bool, TransportError> {
        task.retries += 1;

        if task.retries >= self.config.max_retries {
            task.status = Some(TaskStatus::Failed);
            task.failed_at = Some(Utc::now());

            let wire = encode(&task)?;
            self.store.push(&self.config.dead_letter_key, wire).await?;

            warn!(
                task_id = task.task_id.as_str(),
                retries = task.retries,
                "Task moved to the dead-letter list"
            );
            Ok(false)
        } else {
            task.attempts.push(TaskAttempt {
                timestamp: Utc::now(),
                retry_number: task.retries,
            });

            let wire = encode(&task)?;
            self.store.push(&self.config.queue_key, wire).await?;

            info!(
                task_id = task.task_id.as_str(),
                retry = task.retries,
                max = self.config.max_retries,
                "Task re-enqueued"
            );
            Ok(true)
        }
    }

    /// Records a successful task under an expiring per-task key
    ///
    /// The task itself was already removed from the queue by the dequeue.
    pub async fn mark_as_completed(&self, mut task: WorkTask) -> Result<(), TransportError> {
        task.status = Some(TaskStatus::Completed);

        let key = format!("{}{}", self.config.completed_prefix, task.task_id);
        let record = CompletedTask {
            task,
            completed_at: Utc::now(),
        };

        let wire = encode(&record)?;
        self.store
            .put_expiring(&key, wire, self.config.completed_ttl)
            .await?;

        info!(
            task_id = record.task.task_id.as_str(),
            "Task marked as completed"
        );
        Ok(())
    }

    /// Looks up the completion record of a task within its retention window
    pub async fn completed(&self, task_id: &str) -> Result<Option<CompletedTask>, TransportError> {
        let key = format!("{}{}", self.config.completed_prefix, task_id);

        match self.store.fetch(&key).await? {
            Some(wire) => serde_json::from_str(&wire)
                .map(Some)
                .map_err(|e| TransportError::MalformedReply(e.to_string())),
            None => Ok(None),
        }
    }

    /// Point-in-time lengths of the queue and its dead-letter list
    pub async fn stats(&self) -> Result<QueueStats, TransportError> {
        Ok(QueueStats {
            queue_length: self.store.length(&self.config.queue_key).await?,
            dlq_length: self.store.length(&self.config.dead_letter_key).await?,
        })
    }

    /// Reads up to `limit` dead-lettered tasks, newest first
    pub async fn dead_letter_items(&self, limit: usize) -> Result<Vec<WorkTask>, TransportError> {
        let values = self.store.peek(&self.config.dead_letter_key, limit).await?;

        let mut tasks = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_str(&value) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(error = %e, "Skipping undecodable dead-lettered task"),
            }
        }

        Ok(tasks)
    }

    /// Empties the pending list. Administrative operation.
    pub async fn clear(&self) -> Result<(), TransportError> {
        self.store.clear(&self.config.queue_key).await?;
        warn!(queue = self.config.queue_key.as_str(), "Work queue cleared");
        Ok(())
    }

    /// The configuration this queue runs with
    pub fn config(&self) -> &WorkQueueConfig {
        &self.config
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, TransportError> {
    serde_json::to_string(value).map_err(|e| TransportError::MalformedReply(e.to_string()))
}
