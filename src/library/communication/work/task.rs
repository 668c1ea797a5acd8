use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bookkeeping entry for one granted re-delivery of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAttempt {
    /// Instant the re-delivery was granted
    pub timestamp: DateTime<Utc>,
    /// Value of the retry counter after this attempt was recorded
    pub retry_number: u32,
}

/// Terminal state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The task's business action succeeded
    Completed,
    /// The task exhausted its retry budget
    Failed,
}

/// One unit of work travelling through the queue
///
/// Tasks are mutated only by the enqueue/retry/complete operations of the
/// [`WorkQueue`](super::WorkQueue). Two processes never race on the same task
/// because each task is delivered to one dequeuer at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkTask {
    /// Time-derived identifier, unique within practical tolerance
    pub task_id: String,
    /// Opaque payload describing the work
    pub payload: Map<String, Value>,
    /// Number of re-deliveries granted so far
    pub retries: u32,
    /// Instant the task was enqueued
    pub created_at: DateTime<Utc>,
    /// Ordered history of granted re-deliveries
    #[serde(default)]
    pub attempts: Vec<TaskAttempt>,
    /// Terminal state, absent while the task is still in flight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Instant the task was dead-lettered, if it ever was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl WorkTask {
    /// Creates a fresh task around a payload
    pub fn new(payload: Map<String, Value>) -> Self {
        let created_at = Utc::now();

        Self {
            task_id: created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            payload,
            retries: 0,
            created_at,
            attempts: Vec::new(),
            status: None,
            failed_at: None,
        }
    }
}

/// Snapshot of a task that completed successfully, retained for auditing
///
/// Stored under a per-task key with a bounded expiry; not queryable beyond
/// its retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTask {
    /// The task as it looked when its action succeeded
    #[serde(flatten)]
    pub task: WorkTask,
    /// Instant the completion was recorded
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serialize_fresh_tasks_without_terminal_fields() {
        let task = WorkTask::new(Map::new());
        let wire = serde_json::to_value(&task).unwrap();

        assert!(wire.get("status").is_none());
        assert!(wire.get("failed_at").is_none());
        assert_eq!(wire["retries"], 0);
    }

    #[test]
    fn round_trip_terminal_tasks() {
        let mut task = WorkTask::new(Map::new());
        task.retries = 3;
        task.status = Some(TaskStatus::Failed);
        task.failed_at = Some(Utc::now());

        let wire = serde_json::to_string(&task).unwrap();
        let decoded: WorkTask = serde_json::from_str(&wire).unwrap();

        assert_eq!(decoded, task);
        assert!(wire.contains(r#""status":"failed""#));
    }

    #[test]
    fn derive_distinct_time_based_identifiers() {
        let first = WorkTask::new(Map::new());
        std::thread::sleep(std::time::Duration::from_millis(1));
        let second = WorkTask::new(Map::new());

        assert!(first.task_id.starts_with(&first.created_at.format("%Y").to_string()));
        assert_ne!(first.task_id, second.task_id);
    }
}
