use crate::domain::{
    AccountId, EventType, NotificationRequest, PlatformEvent, RecipientPolicy,
};
use crate::library::communication::event::EventHandler;
use crate::library::communication::store::ListStore;
use crate::library::communication::work::WorkQueue;
use crate::library::EmptyResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

fn title_of(event: &PlatformEvent) -> &str {
    event
        .data()
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("a task")
}

/// Enqueues one notification per worker assigned to a freshly created task
pub struct TaskCreatedHandler<S: ListStore> {
    queue: Arc<WorkQueue<S>>,
}

impl<S: ListStore> TaskCreatedHandler<S> {
    pub fn new(queue: Arc<WorkQueue<S>>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl<S: ListStore> EventHandler<EventType> for TaskCreatedHandler<S> {
    async fn handle(&self, event: &PlatformEvent) -> EmptyResult {
        let worker_ids: Vec<AccountId> = event
            .data()
            .get("worker_ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();

        debug!(
            task = event.aggregate_id(),
            workers = worker_ids.len(),
            "Task created"
        );

        for worker_id in worker_ids {
            let request = NotificationRequest::new(
                worker_id,
                "New task",
                format!("New task assigned: {}", title_of(event)),
            );
            self.queue.enqueue(request.into_payload()).await?;
        }

        Ok(())
    }
}

/// Enqueues a notification for the worker a task was assigned to
pub struct TaskAssignedHandler<S: ListStore> {
    queue: Arc<WorkQueue<S>>,
}

impl<S: ListStore> TaskAssignedHandler<S> {
    pub fn new(queue: Arc<WorkQueue<S>>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl<S: ListStore> EventHandler<EventType> for TaskAssignedHandler<S> {
    async fn handle(&self, event: &PlatformEvent) -> EmptyResult {
        let worker_id = event
            .data()
            .get("worker_id")
            .and_then(Value::as_i64)
            .ok_or("task-assigned event carries no worker_id")?;

        let message = event
            .data()
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Task assigned to you");

        let request = NotificationRequest::new(worker_id, "Task assigned", message);
        self.queue.enqueue(request.into_payload()).await?;

        Ok(())
    }
}

/// Notifies the configured audience about a task update
pub struct TaskUpdatedHandler<S: ListStore> {
    queue: Arc<WorkQueue<S>>,
    policy: Arc<dyn RecipientPolicy>,
}

impl<S: ListStore> TaskUpdatedHandler<S> {
    pub fn new(queue: Arc<WorkQueue<S>>, policy: Arc<dyn RecipientPolicy>) -> Self {
        Self { queue, policy }
    }
}

#[async_trait]
impl<S: ListStore> EventHandler<EventType> for TaskUpdatedHandler<S> {
    async fn handle(&self, event: &PlatformEvent) -> EmptyResult {
        let message = format!("Task updated: {}", title_of(event));

        for recipient in self.policy.update_audience(event) {
            let request = NotificationRequest::new(recipient, "Task updated", message.clone());
            self.queue.enqueue(request.into_payload()).await?;
        }

        Ok(())
    }
}

/// Notifies the configured audience about a completed task
pub struct TaskCompletedHandler<S: ListStore> {
    queue: Arc<WorkQueue<S>>,
    policy: Arc<dyn RecipientPolicy>,
}

impl<S: ListStore> TaskCompletedHandler<S> {
    pub fn new(queue: Arc<WorkQueue<S>>, policy: Arc<dyn RecipientPolicy>) -> Self {
        Self { queue, policy }
    }
}

#[async_trait]
impl<S: ListStore> EventHandler<EventType> for TaskCompletedHandler<S> {
    async fn handle(&self, event: &PlatformEvent) -> EmptyResult {
        let worker = event
            .data()
            .get("worker_id")
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".into());

        let message = format!("Task completed by worker {}", worker);

        for recipient in self.policy.completion_audience(event) {
            let request = NotificationRequest::new(recipient, "Task completed", message.clone());
            self.queue.enqueue(request.into_payload()).await?;
        }

        Ok(())
    }
}

/// Takes note of new accounts
///
/// No notification is sent; the event is only surfaced in the logs.
pub struct AccountCreatedHandler;

impl AccountCreatedHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler<EventType> for AccountCreatedHandler {
    async fn handle(&self, event: &PlatformEvent) -> EmptyResult {
        let email = event
            .data()
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>");

        info!(account = event.aggregate_id(), email, "New account created");
        Ok(())
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::domain::StaticRecipients;
    use crate::library::communication::event::Event;
    use crate::library::communication::implementation::memory::MemoryListStore;
    use crate::library::communication::work::WorkQueueConfig;
    use pretty_assertions::assert_eq;
    use serde_json::Map;
    use std::time::Duration;

    fn queue() -> Arc<WorkQueue<MemoryListStore>> {
        let mut config = WorkQueueConfig::for_channel("notifications");
        config.pop_timeout = Duration::from_millis(10);

        Arc::new(WorkQueue::new(MemoryListStore::new(), config))
    }

    async fn next_request(queue: &WorkQueue<MemoryListStore>) -> NotificationRequest {
        let task = queue.dequeue().await.unwrap().unwrap();
        NotificationRequest::from_payload(&task.payload).unwrap()
    }

    #[tokio::test]
    async fn enqueue_one_notification_per_assigned_worker() {
        let queue = queue();
        let handler = TaskCreatedHandler::new(queue.clone());

        let mut data = Map::new();
        data.insert("title".into(), Value::from("Fix the gate"));
        data.insert("worker_ids".into(), Value::from(vec![1, 2]));
        let event = Event::new(EventType::TaskCreated, "11", "task", data);

        handler.handle(&event).await.unwrap();
        assert_eq!(queue.stats().await.unwrap().queue_length, 2);

        let first = next_request(&queue).await;
        assert_eq!(first.user_id, 1);
        assert_eq!(first.message, "New task assigned: Fix the gate");

        assert_eq!(next_request(&queue).await.user_id, 2);
    }

    #[tokio::test]
    async fn ignore_created_tasks_without_workers() {
        let queue = queue();
        let handler = TaskCreatedHandler::new(queue.clone());

        let event = Event::new(EventType::TaskCreated, "11", "task", Map::new());

        handler.handle(&event).await.unwrap();
        assert_eq!(queue.stats().await.unwrap().queue_length, 0);
    }

    #[tokio::test]
    async fn address_the_assigned_worker() {
        let queue = queue();
        let handler = TaskAssignedHandler::new(queue.clone());

        let mut data = Map::new();
        data.insert("worker_id".into(), Value::from(7));
        data.insert("message".into(), Value::from("Please handle this today"));
        let event = Event::new(EventType::TaskAssigned, "11", "task", data);

        handler.handle(&event).await.unwrap();

        let request = next_request(&queue).await;
        assert_eq!(request.user_id, 7);
        assert_eq!(request.message, "Please handle this today");
    }

    #[tokio::test]
    async fn fail_assignments_without_a_worker() {
        let queue = queue();
        let handler = TaskAssignedHandler::new(queue.clone());

        let event = Event::new(EventType::TaskAssigned, "11", "task", Map::new());

        assert!(handler.handle(&event).await.is_err());
        assert_eq!(queue.stats().await.unwrap().queue_length, 0);
    }

    #[tokio::test]
    async fn notify_the_configured_audience_about_updates() {
        let queue = queue();
        let policy = Arc::new(StaticRecipients::new(vec![1, 9]));
        let handler = TaskUpdatedHandler::new(queue.clone(), policy);

        let mut data = Map::new();
        data.insert("title".into(), Value::from("Fix the gate"));
        let event = Event::new(EventType::TaskUpdated, "11", "task", data);

        handler.handle(&event).await.unwrap();
        assert_eq!(queue.stats().await.unwrap().queue_length, 2);

        let first = next_request(&queue).await;
        assert_eq!(first.user_id, 1);
        assert_eq!(first.message, "Task updated: Fix the gate");
        assert_eq!(next_request(&queue).await.user_id, 9);
    }

    #[tokio::test]
    async fn name_the_finishing_worker_in_completion_notices() {
        let queue = queue();
        let policy = Arc::new(StaticRecipients::new(vec![1]));
        let handler = TaskCompletedHandler::new(queue.clone(), policy);

        let mut data = Map::new();
        data.insert("worker_id".into(), Value::from(5));
        let event = Event::new(EventType::TaskCompleted, "11", "task", data);

        handler.handle(&event).await.unwrap();

        let request = next_request(&queue).await;
        assert_eq!(request.message, "Task completed by worker 5");
    }
}
