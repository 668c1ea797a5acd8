use crate::domain::{EventType, NotificationRequest};
use crate::harness::{BrokerService, MonitoredRedisFactory, RedisBroker};
use crate::library::communication::event::{BusConfig, Event, EventBus, HandlerRegistry};
use crate::library::communication::implementation::redis::RedisLogStore;
use crate::library::communication::store::LogStore;
use crate::library::communication::work::{WorkProcessor, WorkTask};
use crate::library::EmptyResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// The queue worker's single business action: deliver one notification
///
/// Delivery towards the user-facing store is a collaborator concern; this
/// process announces the outcome on the event bus so interested services can
/// react. An undeliverable payload is a business failure of the task and runs
/// through the queue's bounded retry budget.
pub struct NotificationDispatcher<S: LogStore> {
    events: EventBus<S, EventType>,
}

impl<S: LogStore> NotificationDispatcher<S> {
    /// Creates a new instance publishing outcomes on the given bus
    pub fn new(events: EventBus<S, EventType>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl<S: LogStore> WorkProcessor for NotificationDispatcher<S> {
    async fn process(&self, task: &WorkTask) -> EmptyResult {
        match NotificationRequest::from_payload(&task.payload) {
            Ok(request) => {
                info!(
                    user_id = request.user_id,
                    title = request.title.as_str(),
                    "Notification dispatched"
                );

                let mut data = Map::new();
                data.insert("user_id".into(), Value::from(request.user_id));
                data.insert("title".into(), Value::from(request.title));

                let event =
                    Event::new(EventType::NotificationSent, task.task_id.clone(), "notification", data);
                self.events.publish(&event).await?;

                Ok(())
            }
            Err(cause) => {
                let mut data = Map::new();
                data.insert("error".into(), Value::from(cause.to_string()));

                let event = Event::new(
                    EventType::NotificationFailed,
                    task.task_id.clone(),
                    "notification",
                    data,
                );

                // Best effort announcement, the task failure itself is what gets retried
                if let Err(e) = self.events.publish(&event).await {
                    warn!(error = %e, "Unable to announce failed notification");
                }

                Err(cause.into())
            }
        }
    }
}

/// [`BrokerService`] wiring for the [`NotificationDispatcher`]
pub struct NotificationDispatchService;

impl BrokerService for NotificationDispatchService {
    const NAME: &'static str = "NotificationDispatchService";

    type Instance = NotificationDispatcher<RedisLogStore<MonitoredRedisFactory>>;
    type Config = ();

    fn instantiate(broker: &RedisBroker, _config: &Self::Config) -> Self::Instance {
        let events = EventBus::new(
            broker.log_store(),
            Arc::new(HandlerRegistry::new()),
            BusConfig::default(),
        );

        NotificationDispatcher::new(events)
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::event::EventKind;
    use crate::library::communication::implementation::memory::MemoryLogStore;
    use pretty_assertions::assert_eq;

    fn dispatcher(store: MemoryLogStore) -> NotificationDispatcher<MemoryLogStore> {
        NotificationDispatcher::new(EventBus::new(
            store,
            Arc::new(HandlerRegistry::new()),
            BusConfig::default(),
        ))
    }

    #[tokio::test]
    async fn announce_dispatched_notifications() {
        let store = MemoryLogStore::new();
        let dispatcher = dispatcher(store.clone());

        let request = NotificationRequest::new(7, "t", "m");
        let task = WorkTask::new(request.into_payload());

        dispatcher.process(&task).await.unwrap();

        let announced = store
            .range(&EventType::NotificationSent.topic(), 10)
            .await
            .unwrap();
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].fields["aggregate_id"], task.task_id);
    }

    #[tokio::test]
    async fn fail_tasks_with_an_undeliverable_payload() {
        let store = MemoryLogStore::new();
        let dispatcher = dispatcher(store.clone());

        let task = WorkTask::new(Map::new());

        assert!(dispatcher.process(&task).await.is_err());

        let announced = store
            .range(&EventType::NotificationFailed.topic(), 10)
            .await
            .unwrap();
        assert_eq!(announced.len(), 1);
    }
}
