//! Notification pipeline of the platform
//!
//! Bundles everything the notifications domain needs into one process: the
//! event consumers which translate platform events into notification work
//! items, the queue worker dispatching them, and the dead-letter monitor
//! keeping an eye on the quarantine area.

mod dispatch;
mod handlers;
mod options;

use crate::constants::NOTIFICATION_CHANNEL;
use crate::domain::{EventType, RecipientPolicy, StaticRecipients};
use crate::harness::{
    ConsumerRunner, DummyResourceHandleProvider, Heart, Module, MonitorRunner, RedisBroker,
    WorkerRunner,
};
use crate::library::communication::event::{BusConfig, ConsumerGroupDescriptor, HandlerRegistry};
use crate::library::communication::work::{WorkQueue, WorkQueueConfig};
use crate::library::BoxedError;
use async_trait::async_trait;
use dispatch::NotificationDispatchService;
use handlers::{
    AccountCreatedHandler, TaskAssignedHandler, TaskCompletedHandler, TaskCreatedHandler,
    TaskUpdatedHandler,
};
use jatsl::{schedule, JobScheduler};
use std::sync::Arc;
use tracing::{debug, instrument};

pub use options::Options;

/// Module implementation
pub struct Notifier {
    options: Options,
}

impl Notifier {
    /// Creates a new instance from raw parts
    pub fn new(options: Options) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Module for Notifier {
    #[instrument(skip(self, scheduler))]
    async fn run(&mut self, scheduler: &JobScheduler) -> Result<Option<Heart>, BoxedError> {
        let redis_url = self.options.redis.url.clone();
        let consumer = self.options.queueing.instance_id();
        let queue_config = WorkQueueConfig::for_channel(NOTIFICATION_CHANNEL);

        // Handler-side queue access runs outside job supervision; a failing
        // enqueue fails the delivery attempt and follows the bus retry path
        let broker = RedisBroker::new(redis_url.clone(), DummyResourceHandleProvider::new());
        let queue = Arc::new(WorkQueue::new(broker.list_store(), queue_config.clone()));

        let policy: Arc<dyn RecipientPolicy> = Arc::new(StaticRecipients::new(
            self.options.admin_recipients.clone(),
        ));

        let mut registry = HandlerRegistry::new();
        registry.subscribe(
            EventType::TaskCreated,
            Box::new(TaskCreatedHandler::new(queue.clone())),
        );
        registry.subscribe(
            EventType::TaskAssigned,
            Box::new(TaskAssignedHandler::new(queue.clone())),
        );
        registry.subscribe(
            EventType::TaskUpdated,
            Box::new(TaskUpdatedHandler::new(queue.clone(), policy.clone())),
        );
        registry.subscribe(
            EventType::TaskCompleted,
            Box::new(TaskCompletedHandler::new(queue.clone(), policy)),
        );
        registry.subscribe(EventType::AccountCreated, Box::new(AccountCreatedHandler::new()));
        let registry = Arc::new(registry);

        let task_created = self.consumer(EventType::TaskCreated, &consumer, &registry);
        let task_assigned = self.consumer(EventType::TaskAssigned, &consumer, &registry);
        let task_updated = self.consumer(EventType::TaskUpdated, &consumer, &registry);
        let task_completed = self.consumer(EventType::TaskCompleted, &consumer, &registry);
        let account_created = self.consumer(EventType::AccountCreated, &consumer, &registry);

        let (heart, heart_stone) = Heart::new();
        let worker = WorkerRunner::<NotificationDispatchService>::new(
            redis_url.clone(),
            queue_config.clone(),
            (),
            heart_stone,
        );
        let monitor = MonitorRunner::new(redis_url, queue_config);

        debug!("Scheduling jobs");
        schedule!(scheduler, {
            task_created,
            task_assigned,
            task_updated,
            task_completed,
            account_created,
            worker,
            monitor
        });

        Ok(Some(heart))
    }
}

impl Notifier {
    fn consumer(
        &self,
        kind: EventType,
        consumer: &str,
        registry: &Arc<HandlerRegistry<EventType>>,
    ) -> ConsumerRunner<EventType> {
        ConsumerRunner::new(
            self.options.redis.url.clone(),
            kind,
            ConsumerGroupDescriptor::default(),
            consumer.to_owned(),
            registry.clone(),
            BusConfig::default(),
        )
    }
}
