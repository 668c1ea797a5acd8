use super::{HeartStone, RedisBroker};
use crate::constants::CONSUMER_BATCH_SIZE;
use crate::library::communication::event::{
    BusConfig, ConsumerGroupDescriptor, EventBus, EventKind, HandlerRegistry,
};
use crate::library::communication::work::{
    DeadLetterMonitor, MonitorConfig, QueueWorker, WorkProcessor, WorkQueue, WorkQueueConfig,
    WorkerConfig,
};
use crate::library::EmptyResult;
use async_trait::async_trait;
use jatsl::{Job, JobManager};
use std::sync::Arc;
use tracing::error;

/// Structure which can be instantiated with a broker handle
///
/// Used by the runners below to build their service instance only once the
/// supervised job executes, so that every (re)start works on fresh,
/// job-monitored connections.
pub trait BrokerService {
    /// Name of the service displayed in log messages
    const NAME: &'static str;
    /// Instance type which will be instantiated
    type Instance: Send + Sync;
    /// Configuration type passed to the service
    type Config: Send + Sync;

    /// Creates a new instance from the broker handle and configuration
    fn instantiate(broker: &RedisBroker, config: &Self::Config) -> Self::Instance;
}

/// Job consuming the topic of one event kind on behalf of a consumer group
///
/// Restarted by the supervisor whenever one of its connections dies; the
/// consume loop itself additionally retries transport failures in place.
pub struct ConsumerRunner<K: EventKind> {
    redis_url: String,
    kind: K,
    group: ConsumerGroupDescriptor,
    consumer: String,
    registry: Arc<HandlerRegistry<K>>,
    config: BusConfig,
}

impl<K: EventKind> ConsumerRunner<K> {
    /// Creates a new runner job which will connect to the given redis server
    /// and consume the kind's topic with the provided group and consumer name
    pub fn new(
        redis_url: String,
        kind: K,
        group: ConsumerGroupDescriptor,
        consumer: String,
        registry: Arc<HandlerRegistry<K>>,
        config: BusConfig,
    ) -> Self {
        Self {
            redis_url,
            kind,
            group,
            consumer,
            registry,
            config,
        }
    }
}

#[async_trait]
impl<K: EventKind> Job for ConsumerRunner<K> {
    const NAME: &'static str = "ConsumerRunner";

    fn name(&self) -> String {
        format!("{}({})", Self::NAME, self.kind.key())
    }

    async fn execute(&self, manager: JobManager) -> EmptyResult {
        let broker = RedisBroker::new(self.redis_url.clone(), Arc::new(manager.clone()));
        let bus = EventBus::new(broker.log_store(), self.registry.clone(), self.config.clone());

        manager.ready().await;

        bus.consume(
            self.kind.clone(),
            &self.group,
            &self.consumer,
            CONSUMER_BATCH_SIZE,
        )
        .await
    }
}

/// Job draining a work queue with a [`BrokerService`] processor
///
/// When the worker's circuit breaker trips, the job kills the module's
/// [`Heart`](super::Heart) instead of letting the supervisor restart it.
/// Crossing the consecutive-failure threshold is a fatal condition requiring
/// operator intervention.
pub struct WorkerRunner<S: BrokerService> {
    redis_url: String,
    queue_config: WorkQueueConfig,
    worker_config: WorkerConfig,
    service_config: S::Config,
    heart_stone: HeartStone,
}

impl<S: BrokerService> WorkerRunner<S> {
    /// Creates a new runner job from raw parts
    pub fn new(
        redis_url: String,
        queue_config: WorkQueueConfig,
        service_config: S::Config,
        heart_stone: HeartStone,
    ) -> Self {
        Self {
            redis_url,
            queue_config,
            worker_config: WorkerConfig::default(),
            service_config,
            heart_stone,
        }
    }
}

#[async_trait]
impl<S> Job for WorkerRunner<S>
where
    S: BrokerService + Send + Sync,
    S::Instance: WorkProcessor,
{
    const NAME: &'static str = "WorkerRunner";

    fn name(&self) -> String {
        format!("{}({})", Self::NAME, S::NAME)
    }

    async fn execute(&self, manager: JobManager) -> EmptyResult {
        let broker = RedisBroker::new(self.redis_url.clone(), Arc::new(manager.clone()));
        let queue = Arc::new(WorkQueue::new(
            broker.list_store(),
            self.queue_config.clone(),
        ));
        let processor = S::instantiate(&broker, &self.service_config);
        let worker = QueueWorker::new(queue, processor, self.worker_config.clone());

        manager.ready().await;

        if let Err(e) = worker.run().await {
            error!(error = %e, "Worker loop terminated fatally");
            self.heart_stone.clone().kill(e.to_string()).await;
        }

        Ok(())
    }
}

/// Job polling a work queue's dead-letter list for observability
pub struct MonitorRunner {
    redis_url: String,
    queue_config: WorkQueueConfig,
    monitor_config: MonitorConfig,
}

impl MonitorRunner {
    /// Creates a new runner job from raw parts
    pub fn new(redis_url: String, queue_config: WorkQueueConfig) -> Self {
        Self {
            redis_url,
            queue_config,
            monitor_config: MonitorConfig::default(),
        }
    }
}

#[async_trait]
impl Job for MonitorRunner {
    const NAME: &'static str = "MonitorRunner";

    async fn execute(&self, manager: JobManager) -> EmptyResult {
        let broker = RedisBroker::new(self.redis_url.clone(), Arc::new(manager.clone()));
        let queue = Arc::new(WorkQueue::new(
            broker.list_store(),
            self.queue_config.clone(),
        ));
        let monitor = DeadLetterMonitor::new(queue, self.monitor_config.clone());

        manager.ready().await;

        monitor.run().await
    }
}
