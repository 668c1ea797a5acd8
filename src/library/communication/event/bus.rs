use super::{
    read_retries, ConsumerGroupDescriptor, DeadLetter, Event, EventKind, EventRecord,
    HandlerRegistry, FIELD_ERROR, FIELD_FAILED_AT, FIELD_ORIGINAL_ID, FIELD_RETRIES,
};
use crate::library::communication::store::{
    EntryId, FieldMap, LogReader, LogStore, StoredEntry, TopicInfo,
};
use crate::library::communication::{CauseChain, TransportError};
use crate::library::BoxedError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Tunable parameters of an [`EventBus`]
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Number of re-deliveries granted to a failing entry before it is quarantined
    pub max_retries: u32,
    /// Dead-letter topic shared across all event kinds
    pub dead_letter_topic: String,
    /// Upper bound on how long one consume iteration blocks waiting for entries
    pub block: Duration,
    /// Pause before the consume loop retries after a transport failure
    pub retry_pause: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            dead_letter_topic: "events:dead-letter".into(),
            block: Duration::from_secs(1),
            retry_pause: Duration::from_secs(2),
        }
    }
}

/// Publish/subscribe event bus with consumer groups, bounded retries and a dead-letter topic
///
/// Each event kind lives on its own topic of the backing [`LogStore`]. The bus
/// publishes single atomic appends, delivers entries to the
/// [handlers](super::EventHandler) of a [`HandlerRegistry`] and applies the
/// at-least-once contract: acknowledged on success, re-appended with a bumped
/// retry counter on failure, quarantined once the budget is exhausted.
pub struct EventBus<S: LogStore, K: EventKind> {
    store: S,
    registry: Arc<HandlerRegistry<K>>,
    config: BusConfig,
}

impl<S: LogStore, K: EventKind> EventBus<S, K> {
    /// Creates a new instance from raw parts
    pub fn new(store: S, registry: Arc<HandlerRegistry<K>>, config: BusConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Publishes an event as one durable entry on its kind's topic
    ///
    /// The stored retry counter starts at zero. Store failures surface to the
    /// caller; nothing is ever partially written.
    pub async fn publish(&self, event: &Event<K>) -> Result<EntryId, TransportError> {
        let topic = event.kind().topic();
        let record = EventRecord::new(event.clone());

        let id = self.store.append(&topic, &record.to_fields()).await?;
        info!(kind = event.kind().key(), %id, "Event published");

        Ok(id)
    }

    /// Consumes the topic of one event kind on behalf of a consumer group, indefinitely
    ///
    /// Ensures the group exists (idempotent), then repeatedly performs bounded
    /// blocking reads of up to `batch_size` entries and delivers each one to
    /// the registered handlers in subscription order.
    ///
    /// Failed deliveries are retried by re-appending a copy with a bumped
    /// retry counter and acknowledging the original. This keeps the pending
    /// set clean but means an entry changes its position in the topic on every
    /// retry: FIFO order across retries is deliberately not preserved, only
    /// "eventually delivered or dead-lettered" is guaranteed.
    ///
    /// Transport failures never terminate the loop; they are logged and the
    /// read is retried after a short pause.
    pub async fn consume(
        &self,
        kind: K,
        group: &ConsumerGroupDescriptor,
        consumer: &str,
        batch_size: usize,
    ) -> crate::library::EmptyResult {
        let topic = kind.topic();
        info!(
            topic = topic.as_str(),
            group = group.identifier().to_string().as_str(),
            consumer,
            "Consuming event topic"
        );

        loop {
            if let Err(e) = self.store.ensure_group(&topic, group).await {
                warn!(error = %e, topic = topic.as_str(), "Unable to ensure consumer group");
                sleep(self.config.retry_pause).await;
                continue;
            }

            let mut reader = match self.store.reader(&topic, group, consumer).await {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(error = %e, topic = topic.as_str(), "Unable to open topic reader");
                    sleep(self.config.retry_pause).await;
                    continue;
                }
            };

            loop {
                match reader.next_batch(batch_size, self.config.block).await {
                    Ok(batch) => {
                        for entry in batch {
                            self.deliver(&topic, group, entry).await;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, topic = topic.as_str(), "Reading from topic failed");
                        sleep(self.config.retry_pause).await;
                        break;
                    }
                }
            }
        }
    }

    /// Runs one delivery attempt for a single entry
    async fn deliver(&self, topic: &str, group: &ConsumerGroupDescriptor, entry: StoredEntry) {
        let outcome: Result<(), BoxedError> = match EventRecord::<K>::from_fields(&entry.fields) {
            Ok(record) => self.registry.dispatch(record.event()).await,
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) => {
                debug!(id = entry.id.as_str(), topic, "Entry processed");
                self.acknowledge(topic, group, &entry.id).await;
            }
            Err(cause) => self.handle_failure(topic, group, entry, cause).await,
        }
    }

    /// Applies the retry-or-quarantine decision after a failed delivery attempt
    ///
    /// Operates on the raw field map so that even entries which failed to
    /// decode (poison input) run through the same bounded retry budget.
    async fn handle_failure(
        &self,
        topic: &str,
        group: &ConsumerGroupDescriptor,
        entry: StoredEntry,
        cause: BoxedError,
    ) {
        let retries = read_retries(&entry.fields);
        let description = CauseChain::from_boxed(&cause).to_string();

        if retries < self.config.max_retries {
            let mut fields = entry.fields.clone();
            fields.insert(FIELD_RETRIES.into(), (retries + 1).to_string());

            match self.store.append(topic, &fields).await {
                Ok(new_id) => {
                    warn!(
                        id = entry.id.as_str(),
                        new_id = new_id.as_str(),
                        retry = retries + 1,
                        max = self.config.max_retries,
                        error = description.as_str(),
                        "Delivery failed, entry re-appended for retry"
                    );
                    self.acknowledge(topic, group, &entry.id).await;
                }
                Err(e) => {
                    // Leaving the original unacknowledged keeps it pending for re-delivery
                    warn!(
                        id = entry.id.as_str(),
                        error = %e,
                        "Unable to re-append failed entry, it stays pending"
                    );
                }
            }
        } else {
            let mut fields = entry.fields.clone();
            fields.insert(FIELD_ORIGINAL_ID.into(), entry.id.clone());
            fields.insert(FIELD_ERROR.into(), description.clone());
            fields.insert(FIELD_FAILED_AT.into(), Utc::now().to_rfc3339());

            match self.store.append(&self.config.dead_letter_topic, &fields).await {
                Ok(dlq_id) => {
                    error!(
                        id = entry.id.as_str(),
                        dlq_id = dlq_id.as_str(),
                        error = description.as_str(),
                        "Entry exhausted its retry budget and was dead-lettered"
                    );
                    self.acknowledge(topic, group, &entry.id).await;
                }
                Err(e) => {
                    warn!(
                        id = entry.id.as_str(),
                        error = %e,
                        "Unable to dead-letter entry, it stays pending"
                    );
                }
            }
        }
    }

    async fn acknowledge(&self, topic: &str, group: &ConsumerGroupDescriptor, id: &str) {
        if let Err(e) = self.store.acknowledge(topic, group, id).await {
            warn!(id, error = %e, "Unable to acknowledge entry");
        }
    }

    /// Reads up to `count` quarantined events, oldest first
    pub async fn dead_letters(&self, count: usize) -> Result<Vec<DeadLetter<K>>, TransportError> {
        let entries = self
            .store
            .range(&self.config.dead_letter_topic, count)
            .await?;

        let mut letters = Vec::with_capacity(entries.len());
        for entry in &entries {
            match DeadLetter::from_entry(entry) {
                Ok(letter) => letters.push(letter),
                Err(e) => warn!(id = entry.id.as_str(), error = %e, "Skipping undecodable dead letter"),
            }
        }

        Ok(letters)
    }

    /// Returns a quarantined event to the topic of the given kind
    ///
    /// Strips the failure metadata, resets the retry counter to zero,
    /// re-appends the entry and deletes it from the dead-letter topic.
    /// Returns `None` without touching anything when the id is unknown.
    pub async fn reprocess_dead_letter(
        &self,
        id: &str,
        kind: &K,
    ) -> Result<Option<EntryId>, TransportError> {
        let entry = match self.store.entry(&self.config.dead_letter_topic, id).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let mut fields: FieldMap = entry.fields;
        fields.remove(FIELD_ORIGINAL_ID);
        fields.remove(FIELD_ERROR);
        fields.remove(FIELD_FAILED_AT);
        fields.insert(FIELD_RETRIES.into(), "0".into());

        let new_id = self.store.append(&kind.topic(), &fields).await?;
        self.store
            .remove(&self.config.dead_letter_topic, id)
            .await?;

        info!(%id, new_id = new_id.as_str(), "Dead letter returned to its topic");
        Ok(Some(new_id))
    }

    /// Deletes every quarantined event. Irreversible.
    pub async fn clear_dead_letters(&self) -> Result<(), TransportError> {
        self.store
            .remove_topic(&self.config.dead_letter_topic)
            .await?;
        info!("Dead-letter topic cleared");
        Ok(())
    }

    /// Retrieves topic-level statistics for one event kind
    pub async fn topic_info(&self, kind: &K) -> Result<TopicInfo, TransportError> {
        self.store.topic_info(&kind.topic()).await
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::event::EventHandler;
    use crate::library::communication::implementation::memory::{MemoryLogReader, MemoryLogStore};
    use crate::library::EmptyResult;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum MockKind {
        Ping,
    }

    impl EventKind for MockKind {
        fn key(&self) -> &'static str {
            "ping"
        }

        fn parse(key: &str) -> Option<Self> {
            (key == "ping").then(|| Self::Ping)
        }
    }

    struct CountingHandler {
        invocations: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler<MockKind> for CountingHandler {
        async fn handle(&self, _event: &Event<MockKind>) -> EmptyResult {
            self.invocations.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                Err("handler refused the event".into())
            } else {
                Ok(())
            }
        }
    }

    fn fast_config() -> BusConfig {
        BusConfig {
            block: Duration::from_millis(10),
            retry_pause: Duration::from_millis(10),
            ..BusConfig::default()
        }
    }

    fn bus_with_handler(
        store: MemoryLogStore,
        fail: bool,
    ) -> (Arc<EventBus<MemoryLogStore, MockKind>>, Arc<AtomicUsize>) {
        let invocations = Arc::new(AtomicUsize::new(0));

        let mut registry = HandlerRegistry::new();
        registry.subscribe(
            MockKind::Ping,
            Box::new(CountingHandler {
                invocations: invocations.clone(),
                fail,
            }),
        );

        let bus = Arc::new(EventBus::new(store, Arc::new(registry), fast_config()));
        (bus, invocations)
    }

    fn sample_event() -> Event<MockKind> {
        let mut data = Map::new();
        data.insert("x".into(), Value::from(1));
        Event::new(MockKind::Ping, "42", "sample", data)
    }

    fn spawn_consumer(
        bus: &Arc<EventBus<MemoryLogStore, MockKind>>,
    ) -> tokio::task::JoinHandle<crate::library::EmptyResult> {
        let bus = bus.clone();
        tokio::spawn(async move {
            let group = ConsumerGroupDescriptor::default();
            bus.consume(MockKind::Ping, &group, "test-consumer", 10).await
        })
    }

    async fn eventually<F: Fn() -> bool>(condition: F) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition was not reached in time");
    }

    #[tokio::test]
    async fn acknowledge_successful_deliveries_exactly_once() {
        let store = MemoryLogStore::new();
        let (bus, invocations) = bus_with_handler(store, false);

        bus.publish(&sample_event()).await.unwrap();
        let consumer = spawn_consumer(&bus);

        eventually(|| invocations.load(Ordering::SeqCst) == 1).await;
        sleep(Duration::from_millis(50)).await;

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert!(bus.dead_letters(10).await.unwrap().is_empty());

        consumer.abort();
    }

    #[tokio::test]
    async fn dead_letter_failing_events_after_the_retry_budget() {
        let store = MemoryLogStore::new();
        let (bus, invocations) = bus_with_handler(store, true);

        bus.publish(&sample_event()).await.unwrap();
        let consumer = spawn_consumer(&bus);

        let letters = timeout(Duration::from_secs(5), async {
            loop {
                let letters = bus.dead_letters(10).await.unwrap();
                if !letters.is_empty() {
                    break letters;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("event never reached the dead-letter topic");
        consumer.abort();

        // Initial delivery plus one per granted retry
        assert_eq!(invocations.load(Ordering::SeqCst), 4);

        let letter = &letters[0];
        assert_eq!(letter.record.retries(), 3);
        assert_eq!(letter.record.event().aggregate_id(), "42");
        assert_eq!(letter.record.event().data()["x"], Value::from(1));
        assert!(!letter.error.is_empty());

        // Original entry plus the three retry copies stay on the topic
        let info = bus.topic_info(&MockKind::Ping).await.unwrap();
        assert_eq!(info.length, 4);
    }

    #[tokio::test]
    async fn reprocess_dead_letters_back_onto_their_topic() {
        let store = MemoryLogStore::new();
        let (failing_bus, _) = bus_with_handler(store.clone(), true);

        failing_bus.publish(&sample_event()).await.unwrap();
        let consumer = spawn_consumer(&failing_bus);

        let letters = timeout(Duration::from_secs(5), async {
            loop {
                let letters = failing_bus.dead_letters(10).await.unwrap();
                if !letters.is_empty() {
                    break letters;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        consumer.abort();

        // A recovered handler picks the reset entry up without re-quarantining it
        let (bus, invocations) = bus_with_handler(store.clone(), false);
        let new_id = bus
            .reprocess_dead_letter(&letters[0].id, &MockKind::Ping)
            .await
            .unwrap()
            .expect("dead letter was not found");

        assert!(bus.dead_letters(10).await.unwrap().is_empty());

        let reset = store
            .entry(&MockKind::Ping.topic(), &new_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reset.fields[FIELD_RETRIES], "0");
        assert!(!reset.fields.contains_key(FIELD_ERROR));
        assert!(!reset.fields.contains_key(FIELD_ORIGINAL_ID));

        let consumer = spawn_consumer(&bus);
        eventually(|| invocations.load(Ordering::SeqCst) >= 1).await;
        sleep(Duration::from_millis(50)).await;

        assert!(bus.dead_letters(10).await.unwrap().is_empty());
        consumer.abort();
    }

    #[tokio::test]
    async fn report_missing_dead_letters_as_a_no_op() {
        let store = MemoryLogStore::new();
        let (bus, _) = bus_with_handler(store, false);

        let outcome = bus
            .reprocess_dead_letter("7-0", &MockKind::Ping)
            .await
            .unwrap();
        assert_eq!(outcome, None);
    }

    #[tokio::test]
    async fn clear_the_dead_letter_topic() {
        let store = MemoryLogStore::new();
        let (bus, _) = bus_with_handler(store.clone(), true);

        bus.publish(&sample_event()).await.unwrap();
        let consumer = spawn_consumer(&bus);

        timeout(Duration::from_secs(5), async {
            while bus.dead_letters(1).await.unwrap().is_empty() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("event never reached the dead-letter topic");
        consumer.abort();

        bus.clear_dead_letters().await.unwrap();
        assert!(bus.dead_letters(10).await.unwrap().is_empty());
    }

    struct DownStore;

    #[async_trait]
    impl LogStore for DownStore {
        type Reader = MemoryLogReader;

        async fn append(
            &self,
            _topic: &str,
            _fields: &FieldMap,
        ) -> Result<EntryId, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn ensure_group(
            &self,
            _topic: &str,
            _group: &ConsumerGroupDescriptor,
        ) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn reader(
            &self,
            _topic: &str,
            _group: &ConsumerGroupDescriptor,
            _consumer: &str,
        ) -> Result<Self::Reader, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn acknowledge(
            &self,
            _topic: &str,
            _group: &ConsumerGroupDescriptor,
            _id: &str,
        ) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn range(
            &self,
            _topic: &str,
            _count: usize,
        ) -> Result<Vec<StoredEntry>, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn entry(
            &self,
            _topic: &str,
            _id: &str,
        ) -> Result<Option<StoredEntry>, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn remove(&self, _topic: &str, _id: &str) -> Result<bool, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn remove_topic(&self, _topic: &str) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn topic_info(&self, _topic: &str) -> Result<TopicInfo, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn surface_transport_failures_to_the_publisher() {
        let bus = EventBus::new(
            DownStore,
            Arc::new(HandlerRegistry::<MockKind>::new()),
            fast_config(),
        );

        assert!(matches!(
            bus.publish(&sample_event()).await,
            Err(TransportError::Unavailable(_))
        ));
    }
}
