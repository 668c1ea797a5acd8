use crate::library::communication::event::{ConsumerGroupDescriptor, QueueLocation};
use crate::library::communication::store::{
    EntryId, FieldMap, LogReader, LogStore, StoredEntry, TopicInfo,
};
use crate::library::communication::TransportError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Default)]
struct Group {
    cursor: usize,
    pending: Vec<EntryId>,
}

#[derive(Default)]
struct Topic {
    next_seq: u64,
    entries: Vec<StoredEntry>,
    groups: HashMap<String, Group>,
}

impl Topic {
    fn group(&mut self, name: &str, start: &QueueLocation) -> &mut Group {
        let cursor = match start {
            QueueLocation::Head => 0,
            QueueLocation::Tail => self.entries.len(),
        };

        self.groups
            .entry(name.to_owned())
            .or_insert_with(|| Group {
                cursor,
                pending: Vec::new(),
            })
    }
}

/// In-process [`LogStore`] implementation
#[derive(Default, Clone)]
pub struct MemoryLogStore {
    state: Arc<Mutex<HashMap<String, Topic>>>,
}

impl MemoryLogStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    type Reader = MemoryLogReader;

    async fn append(&self, topic: &str, fields: &FieldMap) -> Result<EntryId, TransportError> {
        let mut state = self.state.lock().unwrap();
        let topic = state.entry(topic.to_owned()).or_default();

        topic.next_seq += 1;
        let id = format!("{}-0", topic.next_seq);
        topic.entries.push(StoredEntry {
            id: id.clone(),
            fields: fields.clone(),
        });

        Ok(id)
    }

    async fn ensure_group(
        &self,
        topic: &str,
        group: &ConsumerGroupDescriptor,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state
            .entry(topic.to_owned())
            .or_default()
            .group(&group.identifier().to_string(), group.start());

        Ok(())
    }

    async fn reader(
        &self,
        topic: &str,
        group: &ConsumerGroupDescriptor,
        _consumer: &str,
    ) -> Result<Self::Reader, TransportError> {
        let group_name = group.identifier().to_string();

        let replay = {
            let mut state = self.state.lock().unwrap();
            let topic_state = state.entry(topic.to_owned()).or_default();
            let group_state = topic_state.group(&group_name, group.start());
            group_state.pending.iter().cloned().collect()
        };

        Ok(MemoryLogReader {
            store: self.clone(),
            topic: topic.to_owned(),
            group: group_name,
            replay,
        })
    }

    async fn acknowledge(
        &self,
        topic: &str,
        group: &ConsumerGroupDescriptor,
        id: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();

        if let Some(topic) = state.get_mut(topic) {
            if let Some(group) = topic.groups.get_mut(&group.identifier().to_string()) {
                group.pending.retain(|pending| pending != id);
            }
        }

        Ok(())
    }

    async fn range(&self, topic: &str, count: usize) -> Result<Vec<StoredEntry>, TransportError> {
        let state = self.state.lock().unwrap();

        Ok(state
            .get(topic)
            .map(|topic| topic.entries.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn entry(
        &self,
        topic: &str,
        id: &str,
    ) -> Result<Option<StoredEntry>, TransportError> {
        let state = self.state.lock().unwrap();

        Ok(state
            .get(topic)
            .and_then(|topic| topic.entries.iter().find(|entry| entry.id == id).cloned()))
    }

    async fn remove(&self, topic: &str, id: &str) -> Result<bool, TransportError> {
        let mut state = self.state.lock().unwrap();

        let topic = match state.get_mut(topic) {
            Some(topic) => topic,
            None => return Ok(false),
        };

        let length_before = topic.entries.len();
        topic.entries.retain(|entry| entry.id != id);

        for group in topic.groups.values_mut() {
            group.pending.retain(|pending| pending != id);
        }

        Ok(topic.entries.len() < length_before)
    }

    async fn remove_topic(&self, topic: &str) -> Result<(), TransportError> {
        self.state.lock().unwrap().remove(topic);
        Ok(())
    }

    async fn topic_info(&self, topic: &str) -> Result<TopicInfo, TransportError> {
        let state = self.state.lock().unwrap();

        Ok(state
            .get(topic)
            .map(|topic| TopicInfo {
                length: topic.entries.len(),
                first_entry: topic.entries.first().map(|entry| entry.id.clone()),
                last_entry: topic.entries.last().map(|entry| entry.id.clone()),
            })
            .unwrap_or(TopicInfo {
                length: 0,
                first_entry: None,
                last_entry: None,
            }))
    }
}

/// Reader handle produced by [`MemoryLogStore::reader`]
///
/// Re-delivers the group's pending entries first (crash recovery), then polls
/// the shared state for new entries until the block timeout elapses.
pub struct MemoryLogReader {
    store: MemoryLogStore,
    topic: String,
    group: String,
    replay: VecDeque<EntryId>,
}

impl MemoryLogReader {
    fn drain_replay(&mut self, count: usize) -> Vec<StoredEntry> {
        let state = self.store.state.lock().unwrap();
        let topic = match state.get(&self.topic) {
            Some(topic) => topic,
            None => return Vec::new(),
        };

        let mut batch = Vec::new();
        while batch.len() < count {
            let id = match self.replay.pop_front() {
                Some(id) => id,
                None => break,
            };

            let still_pending = topic
                .groups
                .get(&self.group)
                .map(|group| group.pending.contains(&id))
                .unwrap_or(false);

            if still_pending {
                if let Some(entry) = topic.entries.iter().find(|entry| entry.id == id) {
                    batch.push(entry.clone());
                }
            }
        }

        batch
    }

    fn take_new(&self, count: usize) -> Vec<StoredEntry> {
        let mut state = self.store.state.lock().unwrap();
        let topic = match state.get_mut(&self.topic) {
            Some(topic) => topic,
            None => return Vec::new(),
        };

        let entries = &topic.entries;
        let group = match topic.groups.get_mut(&self.group) {
            Some(group) => group,
            None => return Vec::new(),
        };

        let available = entries.len().saturating_sub(group.cursor);
        let taking = available.min(count);

        let batch: Vec<StoredEntry> = entries[group.cursor..group.cursor + taking].to_vec();
        group.cursor += taking;
        group.pending.extend(batch.iter().map(|entry| entry.id.clone()));

        batch
    }
}

#[async_trait]
impl LogReader for MemoryLogReader {
    async fn next_batch(
        &mut self,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StoredEntry>, TransportError> {
        if !self.replay.is_empty() {
            let batch = self.drain_replay(count);
            if !batch.is_empty() {
                return Ok(batch);
            }
        }

        let deadline = Instant::now() + block;
        loop {
            let batch = self.take_new(count);
            if !batch.is_empty() {
                return Ok(batch);
            }

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields(marker: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("marker".into(), marker.into());
        fields
    }

    #[tokio::test]
    async fn deliver_each_entry_to_one_group_member() {
        let store = MemoryLogStore::new();
        let group = ConsumerGroupDescriptor::default();

        store.ensure_group("topic", &group).await.unwrap();
        store.append("topic", &fields("a")).await.unwrap();
        store.append("topic", &fields("b")).await.unwrap();

        let mut first = store.reader("topic", &group, "one").await.unwrap();
        let mut second = store.reader("topic", &group, "two").await.unwrap();

        let batch = first.next_batch(1, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch[0].fields["marker"], "a");

        let batch = second.next_batch(1, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch[0].fields["marker"], "b");
    }

    #[tokio::test]
    async fn replay_unacknowledged_entries_to_a_new_reader() {
        let store = MemoryLogStore::new();
        let group = ConsumerGroupDescriptor::default();

        store.ensure_group("topic", &group).await.unwrap();
        store.append("topic", &fields("a")).await.unwrap();

        let mut reader = store.reader("topic", &group, "one").await.unwrap();
        let batch = reader.next_batch(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);

        // The entry was never acknowledged, a fresh reader sees it again
        let mut recovered = store.reader("topic", &group, "one").await.unwrap();
        let replayed = recovered
            .next_batch(10, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(replayed, batch);

        store.acknowledge("topic", &group, &batch[0].id).await.unwrap();
        let mut after_ack = store.reader("topic", &group, "one").await.unwrap();
        let empty = after_ack
            .next_batch(10, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn start_tail_groups_behind_existing_entries() {
        let store = MemoryLogStore::new();
        let group = ConsumerGroupDescriptor::new(
            crate::library::communication::event::ConsumerGroupIdentifier::Other("late".into()),
            QueueLocation::Tail,
        );

        store.append("topic", &fields("old")).await.unwrap();
        store.ensure_group("topic", &group).await.unwrap();
        store.append("topic", &fields("new")).await.unwrap();

        let mut reader = store.reader("topic", &group, "one").await.unwrap();
        let batch = reader.next_batch(10, Duration::from_millis(10)).await.unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].fields["marker"], "new");
    }
}
