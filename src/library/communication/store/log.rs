use super::super::event::ConsumerGroupDescriptor;
use super::super::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Identifier the store assigns to an appended entry, totally ordered within a topic
pub type EntryId = String;

/// Raw wire representation of a stored entry
pub type FieldMap = HashMap<String, String>;

/// Entry retrieved from a topic of a [`LogStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Store-assigned identifier of this entry
    pub id: EntryId,
    /// Field map carried by the entry
    pub fields: FieldMap,
}

/// Topic-level statistics for observability purposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    /// Number of entries currently retained in the topic
    pub length: usize,
    /// Identifier of the oldest retained entry, if any
    pub first_entry: Option<EntryId>,
    /// Identifier of the newest entry, if any
    pub last_entry: Option<EntryId>,
}

/// Stateful consumer handle reading one topic on behalf of one group member
///
/// A reader owns whatever connection state is required for blocking reads.
/// After a crash it first re-delivers the entries that were handed to this
/// consumer but never acknowledged, then continues with new deliveries.
#[async_trait]
pub trait LogReader: Send {
    /// Reads up to `count` entries, blocking for at most `block` when none are available
    ///
    /// An empty result indicates that the block timeout elapsed, not that the
    /// topic is exhausted. Callers are expected to loop.
    async fn next_batch(
        &mut self,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StoredEntry>, TransportError>;
}

/// Append-only, partitioned log keyed by topic name
///
/// Topics support durable appends, consumer-group cursors, a per-entry
/// pending set and acknowledge-by-id. Entries handed to a group are assigned
/// to exactly one member at a time and stay pending until acknowledged.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Reader type produced by [`reader`](LogStore::reader)
    type Reader: LogReader;

    /// Durably appends a single entry to the topic, creating it when missing
    async fn append(&self, topic: &str, fields: &FieldMap) -> Result<EntryId, TransportError>;

    /// Creates the consumer group on the topic if it does not exist yet
    ///
    /// Creating a group that already exists is not an error.
    async fn ensure_group(
        &self,
        topic: &str,
        group: &ConsumerGroupDescriptor,
    ) -> Result<(), TransportError>;

    /// Opens a [`LogReader`] for the given group member
    async fn reader(
        &self,
        topic: &str,
        group: &ConsumerGroupDescriptor,
        consumer: &str,
    ) -> Result<Self::Reader, TransportError>;

    /// Removes an entry from the group's pending set
    ///
    /// Irrevocable; acknowledged entries are never delivered again.
    async fn acknowledge(
        &self,
        topic: &str,
        group: &ConsumerGroupDescriptor,
        id: &str,
    ) -> Result<(), TransportError>;

    /// Reads up to `count` entries from the start of the topic, oldest first
    async fn range(&self, topic: &str, count: usize) -> Result<Vec<StoredEntry>, TransportError>;

    /// Looks up a single entry by its identifier
    async fn entry(&self, topic: &str, id: &str)
        -> Result<Option<StoredEntry>, TransportError>;

    /// Deletes a single entry, reporting whether it existed
    async fn remove(&self, topic: &str, id: &str) -> Result<bool, TransportError>;

    /// Deletes the topic with everything in it
    async fn remove_topic(&self, topic: &str) -> Result<(), TransportError>;

    /// Retrieves topic-level statistics
    async fn topic_info(&self, topic: &str) -> Result<TopicInfo, TransportError>;
}
