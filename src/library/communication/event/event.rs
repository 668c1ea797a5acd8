use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::hash::Hash;

/// Prefix shared by every event topic
pub const TOPIC_PREFIX: &str = "events:";

/// Closed set of tags distinguishing the kinds of events a system can emit
///
/// Implementations are expected to be plain enums. Tags are validated when a
/// stored entry is decoded; an unknown tag fails fast at the codec instead of
/// propagating as an opaque string.
pub trait EventKind: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Wire tag of this kind
    fn key(&self) -> &'static str;

    /// Parses a wire tag back into a kind, `None` for tags outside the closed set
    fn parse(key: &str) -> Option<Self>;

    /// Topic on which events of this kind are stored
    fn topic(&self) -> String {
        format!("{}{}", TOPIC_PREFIX, self.key())
    }
}

/// A fact that has happened, ready to be published
///
/// Events are immutable after construction. The only delivery metadata that
/// changes over their stored lifetime is the retry counter carried alongside
/// them by the [`EventRecord`](super::EventRecord) codec.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<K> {
    kind: K,
    aggregate_id: String,
    aggregate_type: String,
    data: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl<K> Event<K> {
    /// Creates a new instance stamped with the current time
    pub fn new<I, T>(kind: K, aggregate_id: I, aggregate_type: T, data: Map<String, Value>) -> Self
    where
        I: Into<String>,
        T: Into<String>,
    {
        Self {
            kind,
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Reassembles an event with an explicit timestamp, used when decoding stored entries
    pub fn with_timestamp<I, T>(
        kind: K,
        aggregate_id: I,
        aggregate_type: T,
        data: Map<String, Value>,
        timestamp: DateTime<Utc>,
    ) -> Self
    where
        I: Into<String>,
        T: Into<String>,
    {
        Self {
            kind,
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            data,
            timestamp,
        }
    }

    /// Kind tag of the event
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Identifier of the entity that produced the event
    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    /// Category of the producing entity
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    /// Payload, opaque to the bus
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Instant the event was constructed
    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }
}
