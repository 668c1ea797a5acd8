use super::{Event, EventKind};
use crate::library::communication::store::{EntryId, FieldMap, StoredEntry};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field holding the wire tag of the event kind
pub const FIELD_TYPE: &str = "type";
/// Field holding the identifier of the producing entity
pub const FIELD_AGGREGATE_ID: &str = "aggregate_id";
/// Field holding the category of the producing entity
pub const FIELD_AGGREGATE_TYPE: &str = "aggregate_type";
/// Field holding the JSON-encoded payload
pub const FIELD_DATA: &str = "data";
/// Field holding the RFC 3339 creation timestamp
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// Field holding the string-encoded delivery retry counter
pub const FIELD_RETRIES: &str = "retries";
/// Dead-letter field referencing the entry the message was quarantined from
pub const FIELD_ORIGINAL_ID: &str = "original_id";
/// Dead-letter field describing the last delivery failure
pub const FIELD_ERROR: &str = "error";
/// Dead-letter field holding the RFC 3339 quarantine timestamp
pub const FIELD_FAILED_AT: &str = "failed_at";

/// Failure while translating between an [`Event`] and its stored entry
#[derive(Debug, Error)]
pub enum RecordError {
    /// A mandatory wire field was absent
    #[error("stored entry is missing the `{0}` field")]
    MissingField(&'static str),

    /// The `type` field carried a tag outside the closed kind set
    #[error("unknown event kind tag `{0}`")]
    UnknownKind(String),

    /// The `timestamp` or `failed_at` field did not parse as RFC 3339
    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),

    /// The `data` field did not contain a JSON object
    #[error("payload is not a JSON object")]
    InvalidPayload(#[source] Option<serde_json::Error>),
}

fn required<'a>(fields: &'a FieldMap, name: &'static str) -> Result<&'a str, RecordError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or(RecordError::MissingField(name))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RecordError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| RecordError::InvalidTimestamp(raw.to_owned()))
}

fn parse_payload(raw: &str) -> Result<Map<String, Value>, RecordError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RecordError::InvalidPayload(None)),
        Err(e) => Err(RecordError::InvalidPayload(Some(e))),
    }
}

/// Codec between an [`Event`] and the field map stored on the log
///
/// The record carries the one piece of delivery metadata that changes over a
/// stored event's lifetime: the retry counter. It starts at zero and only ever
/// increases; the bus is its sole writer.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord<K> {
    event: Event<K>,
    retries: u32,
}

impl<K: EventKind> EventRecord<K> {
    /// Wraps a freshly published event with a zeroed retry counter
    pub fn new(event: Event<K>) -> Self {
        Self { event, retries: 0 }
    }

    /// The wrapped event
    pub fn event(&self) -> &Event<K> {
        &self.event
    }

    /// Number of delivery attempts that have failed so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Serializes the record into its wire field map
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(FIELD_TYPE.into(), self.event.kind().key().into());
        fields.insert(FIELD_AGGREGATE_ID.into(), self.event.aggregate_id().into());
        fields.insert(
            FIELD_AGGREGATE_TYPE.into(),
            self.event.aggregate_type().into(),
        );
        fields.insert(
            FIELD_DATA.into(),
            Value::Object(self.event.data().clone()).to_string(),
        );
        fields.insert(FIELD_TIMESTAMP.into(), self.event.timestamp().to_rfc3339());
        fields.insert(FIELD_RETRIES.into(), self.retries.to_string());
        fields
    }

    /// Decodes a stored field map back into a record
    ///
    /// Fails fast on unknown kind tags and malformed mandatory fields. A
    /// missing or unparseable retry counter is treated as zero, mirroring how
    /// the failure bookkeeping reads it.
    pub fn from_fields(fields: &FieldMap) -> Result<Self, RecordError> {
        let tag = required(fields, FIELD_TYPE)?;
        let kind = K::parse(tag).ok_or_else(|| RecordError::UnknownKind(tag.to_owned()))?;

        let aggregate_id = required(fields, FIELD_AGGREGATE_ID)?;
        let aggregate_type = required(fields, FIELD_AGGREGATE_TYPE)?;
        let data = parse_payload(required(fields, FIELD_DATA)?)?;
        let timestamp = parse_timestamp(required(fields, FIELD_TIMESTAMP)?)?;

        Ok(Self {
            event: Event::with_timestamp(kind, aggregate_id, aggregate_type, data, timestamp),
            retries: read_retries(fields),
        })
    }
}

/// Reads the retry counter of a stored entry, defaulting to zero
///
/// Lenient on purpose: the failure path has to make a retry decision even for
/// entries whose decoding failed.
pub fn read_retries(fields: &FieldMap) -> u32 {
    fields
        .get(FIELD_RETRIES)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0)
}

/// A quarantined event as retrieved from the dead-letter topic
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter<K> {
    /// Identifier of this entry within the dead-letter topic
    pub id: EntryId,
    /// The record as it looked when its retry budget was exhausted
    pub record: EventRecord<K>,
    /// Identifier of the entry it was quarantined from
    pub original_id: EntryId,
    /// Description of the last delivery failure
    pub error: String,
    /// Instant the message was quarantined
    pub failed_at: DateTime<Utc>,
}

impl<K: EventKind> DeadLetter<K> {
    /// Decodes a stored dead-letter entry
    pub fn from_entry(entry: &StoredEntry) -> Result<Self, RecordError> {
        let record = EventRecord::from_fields(&entry.fields)?;
        let original_id = required(&entry.fields, FIELD_ORIGINAL_ID)?.to_owned();
        let error = required(&entry.fields, FIELD_ERROR)?.to_owned();
        let failed_at = parse_timestamp(required(&entry.fields, FIELD_FAILED_AT)?)?;

        Ok(Self {
            id: entry.id.clone(),
            record,
            original_id,
            error,
            failed_at,
        })
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum MockKind {
        Ping,
    }

    impl EventKind for MockKind {
        fn key(&self) -> &'static str {
            "ping"
        }

        fn parse(key: &str) -> Option<Self> {
            match key {
                "ping" => Some(Self::Ping),
                _ => None,
            }
        }
    }

    fn sample_event() -> Event<MockKind> {
        let mut data = Map::new();
        data.insert("x".into(), Value::from(1));
        Event::new(MockKind::Ping, "42", "sample", data)
    }

    #[test]
    fn round_trip_through_the_field_map() {
        let record = EventRecord::new(sample_event());
        let decoded = EventRecord::<MockKind>::from_fields(&record.to_fields()).unwrap();

        assert_eq!(decoded.retries(), 0);
        assert_eq!(decoded.event().aggregate_id(), "42");
        assert_eq!(decoded.event().data()["x"], Value::from(1));
        assert_eq!(decoded.event().timestamp(), record.event().timestamp());
    }

    #[test]
    fn reject_unknown_kind_tags() {
        let mut fields = EventRecord::new(sample_event()).to_fields();
        fields.insert(FIELD_TYPE.into(), "pong".into());

        assert!(matches!(
            EventRecord::<MockKind>::from_fields(&fields),
            Err(RecordError::UnknownKind(tag)) if tag == "pong"
        ));
    }

    #[test]
    fn reject_entries_without_a_payload() {
        let mut fields = EventRecord::new(sample_event()).to_fields();
        fields.remove(FIELD_DATA);

        assert!(matches!(
            EventRecord::<MockKind>::from_fields(&fields),
            Err(RecordError::MissingField(FIELD_DATA))
        ));
    }

    #[test]
    fn read_garbled_retry_counters_as_zero() {
        let mut fields = EventRecord::new(sample_event()).to_fields();
        fields.insert(FIELD_RETRIES.into(), "many".into());

        assert_eq!(read_retries(&fields), 0);
    }
}
