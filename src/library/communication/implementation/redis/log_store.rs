use super::{RedisFactory, STREAM_ID_ADDITIONS, STREAM_ID_HEAD, STREAM_ID_NEW, STREAM_ID_TAIL};
use crate::library::communication::event::{ConsumerGroupDescriptor, QueueLocation};
use crate::library::communication::store::{
    EntryId, FieldMap, LogReader, LogStore, StoredEntry, TopicInfo,
};
use crate::library::communication::TransportError;
use async_trait::async_trait;
use redis::aio::ConnectionLike;
use redis::streams::{
    StreamId, StreamInfoStreamReply, StreamRangeReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, RedisResult};
use std::time::Duration;

/// [`LogStore`] implementation on top of Redis Streams
///
/// Appends become `XADD`, group bookkeeping maps onto `XGROUP`/`XACK` and the
/// pending entries list, administration onto `XRANGE`/`XDEL`/`XINFO`.
pub struct RedisLogStore<F: RedisFactory> {
    factory: F,
}

impl<F: RedisFactory> RedisLogStore<F> {
    /// Creates a new instance with a given [`RedisFactory`]
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

fn entry_from_stream_id(entry: StreamId) -> StoredEntry {
    let mut fields = FieldMap::new();

    for (key, value) in entry.map.iter() {
        if let Ok(text) = redis::from_redis_value::<String>(value) {
            fields.insert(key.clone(), text);
        }
    }

    StoredEntry {
        id: entry.id,
        fields,
    }
}

fn optional_id(entry: StreamId) -> Option<EntryId> {
    if entry.id.is_empty() {
        None
    } else {
        Some(entry.id)
    }
}

#[async_trait]
impl<F: RedisFactory> LogStore for RedisLogStore<F> {
    type Reader = RedisLogReader<F::OwnedConnection>;

    async fn append(&self, topic: &str, fields: &FieldMap) -> Result<EntryId, TransportError> {
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();

        let mut con = self.factory.shared().await?;
        let id: String = con.xadd(topic, STREAM_ID_NEW, &items).await?;

        Ok(id)
    }

    async fn ensure_group(
        &self,
        topic: &str,
        group: &ConsumerGroupDescriptor,
    ) -> Result<(), TransportError> {
        let start = match group.start() {
            QueueLocation::Head => STREAM_ID_HEAD,
            QueueLocation::Tail => STREAM_ID_TAIL,
        };

        let mut con = self.factory.shared().await?;
        let result: RedisResult<()> = con
            .xgroup_create_mkstream(topic, group.identifier().to_string(), start)
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn reader(
        &self,
        topic: &str,
        group: &ConsumerGroupDescriptor,
        consumer: &str,
    ) -> Result<Self::Reader, TransportError> {
        // Dedicated connection, the blocking XREADGROUP must not stall other users
        let con = self.factory.owned().await?;

        Ok(RedisLogReader {
            con,
            topic: topic.to_owned(),
            group: group.identifier().to_string(),
            consumer: consumer.to_owned(),
            cursor: STREAM_ID_HEAD.to_owned(),
        })
    }

    async fn acknowledge(
        &self,
        topic: &str,
        group: &ConsumerGroupDescriptor,
        id: &str,
    ) -> Result<(), TransportError> {
        let mut con = self.factory.shared().await?;
        let _: i64 = con
            .xack(topic, group.identifier().to_string(), &[id])
            .await?;

        Ok(())
    }

    async fn range(&self, topic: &str, count: usize) -> Result<Vec<StoredEntry>, TransportError> {
        let mut con = self.factory.shared().await?;
        let reply: StreamRangeReply = con.xrange_count(topic, "-", "+", count).await?;

        Ok(reply.ids.into_iter().map(entry_from_stream_id).collect())
    }

    async fn entry(
        &self,
        topic: &str,
        id: &str,
    ) -> Result<Option<StoredEntry>, TransportError> {
        let mut con = self.factory.shared().await?;
        let reply: StreamRangeReply = con.xrange(topic, id, id).await?;

        Ok(reply.ids.into_iter().next().map(entry_from_stream_id))
    }

    async fn remove(&self, topic: &str, id: &str) -> Result<bool, TransportError> {
        let mut con = self.factory.shared().await?;
        let removed: i64 = con.xdel(topic, &[id]).await?;

        Ok(removed > 0)
    }

    async fn remove_topic(&self, topic: &str) -> Result<(), TransportError> {
        let mut con = self.factory.shared().await?;
        let _: i64 = con.del(topic).await?;

        Ok(())
    }

    async fn topic_info(&self, topic: &str) -> Result<TopicInfo, TransportError> {
        let mut con = self.factory.shared().await?;
        let info: StreamInfoStreamReply = con.xinfo_stream(topic).await?;

        Ok(TopicInfo {
            length: info.length,
            first_entry: optional_id(info.first_entry),
            last_entry: optional_id(info.last_entry),
        })
    }
}

/// Reader handle produced by [`RedisLogStore::reader`]
///
/// Consumes a stream in the order redis hands entries to a recovering group
/// member:
///
/// 1. Starting from `0`, run through the entries still pending for this
///    consumer from a previous incarnation.
/// 2. Once the pending range is exhausted, switch to `>` and block for new
///    deliveries.
pub struct RedisLogReader<C> {
    con: C,
    topic: String,
    group: String,
    consumer: String,
    cursor: String,
}

#[async_trait]
impl<C: ConnectionLike + Send> LogReader for RedisLogReader<C> {
    async fn next_batch(
        &mut self,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StoredEntry>, TransportError> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(count)
            .block(block.as_millis() as usize);

        let reply: StreamReadReply = self
            .con
            .xread_options(&[self.topic.as_str()], &[self.cursor.as_str()], &options)
            .await?;

        let mut batch = Vec::new();
        if let Some(stream) = reply.keys.into_iter().next() {
            for entry in stream.ids {
                batch.push(entry_from_stream_id(entry));
            }
        }

        // While replaying pending entries, advance behind the last one seen
        // and move over to new deliveries once the replay runs dry
        if self.cursor != STREAM_ID_ADDITIONS {
            self.cursor = match batch.last() {
                Some(entry) => entry.id.clone(),
                None => STREAM_ID_ADDITIONS.to_owned(),
            };
        }

        Ok(batch)
    }
}
