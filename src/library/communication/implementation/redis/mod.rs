//! Store trait implementations using [`redis`](::redis)
//!
//! The log store maps onto [Redis Streams](https://redis.io/topics/streams-intro)
//! with consumer groups, the list store onto plain lists with `LPUSH`/`BRPOP`
//! plus `SETEX` records. Connections come from a [`RedisFactory`] so the
//! harness can decide how connections are established, shared and monitored.

use crate::library::communication::TransportError;

/// Stream id placeholder asking the server to assign the next id
pub(crate) const STREAM_ID_NEW: &str = "*";
/// Stream id addressing the start of a stream
pub(crate) const STREAM_ID_HEAD: &str = "0";
/// Stream id addressing the end of a stream
pub(crate) const STREAM_ID_TAIL: &str = "$";
/// Stream id addressing entries never delivered to the group
pub(crate) const STREAM_ID_ADDITIONS: &str = ">";

mod factory;
mod list_store;
mod log_store;

pub use factory::*;
pub use list_store::*;
pub use log_store::*;

impl From<redis::RedisError> for TransportError {
    fn from(e: redis::RedisError) -> Self {
        TransportError::Unavailable(Box::new(e))
    }
}
