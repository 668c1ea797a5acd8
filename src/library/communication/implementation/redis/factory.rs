use crate::library::communication::TransportError;
use async_trait::async_trait;
use redis::aio::ConnectionLike;

/// Factory for redis connections of different sharing characteristics
///
/// The library only states *what* it needs from a connection; establishing,
/// reusing and monitoring connections is the implementor's business. The
/// harness provides a factory whose connections report their death to the job
/// supervisor so that affected jobs get restarted.
#[async_trait]
pub trait RedisFactory: Send + Sync {
    /// Connection shared between many users
    ///
    /// Must never be used for blocking commands as those would stall everybody
    /// else multiplexing on it.
    type SharedConnection: ConnectionLike + Send;

    /// Dedicated connection a single consumer may block on
    type OwnedConnection: ConnectionLike + Send;

    /// Retrieves the shared connection, establishing it when necessary
    async fn shared(&self) -> Result<Self::SharedConnection, TransportError>;

    /// Establishes a new dedicated connection
    async fn owned(&self) -> Result<Self::OwnedConnection, TransportError>;
}
