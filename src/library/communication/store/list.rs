use super::super::TransportError;
use async_trait::async_trait;
use std::time::Duration;

/// Durable FIFO list structure with expiring auxiliary records
///
/// Values are pushed onto the head and popped from the tail, so a single list
/// behaves as a queue. The blocking pop hands each value to exactly one
/// caller. Expiring records back the bounded-retention audit trail of
/// completed work.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Pushes a value onto the head of the list
    async fn push(&self, key: &str, value: String) -> Result<(), TransportError>;

    /// Pops the tail of the list, blocking for at most `timeout`
    ///
    /// Returns `None` when the timeout elapsed without a value becoming
    /// available. Never blocks indefinitely so callers stay responsive to
    /// shutdown between iterations.
    async fn pop(&self, key: &str, timeout: Duration) -> Result<Option<String>, TransportError>;

    /// Current number of values in the list
    async fn length(&self, key: &str) -> Result<usize, TransportError>;

    /// Reads up to `limit` values from the head (newest first) without removing them
    async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, TransportError>;

    /// Deletes the list with everything in it
    async fn clear(&self, key: &str) -> Result<(), TransportError>;

    /// Stores a standalone record that the store evicts after `ttl`
    async fn put_expiring(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), TransportError>;

    /// Fetches a standalone record if it exists and has not expired yet
    async fn fetch(&self, key: &str) -> Result<Option<String>, TransportError>;
}
