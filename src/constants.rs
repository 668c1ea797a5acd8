//! Constant values shared between modules

/// Channel name backing the notification work queue
///
/// Derives the `queues:notifications` and `dlq:notifications` list keys.
pub const NOTIFICATION_CHANNEL: &str = "notifications";

/// Number of log entries a consumer loop requests per blocking read
pub const CONSUMER_BATCH_SIZE: usize = 10;
