use super::RedisFactory;
use crate::library::communication::store::ListStore;
use crate::library::communication::TransportError;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::Mutex;

/// [`ListStore`] implementation on top of redis lists
///
/// Pushes become `LPUSH`, the blocking pop `BRPOP`, inspection `LLEN` and
/// `LRANGE`, expiring records `SETEX`/`GET`.
///
/// The blocking pop runs on a dedicated connection which is established once
/// and kept behind a guard for the lifetime of this store. It is dropped and
/// re-established on the next pop after a transport failure.
pub struct RedisListStore<F: RedisFactory> {
    factory: F,
    blocking: Mutex<Option<F::OwnedConnection>>,
}

impl<F: RedisFactory> RedisListStore<F> {
    /// Creates a new instance with a given [`RedisFactory`]
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            blocking: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<F: RedisFactory> ListStore for RedisListStore<F> {
    async fn push(&self, key: &str, value: String) -> Result<(), TransportError> {
        let mut con = self.factory.shared().await?;
        let _: i64 = con.lpush(key, value).await?;

        Ok(())
    }

    async fn pop(&self, key: &str, timeout: Duration) -> Result<Option<String>, TransportError> {
        let mut guard = self.blocking.lock().await;
        let mut con = match guard.take() {
            Some(con) => con,
            None => self.factory.owned().await?,
        };

        let seconds = timeout.as_secs().max(1) as usize;
        let result: Result<Option<(String, String)>, _> = con.brpop(key, seconds).await;

        match result {
            Ok(popped) => {
                *guard = Some(con);
                Ok(popped.map(|(_, value)| value))
            }
            // The connection is dropped here, the next pop establishes a fresh one
            Err(e) => Err(e.into()),
        }
    }

    async fn length(&self, key: &str) -> Result<usize, TransportError> {
        let mut con = self.factory.shared().await?;
        let length: usize = con.llen(key).await?;

        Ok(length)
    }

    async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, TransportError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut con = self.factory.shared().await?;
        let values: Vec<String> = con.lrange(key, 0, limit as isize - 1).await?;

        Ok(values)
    }

    async fn clear(&self, key: &str) -> Result<(), TransportError> {
        let mut con = self.factory.shared().await?;
        let _: i64 = con.del(key).await?;

        Ok(())
    }

    async fn put_expiring(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), TransportError> {
        let mut con = self.factory.shared().await?;
        let _: () = con.set_ex(key, value, ttl.as_secs() as usize).await?;

        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>, TransportError> {
        let mut con = self.factory.shared().await?;
        let value: Option<String> = con.get(key).await?;

        Ok(value)
    }
}
