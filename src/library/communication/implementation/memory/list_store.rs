use crate::library::communication::store::ListStore;
use crate::library::communication::TransportError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

struct ExpiringRecord {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    lists: HashMap<String, VecDeque<String>>,
    records: HashMap<String, ExpiringRecord>,
}

/// In-process [`ListStore`] implementation
#[derive(Default, Clone)]
pub struct MemoryListStore {
    state: Arc<Mutex<Inner>>,
}

impl MemoryListStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn push(&self, key: &str, value: String) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.lists.entry(key.to_owned()).or_default().push_front(value);
        Ok(())
    }

    async fn pop(&self, key: &str, timeout: Duration) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(list) = state.lists.get_mut(key) {
                    if let Some(value) = list.pop_back() {
                        return Ok(Some(value));
                    }
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    async fn length(&self, key: &str) -> Result<usize, TransportError> {
        let state = self.state.lock().unwrap();
        Ok(state.lists.get(key).map(VecDeque::len).unwrap_or(0))
    }

    async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, TransportError> {
        let state = self.state.lock().unwrap();

        Ok(state
            .lists
            .get(key)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, key: &str) -> Result<(), TransportError> {
        self.state.lock().unwrap().lists.remove(key);
        Ok(())
    }

    async fn put_expiring(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.records.insert(
            key.to_owned(),
            ExpiringRecord {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>, TransportError> {
        let mut state = self.state.lock().unwrap();

        match state.records.get(key) {
            Some(record) if record.expires_at > Instant::now() => Ok(Some(record.value.clone())),
            Some(_) => {
                state.records.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn pop_in_fifo_order() {
        let store = MemoryListStore::new();
        store.push("list", "first".into()).await.unwrap();
        store.push("list", "second".into()).await.unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(store.pop("list", timeout).await.unwrap().unwrap(), "first");
        assert_eq!(store.pop("list", timeout).await.unwrap().unwrap(), "second");
        assert_eq!(store.pop("list", timeout).await.unwrap(), None);
    }

    #[tokio::test]
    async fn peek_newest_first_without_removing() {
        let store = MemoryListStore::new();
        store.push("list", "old".into()).await.unwrap();
        store.push("list", "new".into()).await.unwrap();

        let peeked = store.peek("list", 10).await.unwrap();
        assert_eq!(peeked, vec!["new".to_owned(), "old".to_owned()]);
        assert_eq!(store.length("list").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn expire_records() {
        tokio::time::pause();

        let store = MemoryListStore::new();
        store
            .put_expiring("record", "value".into(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.fetch("record").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.fetch("record").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unblock_a_waiting_pop_when_a_value_arrives() {
        let store = MemoryListStore::new();
        let writer = store.clone();

        let handle = tokio::spawn(async move {
            store.pop("list", Duration::from_secs(5)).await.unwrap()
        });

        sleep(Duration::from_millis(20)).await;
        writer.push("list", "value".into()).await.unwrap();

        assert_eq!(handle.await.unwrap(), Some("value".into()));
    }
}
