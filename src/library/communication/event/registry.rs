use super::{Event, EventKind};
use crate::library::EmptyResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::warn;

/// Entity which processes delivered events of one kind
///
/// Returning an error marks the whole delivery attempt as failed. All handlers
/// registered for a kind are re-run when the entry is retried, so handlers
/// must be idempotent. There is no timeout around handler execution; a hung
/// handler stalls its consumer group's progress on that topic until the
/// process is restarted.
#[async_trait]
pub trait EventHandler<K: EventKind>: Send + Sync {
    /// Processes a delivered event and reports whether it succeeded
    async fn handle(&self, event: &Event<K>) -> EmptyResult;
}

/// In-process mapping of event kind to the ordered handlers subscribed to it
///
/// Purely local registration; subscribing does not touch the backing store.
pub struct HandlerRegistry<K: EventKind> {
    handlers: HashMap<K, Vec<Box<dyn EventHandler<K>>>>,
}

impl<K: EventKind> Default for HandlerRegistry<K> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<K: EventKind> HandlerRegistry<K> {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the subscription list of the given kind
    ///
    /// Handlers run in registration order within one delivery attempt.
    pub fn subscribe(&mut self, kind: K, handler: Box<dyn EventHandler<K>>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Invokes every handler subscribed to the event's kind, in order
    ///
    /// The first handler error aborts the attempt. An event without any
    /// subscription is reported and counts as handled.
    pub async fn dispatch(&self, event: &Event<K>) -> EmptyResult {
        let handlers = match self.handlers.get(event.kind()) {
            Some(handlers) if !handlers.is_empty() => handlers,
            _ => {
                warn!(kind = event.kind().key(), "No handlers registered for event kind");
                return Ok(());
            }
        };

        for handler in handlers {
            handler.handle(event).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum MockKind {
        Ping,
    }

    impl EventKind for MockKind {
        fn key(&self) -> &'static str {
            "ping"
        }

        fn parse(key: &str) -> Option<Self> {
            (key == "ping").then(|| Self::Ping)
        }
    }

    struct CountingHandler {
        invocations: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler<MockKind> for CountingHandler {
        async fn handle(&self, _event: &Event<MockKind>) -> EmptyResult {
            self.invocations.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                Err("handler exploded".into())
            } else {
                Ok(())
            }
        }
    }

    fn event() -> Event<MockKind> {
        Event::new(MockKind::Ping, "1", "sample", Map::new())
    }

    #[tokio::test]
    async fn run_handlers_in_registration_order() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut registry = HandlerRegistry::new();
        registry.subscribe(
            MockKind::Ping,
            Box::new(CountingHandler {
                invocations: first.clone(),
                fail: false,
            }),
        );
        registry.subscribe(
            MockKind::Ping,
            Box::new(CountingHandler {
                invocations: second.clone(),
                fail: false,
            }),
        );

        registry.dispatch(&event()).await.unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_the_attempt_at_the_first_failing_handler() {
        let reached = Arc::new(AtomicUsize::new(0));

        let mut registry = HandlerRegistry::new();
        registry.subscribe(
            MockKind::Ping,
            Box::new(CountingHandler {
                invocations: Arc::new(AtomicUsize::new(0)),
                fail: true,
            }),
        );
        registry.subscribe(
            MockKind::Ping,
            Box::new(CountingHandler {
                invocations: reached.clone(),
                fail: false,
            }),
        );

        assert!(registry.dispatch(&event()).await.is_err());
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn treat_unhandled_kinds_as_processed() {
        let registry = HandlerRegistry::<MockKind>::new();
        assert!(registry.dispatch(&event()).await.is_ok());
    }
}
