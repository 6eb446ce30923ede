#![expect(
    clippy::module_name_repetitions,
    reason = "Type names read better with their module suffix at call sites"
)]

//! Publish point that fans decoded updates out to any number of consumers.
//!
//! Consumers are plain callbacks. Every published event is delivered to all consumers that
//! are registered at that moment, in registration order, and the publisher does not move on
//! until the last consumer has returned. A consumer registering late is first replayed the
//! current snapshot (status, last error, latest message of each tag) so it never starts blank.
//!
//! Consumer callbacks may call [`SubscriberRegistry::unsubscribe`] and the snapshot accessors,
//! but must not call [`SubscriberRegistry::subscribe`] re-entrantly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_stream::stream;
use futures::Stream;
use tokio::sync::mpsc;

use super::types::response::StreamMessage;
use super::types::{ConnectionError, ConnectionStatus, StreamEvent};

type Consumer = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Handle returned by [`SubscriberRegistry::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`SubscriptionHandle::unsubscribe`].
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    registry: Weak<SubscriberRegistry>,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the consumer. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self);
        }
    }
}

#[derive(Default)]
struct Inner {
    subscribers: Vec<(u64, Consumer)>,
    status: ConnectionStatus,
    last_error: Option<ConnectionError>,
    /// Latest message per tag, in first-seen order
    latest: Vec<(String, Arc<StreamMessage>)>,
    closed: bool,
}

impl Inner {
    fn snapshot(&self) -> Vec<StreamEvent> {
        let mut events = Vec::with_capacity(self.latest.len() + 2);
        events.push(StreamEvent::Status(self.status));
        if let Some(error) = &self.last_error {
            events.push(StreamEvent::Error(Some(error.clone())));
        }
        events.extend(
            self.latest
                .iter()
                .map(|(_, message)| StreamEvent::Message(Arc::clone(message))),
        );
        events
    }
}

/// Subscriber list plus the snapshot replayed to late subscribers.
#[derive(Default)]
pub struct SubscriberRegistry {
    /// Serializes deliveries so no consumer sees update N+1 before another has seen N
    dispatch: Mutex<()>,
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a consumer and immediately replay the current snapshot to it.
    ///
    /// After [`close`](Self::close) the consumer is neither registered nor called.
    pub fn subscribe<F>(self: &Arc<Self>, consumer: F) -> SubscriptionHandle
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = SubscriptionHandle {
            id,
            registry: Arc::downgrade(self),
        };

        let _dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        let consumer: Consumer = Arc::new(consumer);
        let replay = {
            let mut inner = self.write();
            if inner.closed {
                return handle;
            }
            inner.subscribers.push((id, Arc::clone(&consumer)));
            inner.snapshot()
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(id, replayed = replay.len(), "Consumer subscribed");

        for event in &replay {
            consumer(event);
        }

        handle
    }

    /// Remove a consumer. No-op if it is already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut inner = self.write();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(id, _)| *id != handle.id);

        #[cfg(feature = "tracing")]
        if inner.subscribers.len() < before {
            tracing::debug!(id = handle.id, "Consumer unsubscribed");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = before;
    }

    /// Subscribe as an async stream of events.
    ///
    /// The stream starts with the snapshot replay and ends when the registry closes. Dropping
    /// the stream unsubscribes.
    pub fn updates(self: &Arc<Self>) -> impl Stream<Item = StreamEvent> + use<> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(move |event| {
            // The receiver is gone only once the stream has been dropped.
            _ = tx.send(event.clone());
        });
        let guard = UnsubscribeOnDrop(handle);

        stream! {
            let _guard = guard;
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.read().status
    }

    /// Last error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.read().last_error.clone()
    }

    /// Latest message published with the given tag.
    #[must_use]
    pub fn latest(&self, tag: &str) -> Option<Arc<StreamMessage>> {
        self.read()
            .latest
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, message)| Arc::clone(message))
    }

    /// Latest message of every tag seen so far, in first-seen order.
    #[must_use]
    pub fn latest_messages(&self) -> Vec<Arc<StreamMessage>> {
        self.read()
            .latest
            .iter()
            .map(|(_, message)| Arc::clone(message))
            .collect()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.read().subscribers.len()
    }

    /// Publish a status change. Repeating the current status delivers nothing.
    pub fn publish_status(&self, status: ConnectionStatus) {
        self.publish(StreamEvent::Status(status), |inner| {
            if inner.status == status {
                return false;
            }
            inner.status = status;
            true
        });
    }

    /// Publish a new last error, or clear it with `None`. Clearing twice delivers nothing.
    pub fn publish_error(&self, error: Option<ConnectionError>) {
        let stored = error.clone();
        self.publish(StreamEvent::Error(error), move |inner| {
            if stored.is_none() && inner.last_error.is_none() {
                return false;
            }
            inner.last_error = stored;
            true
        });
    }

    /// Publish a decoded message and retain it as the latest of its tag.
    pub fn publish_message(&self, message: StreamMessage) {
        let message = Arc::new(message);
        let retained = Arc::clone(&message);
        self.publish(StreamEvent::Message(message), move |inner| {
            let tag = retained.tag().to_owned();
            match inner.latest.iter_mut().find(|(t, _)| *t == tag) {
                Some(slot) => slot.1 = retained,
                None => inner.latest.push((tag, retained)),
            }
            true
        });
    }

    /// Drop every consumer and refuse new ones. No callback fires after this returns.
    pub fn close(&self) {
        let _dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        let mut inner = self.write();
        inner.closed = true;
        inner.subscribers.clear();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    fn publish(&self, event: StreamEvent, apply: impl FnOnce(&mut Inner) -> bool) {
        let _dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        let consumers: Vec<Consumer> = {
            let mut inner = self.write();
            if inner.closed || !apply(&mut inner) {
                return;
            }
            inner
                .subscribers
                .iter()
                .map(|(_, consumer)| Arc::clone(consumer))
                .collect()
        };

        for consumer in consumers {
            consumer(&event);
        }
    }

    // The snapshot fields are each replaced atomically, so a poisoned lock is recoverable.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

struct UnsubscribeOnDrop(SubscriptionHandle);

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}
