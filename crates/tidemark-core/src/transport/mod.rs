pub mod memory;

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value};

pub use memory::MemoryTransport;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("subscription to feed '{feed}' failed: {reason}")]
    Subscribe { feed: String, reason: String },

    #[error("write to feed '{feed}' failed: {reason}")]
    Write { feed: String, reason: String },
}

/// One event delivered on a feed stream.
///
/// Raw records are loosely-typed JSON objects; the subscription layer
/// normalizes them into FeedItems at the boundary.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The entire current visible window, authoritative over prior
    /// increments.
    Snapshot(Vec<Value>),
    /// One newly-added record, possibly already present locally.
    Added(Value),
    /// The stream dropped; no further events follow.
    Failed(TransportError),
}

pub type EventCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Capability to stop one open stream. Calling it twice is a no-op, and
/// implementations swallow their own teardown errors: cleanup never
/// propagates.
pub struct Unsubscriber {
    inner: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Unsubscriber {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Mutex::new(Some(Box::new(f))),
        }
    }

    pub fn noop() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub fn unsubscribe(&self) {
        if let Some(f) = self.inner.lock().take() {
            f();
        }
    }
}

/// The four operations the core needs from a remote collection store.
/// Transport details (protocol, retries, batching) live behind this
/// trait.
pub trait FeedTransport: Send + Sync {
    /// Streaming read of the most recent `limit` records of `feed`, by
    /// server-side recency ordering. Delivers an initial Snapshot and a
    /// new Snapshot whenever the visible window changes.
    fn subscribe_window(
        &self,
        feed: &str,
        limit: usize,
        on_event: EventCallback,
    ) -> Result<Unsubscriber, TransportError>;

    /// Streaming delivery of individually-added records on `feed`.
    fn subscribe_additions(
        &self,
        feed: &str,
        on_event: EventCallback,
    ) -> Result<Unsubscriber, TransportError>;

    /// Replace the record at a known id.
    fn write(
        &self,
        feed: &str,
        id: &str,
        record: Value,
    ) -> BoxFuture<'static, Result<(), TransportError>>;

    /// Append a record; the store assigns the id and returns it.
    fn append(&self, feed: &str, record: Value)
        -> BoxFuture<'static, Result<String, TransportError>>;

    /// Merge `fields` into the record at `id`, leaving other fields
    /// untouched.
    fn update_fields(
        &self,
        feed: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> BoxFuture<'static, Result<(), TransportError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unsubscriber_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let unsub = Unsubscriber::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        unsub.unsubscribe();
        unsub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A noop handle is always safe to call
        Unsubscriber::noop().unsubscribe();
    }
}
