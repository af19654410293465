use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{EventCallback, FeedTransport, TransportError, TransportEvent, Unsubscriber};

struct WindowSub {
    feed: String,
    limit: usize,
    callback: EventCallback,
}

struct AdditionSub {
    feed: String,
    callback: EventCallback,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Vec<Value>>,
    window_subs: HashMap<u64, WindowSub>,
    addition_subs: HashMap<u64, AdditionSub>,
    next_listener: u64,
    fail_writes: bool,
}

impl Inner {
    /// The visible window: most recent `limit` records by createdAt.
    fn window(&self, feed: &str, limit: usize) -> Vec<Value> {
        let mut records = self.records.get(feed).cloned().unwrap_or_default();
        records.sort_by(|a, b| created_at_of(b).cmp(&created_at_of(a)));
        records.truncate(limit);
        records
    }
}

fn created_at_of(record: &Value) -> u64 {
    record.get("createdAt").and_then(Value::as_u64).unwrap_or(0)
}

/// In-memory FeedTransport used by tests and the CLI replay. Counts its
/// active listeners and can be told to fail writes, which is all the
/// core's test surface needs from a remote store double.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the feed's contents and push a fresh snapshot to every
    /// window subscriber.
    pub fn seed(&self, feed: &str, records: Vec<Value>) {
        let deliveries = {
            let mut inner = self.inner.lock();
            inner.records.insert(feed.to_string(), records);
            snapshot_deliveries(&inner, feed)
        };
        deliver(deliveries);
    }

    /// Re-emit the current window to every window subscriber of `feed`.
    pub fn emit_snapshot(&self, feed: &str) {
        let deliveries = {
            let inner = self.inner.lock();
            snapshot_deliveries(&inner, feed)
        };
        deliver(deliveries);
    }

    /// Drop every stream on `feed` with a terminal failure.
    pub fn emit_failure(&self, feed: &str, reason: &str) {
        let error = TransportError::Subscribe {
            feed: feed.to_string(),
            reason: reason.to_string(),
        };
        let callbacks: Vec<EventCallback> = {
            let inner = self.inner.lock();
            inner
                .window_subs
                .values()
                .filter(|s| s.feed == feed)
                .map(|s| s.callback.clone())
                .chain(
                    inner
                        .addition_subs
                        .values()
                        .filter(|s| s.feed == feed)
                        .map(|s| s.callback.clone()),
                )
                .collect()
        };
        for callback in callbacks {
            callback(TransportEvent::Failed(error.clone()));
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Number of open streams on `feed`, across both subscription kinds.
    pub fn active_listeners(&self, feed: &str) -> usize {
        let inner = self.inner.lock();
        inner.window_subs.values().filter(|s| s.feed == feed).count()
            + inner
                .addition_subs
                .values()
                .filter(|s| s.feed == feed)
                .count()
    }

    /// Raw stored records, in arrival order.
    pub fn records(&self, feed: &str) -> Vec<Value> {
        self.inner.lock().records.get(feed).cloned().unwrap_or_default()
    }

    fn register(&self, id: u64) -> Unsubscriber {
        let inner = self.inner.clone();
        Unsubscriber::new(move || {
            let mut inner = inner.lock();
            inner.window_subs.remove(&id);
            inner.addition_subs.remove(&id);
        })
    }
}

fn snapshot_deliveries(inner: &Inner, feed: &str) -> Vec<(EventCallback, Vec<Value>)> {
    inner
        .window_subs
        .values()
        .filter(|s| s.feed == feed)
        .map(|s| (s.callback.clone(), inner.window(feed, s.limit)))
        .collect()
}

// Callbacks run after the inner lock is released
fn deliver(deliveries: Vec<(EventCallback, Vec<Value>)>) {
    for (callback, window) in deliveries {
        callback(TransportEvent::Snapshot(window));
    }
}

impl FeedTransport for MemoryTransport {
    fn subscribe_window(
        &self,
        feed: &str,
        limit: usize,
        on_event: EventCallback,
    ) -> Result<Unsubscriber, TransportError> {
        let (id, window) = {
            let mut inner = self.inner.lock();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner.window_subs.insert(
                id,
                WindowSub {
                    feed: feed.to_string(),
                    limit,
                    callback: on_event.clone(),
                },
            );
            (id, inner.window(feed, limit))
        };

        on_event(TransportEvent::Snapshot(window));
        Ok(self.register(id))
    }

    fn subscribe_additions(
        &self,
        feed: &str,
        on_event: EventCallback,
    ) -> Result<Unsubscriber, TransportError> {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner.addition_subs.insert(
                id,
                AdditionSub {
                    feed: feed.to_string(),
                    callback: on_event,
                },
            );
            id
        };
        Ok(self.register(id))
    }

    fn write(
        &self,
        feed: &str,
        id: &str,
        record: Value,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        let result = self.apply_write(feed, id, record);
        if result.is_ok() {
            self.emit_snapshot(feed);
        }
        future::ready(result).boxed()
    }

    fn append(
        &self,
        feed: &str,
        record: Value,
    ) -> BoxFuture<'static, Result<String, TransportError>> {
        let result = self.apply_append(feed, record);
        future::ready(result).boxed()
    }

    fn update_fields(
        &self,
        feed: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        let result = self.apply_update(feed, id, fields);
        if result.is_ok() {
            self.emit_snapshot(feed);
        }
        future::ready(result).boxed()
    }
}

impl MemoryTransport {
    fn apply_write(&self, feed: &str, id: &str, mut record: Value) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(write_error(feed, "writes disabled"));
        }
        let obj = record
            .as_object_mut()
            .ok_or_else(|| write_error(feed, "record is not an object"))?;
        obj.insert("id".to_string(), Value::String(id.to_string()));

        let records = inner.records.entry(feed.to_string()).or_default();
        match records.iter_mut().find(|r| id_of(r) == Some(id)) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    fn apply_append(&self, feed: &str, mut record: Value) -> Result<String, TransportError> {
        let (id, callbacks) = {
            let mut inner = self.inner.lock();
            if inner.fail_writes {
                return Err(write_error(feed, "writes disabled"));
            }
            let obj = record
                .as_object_mut()
                .ok_or_else(|| write_error(feed, "record is not an object"))?;

            let id = match obj.get("id").and_then(Value::as_str) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    let id = Uuid::new_v4().to_string();
                    obj.insert("id".to_string(), Value::String(id.clone()));
                    id
                }
            };

            inner
                .records
                .entry(feed.to_string())
                .or_default()
                .push(record.clone());

            let callbacks: Vec<EventCallback> = inner
                .addition_subs
                .values()
                .filter(|s| s.feed == feed)
                .map(|s| s.callback.clone())
                .collect();
            (id, callbacks)
        };

        for callback in callbacks {
            callback(TransportEvent::Added(record.clone()));
        }
        Ok(id)
    }

    fn apply_update(
        &self,
        feed: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(write_error(feed, "writes disabled"));
        }
        let records = inner.records.entry(feed.to_string()).or_default();
        let record = records
            .iter_mut()
            .find(|r| id_of(r) == Some(id))
            .ok_or_else(|| write_error(feed, &format!("no record with id '{}'", id)))?;
        let obj = record
            .as_object_mut()
            .ok_or_else(|| write_error(feed, "record is not an object"))?;
        for (key, value) in fields {
            obj.insert(key, value);
        }
        Ok(())
    }
}

fn id_of(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn write_error(feed: &str, reason: &str) -> TransportError {
    TransportError::Write {
        feed: feed.to_string(),
        reason: reason.to_string(),
    }
}
