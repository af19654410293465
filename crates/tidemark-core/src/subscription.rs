use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::FeedItem;
use crate::stats::SharedFeedStats;
use crate::store::SharedFeedStore;
use crate::transport::{
    EventCallback, FeedTransport, TransportError, TransportEvent, Unsubscriber,
};

/// One open stream over a remote feed, reconciling transport events into
/// a shared bounded mirror.
///
/// Owned exclusively by the consumer that opened it. Closing flips a
/// liveness flag checked at the top of every callback, so events already
/// in flight when close is requested cannot mutate state.
pub struct FeedSubscription {
    feed: String,
    store: SharedFeedStore,
    alive: Arc<AtomicBool>,
    streams: Vec<Unsubscriber>,
}

impl FeedSubscription {
    /// Open both streams (window snapshots + incremental adds) for
    /// `feed`. All-or-nothing: if the second stream fails to establish,
    /// the first is torn down before the error is returned.
    pub fn open(
        transport: &dyn FeedTransport,
        feed: &str,
        limit: usize,
        store: SharedFeedStore,
        stats: SharedFeedStats,
    ) -> Result<Self, TransportError> {
        let alive = Arc::new(AtomicBool::new(true));
        let callback = reconcile_callback(feed, store.clone(), stats, alive.clone());

        let window = transport.subscribe_window(feed, limit, callback.clone())?;
        let additions = match transport.subscribe_additions(feed, callback) {
            Ok(unsub) => unsub,
            Err(e) => {
                alive.store(false, Ordering::SeqCst);
                window.unsubscribe();
                return Err(e);
            }
        };

        debug!("Opened subscription to feed '{}' (limit {})", feed, limit);
        Ok(Self {
            feed: feed.to_string(),
            store,
            alive,
            streams: vec![window, additions],
        })
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn store(&self) -> &SharedFeedStore {
        &self.store
    }

    pub fn is_live(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop receiving events. Safe to call repeatedly and after the
    /// transport already failed.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            debug!("Closing subscription to feed '{}'", self.feed);
        }
        for stream in &self.streams {
            stream.unsubscribe();
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

fn reconcile_callback(
    feed: &str,
    store: SharedFeedStore,
    stats: SharedFeedStats,
    alive: Arc<AtomicBool>,
) -> EventCallback {
    let feed = feed.to_string();
    Arc::new(move |event| {
        if !alive.load(Ordering::SeqCst) {
            return;
        }
        match event {
            TransportEvent::Snapshot(records) => {
                let mut items = Vec::with_capacity(records.len());
                for record in &records {
                    match FeedItem::from_record(record) {
                        Some(item) => items.push(item),
                        None => stats.record_discarded(&feed),
                    }
                }
                store.apply_snapshot(items);
                stats.record_snapshot(&feed);
            }
            TransportEvent::Added(record) => match FeedItem::from_record(&record) {
                Some(item) => {
                    if store.apply_added(item) {
                        stats.record_increment(&feed);
                    } else {
                        stats.record_duplicate(&feed);
                    }
                }
                None => stats.record_discarded(&feed),
            },
            TransportEvent::Failed(e) => {
                warn!("Feed '{}' stream dropped: {}", feed, e);
                store.fail();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn open(
        transport: &MemoryTransport,
        limit: usize,
    ) -> (FeedSubscription, SharedFeedStore, SharedFeedStats) {
        let store = SharedFeedStore::new(limit);
        let stats = SharedFeedStats::new();
        let sub = FeedSubscription::open(transport, "submissions", limit, store.clone(), stats.clone())
            .expect("open should succeed");
        (sub, store, stats)
    }

    #[test]
    fn test_open_applies_initial_snapshot() {
        let transport = MemoryTransport::new();
        transport.seed(
            "submissions",
            vec![
                json!({ "id": "b", "createdAt": 90 }),
                json!({ "id": "a", "createdAt": 100 }),
            ],
        );

        let (_sub, store, _stats) = open(&transport, 5);
        assert!(!store.is_loading());
        let ids: Vec<_> = store.items().iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_appends_arrive_as_increments() {
        let transport = MemoryTransport::new();
        let (_sub, store, stats) = open(&transport, 5);

        transport
            .append("submissions", json!({ "id": "a", "createdAt": 100 }))
            .await
            .unwrap();
        transport
            .append("submissions", json!({ "id": "b", "createdAt": 90 }))
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.latest_seen(), 100);
        assert_eq!(stats.snapshot().counters("submissions").increments, 2);
    }

    #[tokio::test]
    async fn test_duplicate_addition_is_discarded() {
        let transport = MemoryTransport::new();
        transport.seed("submissions", vec![json!({ "id": "a", "createdAt": 100 })]);
        let (_sub, store, stats) = open(&transport, 5);

        transport
            .append("submissions", json!({ "id": "a", "createdAt": 100 }))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(stats.snapshot().counters("submissions").duplicates, 1);
    }

    #[tokio::test]
    async fn test_snapshot_wins_over_prior_increments() {
        let transport = MemoryTransport::new();
        let (_sub, store, _stats) = open(&transport, 5);

        transport
            .append("submissions", json!({ "id": "a", "createdAt": 100 }))
            .await
            .unwrap();
        transport
            .append("submissions", json!({ "id": "b", "createdAt": 90 }))
            .await
            .unwrap();

        // Authoritative reconciliation replaces whatever increments built
        transport.seed(
            "submissions",
            vec![json!({ "id": "only", "createdAt": 50 })],
        );
        let ids: Vec<_> = store.items().iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["only"]);
        // The watermark still remembers the newer increments
        assert_eq!(store.latest_seen(), 100);
    }

    #[test]
    fn test_records_without_id_are_dropped_at_the_boundary() {
        let transport = MemoryTransport::new();
        transport.seed(
            "submissions",
            vec![
                json!({ "id": "a", "createdAt": 100 }),
                json!({ "createdAt": 90 }),
            ],
        );

        let (_sub, store, stats) = open(&transport, 5);
        assert_eq!(store.len(), 1);
        assert_eq!(stats.snapshot().counters("submissions").discarded, 1);
    }

    #[test]
    fn test_transport_failure_is_terminal() {
        let transport = MemoryTransport::new();
        let (sub, store, _stats) = open(&transport, 5);

        transport.emit_failure("submissions", "connection reset");
        assert!(!store.is_loading());
        assert!(store.has_failed());

        // Close after failure stays quiet
        sub.close();
        sub.close();
    }

    #[test]
    fn test_close_suppresses_late_events() {
        let transport = MemoryTransport::new();
        let (sub, store, _stats) = open(&transport, 5);

        sub.close();
        assert!(!sub.is_live());
        assert_eq!(transport.active_listeners("submissions"), 0);

        transport.seed("submissions", vec![json!({ "id": "a", "createdAt": 1 })]);
        assert!(store.is_empty());
    }
}
