use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::models::FeedItem;

/// Bounded local mirror of one remote feed.
///
/// Items are kept sorted by `created_at` descending, ties broken by
/// arrival order. A full snapshot is the authoritative reconciliation
/// point; incremental adds are idempotent by id. The mirror also tracks
/// the newest timestamp it has ever observed, which only moves forward.
#[derive(Debug)]
pub struct FeedStore {
    limit: usize,
    items: Vec<FeedItem>,
    latest_seen: u64,
    loading: bool,
    failed: bool,
}

impl FeedStore {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            items: Vec::new(),
            latest_seen: 0,
            loading: true,
            failed: false,
        }
    }

    // ===== Getters =====

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&FeedItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|i| i.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Newest `created_at` ever observed on this feed. Monotonic: a later
    /// snapshot containing only older items (deletions upstream) does not
    /// move it backward.
    pub fn latest_seen(&self) -> u64 {
        self.latest_seen
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    // ===== Reconciliation =====

    /// Replace the mirror with a full snapshot of the visible window.
    pub fn apply_snapshot(&mut self, mut items: Vec<FeedItem>) {
        // Stable sort keeps arrival order within equal timestamps
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(self.limit);

        if let Some(newest) = items.first() {
            self.latest_seen = self.latest_seen.max(newest.created_at);
        }
        self.items = items;
        self.loading = false;
    }

    /// Insert one newly-added item. Returns false if the id was already
    /// present (the event is discarded).
    pub fn apply_added(&mut self, item: FeedItem) -> bool {
        if self.contains(&item.id) {
            return false;
        }

        self.latest_seen = self.latest_seen.max(item.created_at);

        // Insert after existing items with the same timestamp
        let pos = self
            .items
            .partition_point(|i| i.created_at >= item.created_at);
        self.items.insert(pos, item);
        self.items.truncate(self.limit);
        self.loading = false;
        true
    }

    /// Transport failure: terminal state, the consumer decides whether
    /// to reopen.
    pub fn fail(&mut self) {
        self.loading = false;
        self.failed = true;
    }

    // ===== Mutation support =====

    /// Merge `fields` into the payload of the item at `id`, returning the
    /// post-patch value. No-op when the item is absent.
    pub fn patch(&mut self, id: &str, fields: &Map<String, Value>) -> Option<FeedItem> {
        let item = self.items.iter_mut().find(|i| i.id == id)?;
        for (key, value) in fields {
            item.payload.insert(key.clone(), value.clone());
        }
        Some(item.clone())
    }

    /// Restore `original` at `id`, but only if the item still holds the
    /// value `applied` left behind. A newer racing mutation's value is
    /// never clobbered; an item deleted since dispatch is left alone.
    pub fn revert(&mut self, id: &str, original: &FeedItem, applied: &FeedItem) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            if *item == *applied {
                *item = original.clone();
            }
        }
    }
}

/// Thread-safe handle to a FeedStore, shared between the subscription
/// callbacks and the consuming view.
#[derive(Debug, Clone)]
pub struct SharedFeedStore {
    inner: Arc<RwLock<FeedStore>>,
}

impl SharedFeedStore {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(FeedStore::new(limit))),
        }
    }

    pub fn apply_snapshot(&self, items: Vec<FeedItem>) {
        self.inner.write().apply_snapshot(items);
    }

    pub fn apply_added(&self, item: FeedItem) -> bool {
        self.inner.write().apply_added(item)
    }

    pub fn fail(&self) {
        self.inner.write().fail();
    }

    pub fn patch(&self, id: &str, fields: &Map<String, Value>) -> Option<FeedItem> {
        self.inner.write().patch(id, fields)
    }

    pub fn revert(&self, id: &str, original: &FeedItem, applied: &FeedItem) {
        self.inner.write().revert(id, original, applied);
    }

    pub fn get(&self, id: &str) -> Option<FeedItem> {
        self.inner.read().get(id).cloned()
    }

    pub fn items(&self) -> Vec<FeedItem> {
        self.inner.read().items().to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn latest_seen(&self) -> u64 {
        self.inner.read().latest_seen()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.read().is_loading()
    }

    pub fn has_failed(&self) -> bool {
        self.inner.read().has_failed()
    }
}
