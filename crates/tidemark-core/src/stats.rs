use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

/// Per-feed reconciliation counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FeedCounters {
    /// Full-snapshot events applied
    pub snapshots: u64,
    /// Incremental adds accepted into the mirror
    pub increments: u64,
    /// Incremental adds discarded because the id was already present
    pub duplicates: u64,
    /// Records dropped at the normalization boundary (no usable id)
    pub discarded: u64,
}

/// Stats for events received from the transport, keyed by feed.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FeedStats {
    pub by_feed: HashMap<String, FeedCounters>,
    /// Total transport events seen across all feeds
    pub total: u64,
}

impl FeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_snapshot(&mut self, feed: &str) {
        self.total += 1;
        self.counters_mut(feed).snapshots += 1;
    }

    pub fn record_increment(&mut self, feed: &str) {
        self.total += 1;
        self.counters_mut(feed).increments += 1;
    }

    pub fn record_duplicate(&mut self, feed: &str) {
        self.total += 1;
        self.counters_mut(feed).duplicates += 1;
    }

    pub fn record_discarded(&mut self, feed: &str) {
        self.counters_mut(feed).discarded += 1;
    }

    pub fn counters(&self, feed: &str) -> FeedCounters {
        self.by_feed.get(feed).cloned().unwrap_or_default()
    }

    /// Get feeds sorted by total accepted events (descending)
    pub fn feeds_by_activity(&self) -> Vec<(String, u64)> {
        let mut feeds: Vec<_> = self
            .by_feed
            .iter()
            .map(|(f, c)| (f.clone(), c.snapshots + c.increments))
            .collect();
        feeds.sort_by(|a, b| b.1.cmp(&a.1));
        feeds
    }

    fn counters_mut(&mut self, feed: &str) -> &mut FeedCounters {
        self.by_feed.entry(feed.to_string()).or_default()
    }
}

/// Thread-safe wrapper for feed stats
#[derive(Debug, Clone)]
pub struct SharedFeedStats {
    inner: Arc<RwLock<FeedStats>>,
}

impl Default for SharedFeedStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedFeedStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(FeedStats::new())),
        }
    }

    pub fn record_snapshot(&self, feed: &str) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_snapshot(feed);
        }
    }

    pub fn record_increment(&self, feed: &str) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_increment(feed);
        }
    }

    pub fn record_duplicate(&self, feed: &str) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_duplicate(feed);
        }
    }

    pub fn record_discarded(&self, feed: &str) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_discarded(feed);
        }
    }

    pub fn snapshot(&self) -> FeedStats {
        self.inner.read().map(|s| s.clone()).unwrap_or_default()
    }
}
