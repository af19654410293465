use std::collections::HashSet;

use serde::Serialize;

use crate::models::FeedItem;

/// The read/unread boundary for one feed.
///
/// Hybrid scheme: everything at or before `last_seen_at` is implicitly
/// read; `ack_ids` holds items explicitly opened even though they are
/// newer than the watermark. A pure timestamp cannot represent "I read
/// this one old item but not that newer one"; a pure id set cannot
/// represent "everything before T is read" without enumerating history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadCursor {
    pub last_seen_at: u64,
    pub ack_ids: HashSet<String>,
}

impl ReadCursor {
    /// Whether this cursor classifies `item` as read.
    pub fn covers(&self, item: &FeedItem) -> bool {
        item.created_at <= self.last_seen_at || self.ack_ids.contains(&item.id)
    }

    /// Acknowledge a single item without advancing the watermark, so
    /// other unopened items newer than this one stay unread.
    pub fn ack(&mut self, id: &str) {
        self.ack_ids.insert(id.to_string());
    }

    /// Advance the watermark to `now_ms` and acknowledge every given
    /// item. Acknowledgements implied by the new watermark are dropped
    /// here; this is the only point where pruning the id set is safe.
    pub fn ack_all<'a>(&mut self, items: impl IntoIterator<Item = &'a FeedItem>, now_ms: u64) {
        self.last_seen_at = now_ms;
        self.ack_ids.clear();
        for item in items {
            self.ack_ids.insert(item.id.clone());
        }
    }
}
