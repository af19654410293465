use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::bus::{Listener, Signal, SignalBus};
use crate::models::{now_ms, FeedItem, ReadCursor};
use crate::store::{CursorDb, CursorDbError};

/// Classifies feed items as read/unread against the durable cursor,
/// consistently across execution contexts.
///
/// The cursor is cached in memory; any `CursorChanged` signal for this
/// feed marks the cache stale, and the next query reloads from durable
/// storage and treats it as authoritative. This is what keeps two open
/// contexts from showing conflicting unread state.
pub struct UnreadTracker {
    feed: String,
    db: CursorDb,
    bus: SignalBus,
    cursor: Mutex<ReadCursor>,
    stale: Arc<AtomicBool>,
    // Keeps the bus registration alive for the tracker's lifetime
    _listener: Arc<Listener>,
}

impl UnreadTracker {
    pub fn new(feed: &str, db: CursorDb, bus: SignalBus) -> Self {
        let stale = Arc::new(AtomicBool::new(false));

        let listener: Arc<Listener> = {
            let feed = feed.to_string();
            let stale = stale.clone();
            Arc::new(move |signal: &Signal| {
                let Signal::CursorChanged { feed: changed } = signal;
                if *changed == feed {
                    stale.store(true, Ordering::SeqCst);
                }
            })
        };
        bus.subscribe(&listener);

        Self {
            feed: feed.to_string(),
            cursor: Mutex::new(db.load(feed)),
            db,
            bus,
            stale,
            _listener: listener,
        }
    }

    /// True iff the item is newer than the watermark and has not been
    /// individually acknowledged.
    pub fn is_unread(&self, item: &FeedItem) -> bool {
        !self.current().covers(item)
    }

    /// Whether anything newer than the watermark has been observed.
    /// `latest_seen` is the mirror's monotonic newest-timestamp value,
    /// so newness survives items scrolling out of the bounded window.
    pub fn has_new(&self, latest_seen: u64) -> bool {
        latest_seen > self.current().last_seen_at
    }

    /// Unread items among `items`, classified against one cursor
    /// snapshot.
    pub fn unread_count(&self, items: &[FeedItem]) -> usize {
        let cursor = self.current();
        items.iter().filter(|i| !cursor.covers(i)).count()
    }

    /// Advance the watermark to now, acknowledge `items`, persist, and
    /// signal other contexts.
    pub fn mark_all_read(&self, items: &[FeedItem]) -> Result<(), CursorDbError> {
        let updated = {
            let mut cursor = self.lock_fresh();
            cursor.ack_all(items, now_ms());
            cursor.clone()
        };
        self.db.store(&self.feed, &updated)?;
        debug!("Marked all read on feed '{}'", self.feed);
        self.bus.emit(Signal::CursorChanged {
            feed: self.feed.clone(),
        });
        Ok(())
    }

    /// Acknowledge a single opened item without advancing the watermark;
    /// other unopened items newer than this one stay unread.
    pub fn mark_one_read(&self, id: &str) -> Result<(), CursorDbError> {
        let updated = {
            let mut cursor = self.lock_fresh();
            cursor.ack(id);
            cursor.clone()
        };
        self.db.store(&self.feed, &updated)?;
        self.bus.emit(Signal::CursorChanged {
            feed: self.feed.clone(),
        });
        Ok(())
    }

    /// The cursor state this tracker currently answers from.
    pub fn cursor(&self) -> ReadCursor {
        self.current()
    }

    fn current(&self) -> ReadCursor {
        self.lock_fresh().clone()
    }

    /// Lock the cached cursor, reloading from storage first if a signal
    /// marked it stale. Storage is authoritative after any signal.
    fn lock_fresh(&self) -> parking_lot::MutexGuard<'_, ReadCursor> {
        let mut cursor = self.cursor.lock();
        if self.stale.swap(false, Ordering::SeqCst) {
            *cursor = self.db.load(&self.feed);
        }
        cursor
    }
}
