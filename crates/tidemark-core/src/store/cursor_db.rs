use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::models::ReadCursor;

#[derive(Debug, thiserror::Error)]
pub enum CursorDbError {
    #[error("Sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable storage for read cursors, shared by every execution context
/// on the same profile. One row per feed: the numeric watermark and the
/// JSON-encoded acknowledged-id array.
#[derive(Clone)]
pub struct CursorDb {
    conn: Arc<Mutex<Connection>>,
}

impl CursorDb {
    pub fn open<P: AsRef<Path>>(db_dir: P) -> Result<Self, CursorDbError> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir)?;

        let path = db_dir.join("cursors.db");
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cursors (
                feed TEXT PRIMARY KEY,
                last_seen_at INTEGER NOT NULL,
                ack_ids TEXT NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Load the cursor for `feed`. Absent rows and malformed persisted
    /// state both yield the empty cursor: a corrupted cursor degrades to
    /// "everything unread" rather than failing the caller.
    pub fn load(&self, feed: &str) -> ReadCursor {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT last_seen_at, ack_ids FROM cursors WHERE feed = ?1",
                params![feed],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional();

        match row {
            Ok(Some((last_seen_at, ack_json))) => {
                let ack_ids: HashSet<String> = match serde_json::from_str(&ack_json) {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!("Malformed ack ids for feed '{}', resetting: {}", feed, e);
                        HashSet::new()
                    }
                };
                ReadCursor {
                    last_seen_at: last_seen_at.max(0) as u64,
                    ack_ids,
                }
            }
            Ok(None) => ReadCursor::default(),
            Err(e) => {
                warn!("Failed to read cursor for feed '{}': {}", feed, e);
                ReadCursor::default()
            }
        }
    }

    /// Persist the cursor for `feed`. Synchronous; called on every cursor
    /// mutation so other contexts always find the latest state.
    pub fn store(&self, feed: &str, cursor: &ReadCursor) -> Result<(), CursorDbError> {
        let ack_json = serde_json::to_string(&cursor.ack_ids.iter().collect::<Vec<_>>())
            .unwrap_or_else(|_| "[]".to_string());

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cursors (feed, last_seen_at, ack_ids) VALUES (?1, ?2, ?3)
             ON CONFLICT(feed) DO UPDATE SET last_seen_at = ?2, ack_ids = ?3",
            params![feed, cursor.last_seen_at as i64, ack_json],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_cursor_defaults_to_empty() {
        let dir = tempdir().unwrap();
        let db = CursorDb::open(dir.path()).unwrap();

        let cursor = db.load("submissions");
        assert_eq!(cursor, ReadCursor::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempdir().unwrap();
        let db = CursorDb::open(dir.path()).unwrap();

        let mut cursor = ReadCursor {
            last_seen_at: 1700000000000,
            ack_ids: HashSet::new(),
        };
        cursor.ack("a");
        cursor.ack("b");
        db.store("submissions", &cursor).unwrap();

        let loaded = db.load("submissions");
        assert_eq!(loaded, cursor);

        // Scoped per feed
        assert_eq!(db.load("contacts"), ReadCursor::default());
    }

    #[test]
    fn test_overwrite_wins() {
        let dir = tempdir().unwrap();
        let db = CursorDb::open(dir.path()).unwrap();

        let first = ReadCursor {
            last_seen_at: 100,
            ack_ids: HashSet::new(),
        };
        db.store("submissions", &first).unwrap();

        let second = ReadCursor {
            last_seen_at: 200,
            ack_ids: HashSet::from(["x".to_string()]),
        };
        db.store("submissions", &second).unwrap();

        assert_eq!(db.load("submissions"), second);
    }

    #[test]
    fn test_malformed_ack_ids_degrade_to_empty() {
        let dir = tempdir().unwrap();
        let db = CursorDb::open(dir.path()).unwrap();

        {
            let conn = db.conn.lock();
            conn.execute(
                "INSERT INTO cursors (feed, last_seen_at, ack_ids) VALUES (?1, ?2, ?3)",
                params!["submissions", 500i64, "not json"],
            )
            .unwrap();
        }

        let cursor = db.load("submissions");
        assert_eq!(cursor.last_seen_at, 500);
        assert!(cursor.ack_ids.is_empty());
    }

    #[test]
    fn test_shared_file_across_handles() {
        let dir = tempdir().unwrap();
        let writer = CursorDb::open(dir.path()).unwrap();
        let reader = CursorDb::open(dir.path()).unwrap();

        let cursor = ReadCursor {
            last_seen_at: 42,
            ack_ids: HashSet::new(),
        };
        writer.store("submissions", &cursor).unwrap();

        assert_eq!(reader.load("submissions").last_seen_at, 42);
    }
}
