pub mod cursor_db;
pub mod feed_store;

pub use cursor_db::{CursorDb, CursorDbError};
pub use feed_store::{FeedStore, SharedFeedStore};
