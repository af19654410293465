pub mod cursor;
pub mod feed_item;

pub use cursor::ReadCursor;
pub use feed_item::{now_ms, FeedItem};
