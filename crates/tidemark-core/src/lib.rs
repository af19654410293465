pub mod bus;
pub mod config;
pub mod lifecycle;
pub mod models;
pub mod mutator;
pub mod stats;
pub mod store;
pub mod subscription;
pub mod tracker;
pub mod transport;

pub use bus::{Signal, SignalBus};
pub use config::CoreConfig;
pub use lifecycle::SubscriptionSet;
pub use models::{FeedItem, ReadCursor};
pub use mutator::{MutationError, MutationState, OptimisticMutator, PendingMutation};
pub use stats::{FeedStats, SharedFeedStats};
pub use store::{CursorDb, CursorDbError, FeedStore, SharedFeedStore};
pub use subscription::FeedSubscription;
pub use tracker::UnreadTracker;
pub use transport::{FeedTransport, MemoryTransport, TransportError, TransportEvent, Unsubscriber};
