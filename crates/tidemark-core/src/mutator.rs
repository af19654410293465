use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::models::FeedItem;
use crate::store::SharedFeedStore;
use crate::transport::{FeedTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("remote update failed: {0}")]
    Remote(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Committed,
    RolledBack,
}

/// An in-flight optimistic change: the pre-mutation snapshot captured at
/// dispatch time and the value the mutation wrote. Pending resolves to
/// exactly one of Committed or RolledBack.
pub struct PendingMutation {
    id: String,
    snapshot: Option<FeedItem>,
    applied: Option<FeedItem>,
    state: MutationState,
}

impl PendingMutation {
    /// Patch the local mirror immediately and capture both sides of the
    /// change. An item absent from the mirror leaves nothing to patch
    /// and nothing to restore.
    pub fn dispatch(store: &SharedFeedStore, id: &str, fields: &Map<String, Value>) -> Self {
        let snapshot = store.get(id);
        let applied = store.patch(id, fields);
        Self {
            id: id.to_string(),
            snapshot,
            applied,
            state: MutationState::Pending,
        }
    }

    pub fn commit(&mut self) {
        self.state = MutationState::Committed;
    }

    /// Restore the dispatch-time snapshot. Only applies while the item
    /// still holds this mutation's value, so a newer racing mutation is
    /// never clobbered. No-op for an item deleted since dispatch.
    pub fn roll_back(&mut self, store: &SharedFeedStore) {
        if let (Some(original), Some(applied)) = (&self.snapshot, &self.applied) {
            store.revert(&self.id, original, applied);
        }
        self.state = MutationState::RolledBack;
    }

    pub fn state(&self) -> MutationState {
        self.state
    }
}

/// Makes a remote state transition feel synchronous: the local mirror is
/// patched before the remote call is issued, and reverted if it fails.
pub struct OptimisticMutator {
    feed: String,
    store: SharedFeedStore,
    transport: Arc<dyn FeedTransport>,
}

impl OptimisticMutator {
    pub fn new(feed: &str, store: SharedFeedStore, transport: Arc<dyn FeedTransport>) -> Self {
        Self {
            feed: feed.to_string(),
            store,
            transport,
        }
    }

    /// Apply `fields` to the item at `id` locally, then issue the remote
    /// partial update. On failure the local change is reverted and the
    /// error surfaced; user-visible reporting stays with the caller.
    pub async fn mutate(&self, id: &str, fields: Map<String, Value>) -> Result<(), MutationError> {
        let mut pending = PendingMutation::dispatch(&self.store, id, &fields);

        match self.transport.update_fields(&self.feed, id, fields).await {
            Ok(()) => {
                pending.commit();
                Ok(())
            }
            Err(e) => {
                warn!("Mutation of '{}' on feed '{}' failed: {}", id, self.feed, e);
                pending.roll_back(&self.store);
                Err(MutationError::Remote(e))
            }
        }
    }
}
