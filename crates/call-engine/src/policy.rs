//! Interaction policy gate: may these two users signal each other?
//!
//! Blocking is bidirectional in effect even when recorded on one side
//! only, so the gate answers false if either user's lists reference the
//! other. Checked before initiating a call and again before accepting
//! one; a block that lands mid-ring fails the accept.

use async_trait::async_trait;
use dashmap::DashMap;
use ringline_signal_core::UserId;

/// Per-user block/disconnect lists as stored by the external document
/// store: two string-list fields per user record.
#[derive(Debug, Clone, Default)]
pub struct BlockLists {
    pub blocked_users: Vec<UserId>,
    pub disconnected_users: Vec<UserId>,
}

impl BlockLists {
    fn references(&self, user: &UserId) -> bool {
        self.blocked_users.contains(user) || self.disconnected_users.contains(user)
    }
}

/// Read-only view of the external block/disconnect store.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn block_lists(&self, user: &UserId) -> BlockLists;
}

/// The gate itself. `can_signal` is symmetric and commutative.
#[async_trait]
pub trait InteractionPolicy: Send + Sync {
    async fn can_signal(&self, a: &UserId, b: &UserId) -> bool;
}

/// Policy backed by a [`BlockStore`].
pub struct BlockListPolicy<S> {
    store: S,
}

impl<S: BlockStore> BlockListPolicy<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: BlockStore> InteractionPolicy for BlockListPolicy<S> {
    async fn can_signal(&self, a: &UserId, b: &UserId) -> bool {
        let a_lists = self.store.block_lists(a).await;
        if a_lists.references(b) {
            return false;
        }
        let b_lists = self.store.block_lists(b).await;
        !b_lists.references(a)
    }
}

/// Permits everything. For tests and single-tenant deployments.
pub struct AllowAll;

#[async_trait]
impl InteractionPolicy for AllowAll {
    async fn can_signal(&self, _a: &UserId, _b: &UserId) -> bool {
        true
    }
}

/// In-memory [`BlockStore`], used by tests and local tooling.
#[derive(Default)]
pub struct MemoryBlockStore {
    lists: DashMap<UserId, BlockLists>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, user: &UserId, target: &UserId) {
        self.lists
            .entry(user.clone())
            .or_default()
            .blocked_users
            .push(target.clone());
    }

    pub fn disconnect(&self, user: &UserId, target: &UserId) {
        self.lists
            .entry(user.clone())
            .or_default()
            .disconnected_users
            .push(target.clone());
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn block_lists(&self, user: &UserId) -> BlockLists {
        self.lists.get(user).map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BlockStore for std::sync::Arc<MemoryBlockStore> {
    async fn block_lists(&self, user: &UserId) -> BlockLists {
        self.as_ref().block_lists(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unidirectional_block_gates_both_directions() {
        let store = MemoryBlockStore::new();
        let a = UserId::from("alice");
        let b = UserId::from("bob");
        store.block(&a, &b);

        let policy = BlockListPolicy::new(store);
        assert!(!policy.can_signal(&a, &b).await);
        assert!(!policy.can_signal(&b, &a).await);
    }

    #[tokio::test]
    async fn disconnect_lists_also_gate() {
        let store = MemoryBlockStore::new();
        let a = UserId::from("alice");
        let b = UserId::from("bob");
        store.disconnect(&b, &a);

        let policy = BlockListPolicy::new(store);
        assert!(!policy.can_signal(&a, &b).await);
    }

    #[tokio::test]
    async fn unrelated_users_pass() {
        let store = MemoryBlockStore::new();
        let a = UserId::from("alice");
        let b = UserId::from("bob");
        store.block(&a, &UserId::from("carol"));

        let policy = BlockListPolicy::new(store);
        assert!(policy.can_signal(&a, &b).await);
    }
}
