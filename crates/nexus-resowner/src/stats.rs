//! Resource owner statistics.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::kind::ResourceType;

/// Counters for owner lifecycle and release activity.
#[derive(Debug, Default)]
pub struct ResourceOwnerStats {
    /// Owners created.
    pub owners_created: AtomicU64,
    /// Owners deleted, including descendants removed with their parent.
    pub owners_deleted: AtomicU64,
    /// Successful reparent operations.
    pub reparents: AtomicU64,
    /// Top-level release calls.
    pub release_calls: AtomicU64,
    /// Owners visited across all release calls.
    pub nodes_visited: AtomicU64,
    /// Resources released by the drain loops.
    pub resources_released: AtomicU64,
    /// Leak warnings, indexed by resource type.
    leak_warnings: [AtomicU64; 4],
    /// Callback invocations.
    pub callbacks_invoked: AtomicU64,
}

impl ResourceOwnerStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an owner creation.
    pub fn record_create(&self) {
        self.owners_created.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records `count` owner deletions.
    pub fn record_delete(&self, count: u64) {
        self.owners_deleted.fetch_add(count, AtomicOrdering::Relaxed);
    }

    /// Records a reparent.
    pub fn record_reparent(&self) {
        self.reparents.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a release call.
    pub fn record_release_call(&self) {
        self.release_calls.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a visited node.
    pub fn record_visit(&self) {
        self.nodes_visited.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a drained resource.
    pub fn record_resource_released(&self) {
        self.resources_released.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a leak warning.
    pub fn record_leak(&self, kind: ResourceType) {
        self.leak_warnings[kind.index()].fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records callback invocations.
    pub fn record_callbacks(&self, count: u64) {
        self.callbacks_invoked.fetch_add(count, AtomicOrdering::Relaxed);
    }

    /// Leak warnings emitted for `kind`.
    pub fn leak_warnings(&self, kind: ResourceType) -> u64 {
        self.leak_warnings[kind.index()].load(AtomicOrdering::Relaxed)
    }

    /// Takes a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(AtomicOrdering::Relaxed);
        StatsSnapshot {
            owners_created: load(&self.owners_created),
            owners_deleted: load(&self.owners_deleted),
            reparents: load(&self.reparents),
            release_calls: load(&self.release_calls),
            nodes_visited: load(&self.nodes_visited),
            resources_released: load(&self.resources_released),
            buffer_leaks: self.leak_warnings(ResourceType::BufferPin),
            catcache_leaks: self.leak_warnings(ResourceType::CatCacheRef),
            catcache_list_leaks: self.leak_warnings(ResourceType::CatCacheListRef),
            relation_leaks: self.leak_warnings(ResourceType::RelationRef),
            callbacks_invoked: load(&self.callbacks_invoked),
        }
    }
}

/// Plain copy of [`ResourceOwnerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct StatsSnapshot {
    pub owners_created: u64,
    pub owners_deleted: u64,
    pub reparents: u64,
    pub release_calls: u64,
    pub nodes_visited: u64,
    pub resources_released: u64,
    pub buffer_leaks: u64,
    pub catcache_leaks: u64,
    pub catcache_list_leaks: u64,
    pub relation_leaks: u64,
    pub callbacks_invoked: u64,
}

impl StatsSnapshot {
    /// Leak warnings across all kinds.
    pub fn total_leaks(&self) -> u64 {
        self.buffer_leaks + self.catcache_leaks + self.catcache_list_leaks + self.relation_leaks
    }

    /// Owners created but not yet deleted.
    pub fn live_owners(&self) -> u64 {
        self.owners_created.saturating_sub(self.owners_deleted)
    }
}
