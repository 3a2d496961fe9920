//! Interfaces of the subsystems whose resources are tracked.
//!
//! Each release operation receives the owner manager so it can call the
//! matching Forget before returning. The release protocol checks that it did.

use std::fmt;

use nexus_common::error::NexusResult;
use nexus_common::types::{BufferId, CatCacheListRef, CatCacheRef, RelationId};

use crate::manager::ResourceOwnerManager;
use crate::owner::OwnerId;

/// Buffer manager side of buffer pin tracking.
pub trait BufferManager {
    /// Drops one pin on `buffer` held by the active owner.
    fn release_buffer(
        &mut self,
        owners: &mut ResourceOwnerManager,
        buffer: BufferId,
    ) -> NexusResult<()>;
}

/// Relation cache side of relation reference tracking.
pub trait RelationCache {
    /// Closes one reference to `relation` held by the active owner.
    fn close_relation(
        &mut self,
        owners: &mut ResourceOwnerManager,
        relation: RelationId,
    ) -> NexusResult<()>;

    /// Human-readable relation name for leak warnings.
    fn relation_name(&self, _relation: RelationId) -> Option<String> {
        None
    }
}

/// Catalog cache side of entry and list reference tracking.
pub trait CatalogCache {
    /// Drops one reference to a single cache entry.
    fn release_cache_entry(
        &mut self,
        owners: &mut ResourceOwnerManager,
        entry: CatCacheRef,
    ) -> NexusResult<()>;

    /// Drops one reference to a cache search-result list.
    fn release_cache_list(
        &mut self,
        owners: &mut ResourceOwnerManager,
        list: CatCacheListRef,
    ) -> NexusResult<()>;
}

/// Lock manager operations used by the LOCKS phase.
pub trait LockReleaser {
    /// Releases every lock of the transaction in one call.
    fn release_all_locks(&mut self, is_commit: bool) -> NexusResult<()>;

    /// Hands the locks held by `owner` to `parent`.
    fn reassign_locks(&mut self, owner: OwnerId, parent: OwnerId) -> NexusResult<()>;

    /// Releases the locks held by `owner` now.
    fn release_owner_locks(&mut self, owner: OwnerId) -> NexusResult<()>;
}

/// Cleanup of per-access-method scan state not tracked by any array.
pub trait IndexScanCleanup {
    /// Ends GiST scans left open by the active owner.
    fn release_gist_scans(&mut self) -> NexusResult<()>;

    /// Ends hash index scans left open by the active owner.
    fn release_hash_scans(&mut self) -> NexusResult<()>;
}

/// [`IndexScanCleanup`] for sessions without GiST or hash scans.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndexScans;

impl IndexScanCleanup for NoIndexScans {
    fn release_gist_scans(&mut self) -> NexusResult<()> {
        Ok(())
    }

    fn release_hash_scans(&mut self) -> NexusResult<()> {
        Ok(())
    }
}

/// The external subsystems a release call talks to.
pub struct Collaborators<'a> {
    /// Buffer manager.
    pub buffers: &'a mut dyn BufferManager,
    /// Relation cache.
    pub relations: &'a mut dyn RelationCache,
    /// Catalog cache.
    pub catalog: &'a mut dyn CatalogCache,
    /// Lock manager.
    pub locks: &'a mut dyn LockReleaser,
    /// Index scan cleanup.
    pub index_scans: &'a mut dyn IndexScanCleanup,
}

impl<'a> Collaborators<'a> {
    /// Bundles the five collaborators.
    pub fn new(
        buffers: &'a mut dyn BufferManager,
        relations: &'a mut dyn RelationCache,
        catalog: &'a mut dyn CatalogCache,
        locks: &'a mut dyn LockReleaser,
        index_scans: &'a mut dyn IndexScanCleanup,
    ) -> Self {
        Self {
            buffers,
            relations,
            catalog,
            locks,
            index_scans,
        }
    }
}

impl fmt::Debug for Collaborators<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
