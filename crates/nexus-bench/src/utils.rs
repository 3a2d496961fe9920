//! Benchmark utilities and helpers.

use nexus_common::error::{NexusError, NexusResult};
use nexus_common::types::{BufferId, CatCacheListRef, CatCacheRef, RelationId};
use nexus_resowner::{
    BufferManager, CatalogCache, Collaborators, LockReleaser, NoIndexScans, OwnerId,
    RelationCache, ResOwnerResult, ResourceOwnerError, ResourceOwnerManager,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Generates `count` buffer ids.
pub fn generate_buffers(count: usize) -> Vec<BufferId> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| BufferId::new(rng.gen_range(1..=u32::MAX)))
        .collect()
}

/// Returns `items` in a seeded random order.
pub fn shuffled<T: Clone>(items: &[T]) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut out = items.to_vec();
    out.shuffle(&mut rng);
    out
}

/// Builds a tree of `depth` levels with `fanout` children per owner and
/// returns the root.
pub fn build_tree(
    owners: &mut ResourceOwnerManager,
    depth: usize,
    fanout: usize,
) -> ResOwnerResult<OwnerId> {
    fn grow(
        owners: &mut ResourceOwnerManager,
        parent: OwnerId,
        depth: usize,
        fanout: usize,
    ) -> ResOwnerResult<()> {
        if depth == 0 {
            return Ok(());
        }
        for i in 0..fanout {
            let child = owners.create(Some(parent), format!("owner-{depth}-{i}"))?;
            grow(owners, child, depth - 1, fanout)?;
        }
        Ok(())
    }

    let root = owners.create(None, "root")?;
    grow(owners, root, depth, fanout)?;
    Ok(root)
}

/// Lists `root` and every owner below it.
pub fn subtree(owners: &ResourceOwnerManager, root: OwnerId) -> Vec<OwnerId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        out.push(id);
        if let Ok(children) = owners.children(id) {
            stack.extend(children);
        }
    }
    out
}

fn active(owners: &ResourceOwnerManager) -> NexusResult<OwnerId> {
    owners
        .current_owner()
        .ok_or_else(|| NexusError::internal("no active resource owner"))
}

fn to_nexus(err: ResourceOwnerError) -> NexusError {
    NexusError::internal(err.to_string())
}

/// Buffer manager that only forgets.
#[derive(Debug, Default)]
pub struct ForgetBuffers;

impl BufferManager for ForgetBuffers {
    fn release_buffer(
        &mut self,
        owners: &mut ResourceOwnerManager,
        buffer: BufferId,
    ) -> NexusResult<()> {
        owners
            .forget_buffer(owners.current_buffer_owner(), buffer)
            .map_err(to_nexus)
    }
}

/// Relation cache that only forgets.
#[derive(Debug, Default)]
pub struct ForgetRelations;

impl RelationCache for ForgetRelations {
    fn close_relation(
        &mut self,
        owners: &mut ResourceOwnerManager,
        relation: RelationId,
    ) -> NexusResult<()> {
        let owner = active(owners)?;
        owners.forget_relation_ref(owner, relation).map_err(to_nexus)
    }
}

/// Catalog cache that only forgets.
#[derive(Debug, Default)]
pub struct ForgetCatalog;

impl CatalogCache for ForgetCatalog {
    fn release_cache_entry(
        &mut self,
        owners: &mut ResourceOwnerManager,
        entry: CatCacheRef,
    ) -> NexusResult<()> {
        let owner = active(owners)?;
        owners.forget_catcache_ref(owner, entry).map_err(to_nexus)
    }

    fn release_cache_list(
        &mut self,
        owners: &mut ResourceOwnerManager,
        list: CatCacheListRef,
    ) -> NexusResult<()> {
        let owner = active(owners)?;
        owners.forget_catcache_list_ref(owner, list).map_err(to_nexus)
    }
}

/// Lock releaser with nothing to release.
#[derive(Debug, Default)]
pub struct NoLocks;

impl LockReleaser for NoLocks {
    fn release_all_locks(&mut self, _is_commit: bool) -> NexusResult<()> {
        Ok(())
    }

    fn reassign_locks(&mut self, _owner: OwnerId, _parent: OwnerId) -> NexusResult<()> {
        Ok(())
    }

    fn release_owner_locks(&mut self, _owner: OwnerId) -> NexusResult<()> {
        Ok(())
    }
}

/// Collaborators that forget whatever they are asked to release.
#[derive(Debug, Default)]
pub struct ForgetAll {
    buffers: ForgetBuffers,
    relations: ForgetRelations,
    catalog: ForgetCatalog,
    locks: NoLocks,
    scans: NoIndexScans,
}

impl ForgetAll {
    /// Borrows the collaborators for one release call.
    pub fn collaborators(&mut self) -> Collaborators<'_> {
        Collaborators::new(
            &mut self.buffers,
            &mut self.relations,
            &mut self.catalog,
            &mut self.locks,
            &mut self.scans,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_tree_shape() {
        let mut owners = ResourceOwnerManager::new();
        let root = build_tree(&mut owners, 2, 3).unwrap();

        assert_eq!(owners.owner_count(), 1 + 3 + 9);
        assert_eq!(subtree(&owners, root).len(), 13);
        assert_eq!(owners.children(root).unwrap().len(), 3);
    }

    #[test]
    fn test_forget_all_drains_tree() {
        let mut owners = ResourceOwnerManager::new();
        let root = build_tree(&mut owners, 1, 2).unwrap();
        for id in subtree(&owners, root) {
            owners.enlarge_buffers(id.into()).unwrap();
            owners.remember_buffer(id.into(), BufferId::new(1)).unwrap();
        }

        let mut forget = ForgetAll::default();
        owners
            .release_all_phases(root, false, true, &mut forget.collaborators())
            .unwrap();
        owners.delete(root).unwrap();
        assert_eq!(owners.owner_count(), 0);
    }
}
