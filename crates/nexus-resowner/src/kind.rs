//! The four kinds of resource an owner tracks.
//!
//! Each kind is an uninhabited marker type implementing [`ResourceKind`]. The
//! trait binds the kind to its handle type, to its array inside an
//! [`OwnerNode`], to the collaborator call that releases it and to the text of
//! its leak warning. The registry and release code are written once against
//! the trait.

use std::fmt;

use nexus_common::error::NexusResult;
use nexus_common::types::{BufferId, CatCacheListRef, CatCacheRef, RelationId};
use tracing::warn;

use crate::manager::ResourceOwnerManager;
use crate::managers::Collaborators;
use crate::owner::OwnerNode;
use crate::registry::ResourceArray;

/// Runtime tag for a resource kind, used in stats and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Shared buffer pin.
    BufferPin,
    /// Catalog cache entry reference.
    CatCacheRef,
    /// Catalog cache list reference.
    CatCacheListRef,
    /// Relation cache reference.
    RelationRef,
}

impl ResourceType {
    /// All resource types, in release order.
    pub const ALL: [ResourceType; 4] = [
        ResourceType::BufferPin,
        ResourceType::RelationRef,
        ResourceType::CatCacheRef,
        ResourceType::CatCacheListRef,
    ];

    /// Human-readable name used in errors and warnings.
    pub const fn name(self) -> &'static str {
        match self {
            ResourceType::BufferPin => "buffer",
            ResourceType::CatCacheRef => "catcache reference",
            ResourceType::CatCacheListRef => "catcache list reference",
            ResourceType::RelationRef => "relcache reference",
        }
    }

    /// Dense index for per-kind counters.
    pub(crate) const fn index(self) -> usize {
        match self {
            ResourceType::BufferPin => 0,
            ResourceType::CatCacheRef => 1,
            ResourceType::CatCacheListRef => 2,
            ResourceType::RelationRef => 3,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A kind of resource that can be remembered by an owner.
pub trait ResourceKind: Sized + 'static {
    /// The opaque handle the owning subsystem hands out.
    type Handle: Copy + PartialEq + fmt::Debug + fmt::Display;

    /// Runtime tag of this kind.
    const TYPE: ResourceType;

    /// Returns this kind's array inside `node`.
    fn array(node: &OwnerNode) -> &ResourceArray<Self>;

    /// Returns this kind's array inside `node`, mutably.
    fn array_mut(node: &mut OwnerNode) -> &mut ResourceArray<Self>;

    /// Hands `handle` back to the subsystem that owns it.
    ///
    /// The collaborator is expected to call the matching Forget on `owners`
    /// before returning.
    fn release(
        collaborators: &mut Collaborators<'_>,
        owners: &mut ResourceOwnerManager,
        handle: Self::Handle,
    ) -> NexusResult<()>;

    /// Logs that `handle` was still held when `owner` committed.
    fn warn_leak(_collaborators: &Collaborators<'_>, owner: &str, handle: Self::Handle) {
        warn!(
            kind = Self::TYPE.name(),
            %handle,
            owner,
            "{} leak: {} still held at commit",
            Self::TYPE.name(),
            handle
        );
    }
}

/// Shared buffer pins.
#[derive(Debug)]
pub enum BufferPins {}

impl ResourceKind for BufferPins {
    type Handle = BufferId;
    const TYPE: ResourceType = ResourceType::BufferPin;

    fn array(node: &OwnerNode) -> &ResourceArray<Self> {
        &node.buffers
    }

    fn array_mut(node: &mut OwnerNode) -> &mut ResourceArray<Self> {
        &mut node.buffers
    }

    fn release(
        collaborators: &mut Collaborators<'_>,
        owners: &mut ResourceOwnerManager,
        handle: BufferId,
    ) -> NexusResult<()> {
        collaborators.buffers.release_buffer(owners, handle)
    }

    fn warn_leak(_collaborators: &Collaborators<'_>, owner: &str, handle: BufferId) {
        warn!(
            kind = Self::TYPE.name(),
            buffer = handle.as_u32(),
            owner,
            "buffer refcount leak: buffer {} still pinned",
            handle
        );
    }
}

/// References to single catalog cache entries.
#[derive(Debug)]
pub enum CatCacheRefs {}

impl ResourceKind for CatCacheRefs {
    type Handle = CatCacheRef;
    const TYPE: ResourceType = ResourceType::CatCacheRef;

    fn array(node: &OwnerNode) -> &ResourceArray<Self> {
        &node.catrefs
    }

    fn array_mut(node: &mut OwnerNode) -> &mut ResourceArray<Self> {
        &mut node.catrefs
    }

    fn release(
        collaborators: &mut Collaborators<'_>,
        owners: &mut ResourceOwnerManager,
        handle: CatCacheRef,
    ) -> NexusResult<()> {
        collaborators.catalog.release_cache_entry(owners, handle)
    }
}

/// References to catalog cache search-result lists.
#[derive(Debug)]
pub enum CatCacheListRefs {}

impl ResourceKind for CatCacheListRefs {
    type Handle = CatCacheListRef;
    const TYPE: ResourceType = ResourceType::CatCacheListRef;

    fn array(node: &OwnerNode) -> &ResourceArray<Self> {
        &node.catlistrefs
    }

    fn array_mut(node: &mut OwnerNode) -> &mut ResourceArray<Self> {
        &mut node.catlistrefs
    }

    fn release(
        collaborators: &mut Collaborators<'_>,
        owners: &mut ResourceOwnerManager,
        handle: CatCacheListRef,
    ) -> NexusResult<()> {
        collaborators.catalog.release_cache_list(owners, handle)
    }
}

/// Open relation cache references.
#[derive(Debug)]
pub enum RelationRefs {}

impl ResourceKind for RelationRefs {
    type Handle = RelationId;
    const TYPE: ResourceType = ResourceType::RelationRef;

    fn array(node: &OwnerNode) -> &ResourceArray<Self> {
        &node.relrefs
    }

    fn array_mut(node: &mut OwnerNode) -> &mut ResourceArray<Self> {
        &mut node.relrefs
    }

    fn release(
        collaborators: &mut Collaborators<'_>,
        owners: &mut ResourceOwnerManager,
        handle: RelationId,
    ) -> NexusResult<()> {
        collaborators.relations.close_relation(owners, handle)
    }

    fn warn_leak(collaborators: &Collaborators<'_>, owner: &str, handle: RelationId) {
        let name = collaborators
            .relations
            .relation_name(handle)
            .unwrap_or_else(|| handle.to_string());
        warn!(
            kind = Self::TYPE.name(),
            relation = handle.as_u32(),
            owner,
            "relcache reference leak: relation \"{}\" not closed",
            name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(BufferPins::TYPE.name(), "buffer");
        assert_eq!(RelationRefs::TYPE.to_string(), "relcache reference");
        assert_eq!(CatCacheListRefs::TYPE.name(), "catcache list reference");
    }

    #[test]
    fn test_type_indexes_are_dense() {
        let mut seen = [false; 4];
        for ty in ResourceType::ALL {
            assert!(!seen[ty.index()]);
            seen[ty.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
