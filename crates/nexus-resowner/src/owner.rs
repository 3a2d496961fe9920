//! Owner nodes and the arena that links them into a tree.
//!
//! Owners live in slots of an [`OwnerTree`] and are addressed by [`OwnerId`],
//! an index paired with the slot's generation. Deleting an owner bumps the
//! generation, so a stale id is reported as unknown instead of silently
//! naming whatever owner reuses the slot.
//!
//! # Child order
//!
//! ```text
//!            root
//!          /      \
//!     (newest)   (oldest)
//!        B          A
//!                   |
//!                   A1
//! ```
//!
//! A new child goes to the head of its parent's list, so traversal finds the
//! most recently created child first. Nothing else about sibling order is
//! guaranteed.

use std::fmt;

use nexus_common::config::ResourceOwnerConfig;

use crate::error::{ResOwnerResult, ResourceOwnerError};
use crate::kind::{BufferPins, CatCacheListRefs, CatCacheRefs, RelationRefs};
use crate::registry::ResourceArray;

/// Handle naming one owner in an [`OwnerTree`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId {
    index: u32,
    generation: u32,
}

impl OwnerId {
    /// Returns the slot index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the slot generation.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Owner argument for buffer pin tracking.
///
/// Buffers are the one kind that may be pinned outside any transactional
/// scope, e.g. during recovery. Pins taken under [`BufferOwner::Untracked`]
/// are not recorded and the caller alone must release them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferOwner {
    /// Record the pin against this owner.
    Tracked(OwnerId),
    /// No active scope; nothing is recorded.
    Untracked,
}

impl From<Option<OwnerId>> for BufferOwner {
    fn from(owner: Option<OwnerId>) -> Self {
        match owner {
            Some(id) => BufferOwner::Tracked(id),
            None => BufferOwner::Untracked,
        }
    }
}

impl From<OwnerId> for BufferOwner {
    fn from(owner: OwnerId) -> Self {
        BufferOwner::Tracked(owner)
    }
}

/// Remaining resources of one owner, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    /// Buffer pins.
    pub buffers: usize,
    /// Catalog cache entry references.
    pub catcache_refs: usize,
    /// Catalog cache list references.
    pub catcache_list_refs: usize,
    /// Relation cache references.
    pub relation_refs: usize,
}

impl ResourceCounts {
    /// Total number of held resources.
    pub fn total(&self) -> usize {
        self.buffers + self.catcache_refs + self.catcache_list_refs + self.relation_refs
    }

    /// Returns the first non-empty kind and its count.
    fn first_held(&self) -> Option<(&'static str, usize)> {
        [
            ("buffer", self.buffers),
            ("catcache reference", self.catcache_refs),
            ("catcache list reference", self.catcache_list_refs),
            ("relcache reference", self.relation_refs),
        ]
        .into_iter()
        .find(|(_, count)| *count > 0)
    }
}

/// One scope in the tree: a transaction, subtransaction or portal.
pub struct OwnerNode {
    name: String,
    parent: Option<OwnerId>,
    /// Children; the head of the list is the last element.
    children: Vec<OwnerId>,
    pub(crate) buffers: ResourceArray<BufferPins>,
    pub(crate) catrefs: ResourceArray<CatCacheRefs>,
    pub(crate) catlistrefs: ResourceArray<CatCacheListRefs>,
    pub(crate) relrefs: ResourceArray<RelationRefs>,
}

impl OwnerNode {
    fn new(name: String, parent: Option<OwnerId>, initial_capacity: usize) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            buffers: ResourceArray::with_initial_capacity(initial_capacity),
            catrefs: ResourceArray::with_initial_capacity(initial_capacity),
            catlistrefs: ResourceArray::with_initial_capacity(initial_capacity),
            relrefs: ResourceArray::with_initial_capacity(initial_capacity),
        }
    }

    /// Debug label; not unique.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent owner, or `None` for a root.
    pub fn parent(&self) -> Option<OwnerId> {
        self.parent
    }

    /// Children, most recently attached first.
    pub fn children(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.children.iter().rev().copied()
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Buffer pins held by this owner.
    pub fn buffers(&self) -> &ResourceArray<BufferPins> {
        &self.buffers
    }

    /// Catalog cache entry references held by this owner.
    pub fn catcache_refs(&self) -> &ResourceArray<CatCacheRefs> {
        &self.catrefs
    }

    /// Catalog cache list references held by this owner.
    pub fn catcache_list_refs(&self) -> &ResourceArray<CatCacheListRefs> {
        &self.catlistrefs
    }

    /// Relation references held by this owner.
    pub fn relation_refs(&self) -> &ResourceArray<RelationRefs> {
        &self.relrefs
    }

    /// Counts of held resources per kind.
    pub fn resource_counts(&self) -> ResourceCounts {
        ResourceCounts {
            buffers: self.buffers.len(),
            catcache_refs: self.catrefs.len(),
            catcache_list_refs: self.catlistrefs.len(),
            relation_refs: self.relrefs.len(),
        }
    }

    /// Returns true if all four arrays are empty.
    pub fn is_drained(&self) -> bool {
        self.resource_counts().total() == 0
    }
}

impl fmt::Debug for OwnerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerNode")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("resources", &self.resource_counts())
            .finish()
    }
}

struct Slot {
    generation: u32,
    node: Option<OwnerNode>,
}

/// Arena holding every owner of a session.
pub struct OwnerTree {
    slots: Vec<Slot>,
    /// Indexes of vacant slots.
    free: Vec<u32>,
    live: usize,
    initial_capacity: usize,
}

impl OwnerTree {
    /// Creates an empty tree.
    pub fn new(config: &ResourceOwnerConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            initial_capacity: config.initial_capacity,
        }
    }

    /// Number of live owners.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no owner is live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns true if `id` names a live owner.
    pub fn contains(&self, id: OwnerId) -> bool {
        self.get(id).is_ok()
    }

    /// Looks up a live owner.
    pub fn get(&self, id: OwnerId) -> ResOwnerResult<&OwnerNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(ResourceOwnerError::UnknownOwner { id })
    }

    /// Looks up a live owner mutably.
    pub fn get_mut(&mut self, id: OwnerId) -> ResOwnerResult<&mut OwnerNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(ResourceOwnerError::UnknownOwner { id })
    }

    /// Debug label of an owner, or its id if it is gone.
    pub fn name_of(&self, id: OwnerId) -> String {
        self.get(id)
            .map_or_else(|_| id.to_string(), |node| node.name.clone())
    }

    /// Creates an owner, linking it at the head of `parent`'s child list.
    pub fn create(&mut self, parent: Option<OwnerId>, name: String) -> ResOwnerResult<OwnerId> {
        if let Some(parent) = parent {
            let node = self.get_mut(parent)?;
            node.children
                .try_reserve(1)
                .map_err(|_| ResourceOwnerError::OutOfMemory {
                    kind: "child owner",
                    requested: node.children.len() + 1,
                })?;
        }

        let node = OwnerNode::new(name, parent, self.initial_capacity);
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                OwnerId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots
                    .try_reserve(1)
                    .map_err(|_| ResourceOwnerError::OutOfMemory {
                        kind: "resource owner",
                        requested: self.slots.len() + 1,
                    })?;
                let index = u32::try_from(self.slots.len()).map_err(|_| {
                    ResourceOwnerError::OutOfMemory {
                        kind: "resource owner",
                        requested: self.slots.len() + 1,
                    }
                })?;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                OwnerId {
                    index,
                    generation: 0,
                }
            }
        };

        if let Some(parent) = parent {
            self.get_mut(parent)?.children.push(id);
        }
        self.live += 1;
        Ok(id)
    }

    /// Returns true if `id` is `ancestor` or lies below it.
    pub fn is_in_subtree(&self, ancestor: OwnerId, id: OwnerId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.get(current).ok().and_then(OwnerNode::parent);
        }
        false
    }

    /// Moves `id` under `new_parent`, or makes it a root if `None`.
    pub fn set_parent(&mut self, id: OwnerId, new_parent: Option<OwnerId>) -> ResOwnerResult<()> {
        let old_parent = self.get(id)?.parent;

        if let Some(new_parent) = new_parent {
            if new_parent == id {
                return Err(ResourceOwnerError::SelfParent {
                    owner: self.name_of(id),
                });
            }
            if self.is_in_subtree(id, new_parent) {
                return Err(ResourceOwnerError::CyclicParent {
                    owner: self.name_of(id),
                    new_parent: self.name_of(new_parent),
                });
            }
            let node = self.get_mut(new_parent)?;
            node.children
                .try_reserve(1)
                .map_err(|_| ResourceOwnerError::OutOfMemory {
                    kind: "child owner",
                    requested: node.children.len() + 1,
                })?;
        }

        if let Some(old_parent) = old_parent {
            let siblings = &mut self.get_mut(old_parent)?.children;
            if siblings.last() == Some(&id) {
                siblings.pop();
            } else if let Some(pos) = siblings.iter().position(|c| *c == id) {
                siblings.remove(pos);
            }
        }

        self.get_mut(id)?.parent = new_parent;
        if let Some(new_parent) = new_parent {
            self.get_mut(new_parent)?.children.push(id);
        }
        Ok(())
    }

    /// Finds the first owner in the subtree of `id` that still holds
    /// resources.
    pub fn find_undrained(&self, id: OwnerId) -> ResOwnerResult<Option<(OwnerId, ResourceCounts)>> {
        let node = self.get(id)?;
        if !node.is_drained() {
            return Ok(Some((id, node.resource_counts())));
        }
        for child in node.children() {
            if let Some(found) = self.find_undrained(child)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Deletes `id` and its whole subtree.
    ///
    /// Every owner in the subtree must be drained; this is checked before
    /// anything is unlinked, so a refused delete leaves the tree unchanged.
    pub fn delete(&mut self, id: OwnerId) -> ResOwnerResult<()> {
        if let Some((owner, counts)) = self.find_undrained(id)? {
            let (kind, count) = counts.first_held().unwrap_or(("resource", counts.total()));
            return Err(ResourceOwnerError::OwnerNotEmpty {
                owner: self.name_of(owner),
                kind,
                count,
            });
        }
        self.delete_drained(id)
    }

    fn delete_drained(&mut self, id: OwnerId) -> ResOwnerResult<()> {
        // Each recursive call unlinks the child from our list.
        while let Some(child) = self.get(id)?.children.last().copied() {
            self.delete_drained(child)?;
        }

        // Unlink before freeing: a failure past this point leaks a detached
        // node instead of leaving a dangling child in a live tree.
        self.set_parent(id, None)?;

        let slot = &mut self.slots[id.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Ok(())
    }
}

impl fmt::Debug for OwnerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerTree")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("free", &self.free.len())
            .finish()
    }
}
