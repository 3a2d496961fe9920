//! Per-session resource owner manager.
//!
//! The manager owns the owner tree, the execution context and the callback
//! list of one session. All mutation goes through `&mut self`, which is the
//! single-writer rule of a session expressed in the type system.

use std::fmt;

use nexus_common::config::ResourceOwnerConfig;
use nexus_common::types::{BufferId, CatCacheListRef, CatCacheRef, RelationId};
use tracing::debug;

use crate::callback::{CallbackArg, CallbackRef, CallbackRegistry};
use crate::context::ExecutionContext;
use crate::error::{ResOwnerResult, ResourceOwnerError};
use crate::kind::{BufferPins, CatCacheListRefs, CatCacheRefs, RelationRefs, ResourceKind};
use crate::owner::{BufferOwner, OwnerId, OwnerNode, OwnerTree, ResourceCounts};
use crate::stats::ResourceOwnerStats;

/// Tracks resources against a tree of owners for one session.
pub struct ResourceOwnerManager {
    pub(crate) tree: OwnerTree,
    pub(crate) context: ExecutionContext,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) config: ResourceOwnerConfig,
    pub(crate) stats: ResourceOwnerStats,
}

impl ResourceOwnerManager {
    /// Creates a manager with the default configuration.
    pub fn new() -> Self {
        let config = ResourceOwnerConfig::default();
        Self {
            tree: OwnerTree::new(&config),
            context: ExecutionContext::new(),
            callbacks: CallbackRegistry::new(),
            config,
            stats: ResourceOwnerStats::new(),
        }
    }

    /// Creates a manager with the given configuration.
    pub fn with_config(config: ResourceOwnerConfig) -> ResOwnerResult<Self> {
        config.validate()?;
        Ok(Self {
            tree: OwnerTree::new(&config),
            context: ExecutionContext::new(),
            callbacks: CallbackRegistry::new(),
            config,
            stats: ResourceOwnerStats::new(),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ResourceOwnerConfig {
        &self.config
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &ResourceOwnerStats {
        &self.stats
    }

    // =========================================================================
    // Owner tree
    // =========================================================================

    /// Creates an owner with empty arrays.
    ///
    /// With a parent, the new owner becomes the head of its child list.
    pub fn create(
        &mut self,
        parent: Option<OwnerId>,
        name: impl Into<String>,
    ) -> ResOwnerResult<OwnerId> {
        let name = name.into();
        let id = self.tree.create(parent, name)?;
        self.stats.record_create();
        debug!(owner = %id, name = %self.tree.name_of(id), parent = ?parent, "created resource owner");
        Ok(id)
    }

    /// Returns the parent of `owner`.
    pub fn get_parent(&self, owner: OwnerId) -> ResOwnerResult<Option<OwnerId>> {
        Ok(self.tree.get(owner)?.parent())
    }

    /// Moves `owner` under `new_parent`, or detaches it when `None`.
    pub fn new_parent(
        &mut self,
        owner: OwnerId,
        new_parent: Option<OwnerId>,
    ) -> ResOwnerResult<()> {
        self.tree.set_parent(owner, new_parent)?;
        self.stats.record_reparent();
        debug!(owner = %owner, new_parent = ?new_parent, "reparented resource owner");
        Ok(())
    }

    /// Deletes `owner` and every descendant.
    ///
    /// Fails without changing anything if any owner in the subtree still
    /// holds resources or the active owner lies inside the subtree.
    pub fn delete(&mut self, owner: OwnerId) -> ResOwnerResult<()> {
        let name = self.tree.get(owner)?.name().to_string();
        if let Some(current) = self.context.current() {
            if self.tree.is_in_subtree(owner, current) {
                return Err(ResourceOwnerError::DeleteCurrentOwner { owner: name });
            }
        }

        let before = self.tree.len();
        self.tree.delete(owner)?;
        let removed = before - self.tree.len();
        self.stats.record_delete(removed as u64);

        for pointer in [self.context.cur_transaction(), self.context.top_transaction()]
            .into_iter()
            .flatten()
        {
            if !self.tree.contains(pointer) {
                self.context.forget_owner(pointer);
            }
        }

        debug!(owner = %owner, name = %name, removed, "deleted resource owner");
        Ok(())
    }

    /// Returns the node for `owner`.
    pub fn node(&self, owner: OwnerId) -> ResOwnerResult<&OwnerNode> {
        self.tree.get(owner)
    }

    /// Returns the children of `owner`, most recent first.
    pub fn children(&self, owner: OwnerId) -> ResOwnerResult<Vec<OwnerId>> {
        Ok(self.tree.get(owner)?.children().collect())
    }

    /// Returns the debug label of `owner`.
    pub fn name(&self, owner: OwnerId) -> ResOwnerResult<&str> {
        Ok(self.tree.get(owner)?.name())
    }

    /// Returns true if `owner` is live.
    pub fn contains(&self, owner: OwnerId) -> bool {
        self.tree.contains(owner)
    }

    /// Returns the held resource counts of `owner`.
    pub fn resource_counts(&self, owner: OwnerId) -> ResOwnerResult<ResourceCounts> {
        Ok(self.tree.get(owner)?.resource_counts())
    }

    /// Number of live owners.
    pub fn owner_count(&self) -> usize {
        self.tree.len()
    }

    // =========================================================================
    // Resource arrays
    // =========================================================================

    fn enlarge<K: ResourceKind>(&mut self, owner: OwnerId) -> ResOwnerResult<()> {
        K::array_mut(self.tree.get_mut(owner)?).enlarge()
    }

    fn remember<K: ResourceKind>(&mut self, owner: OwnerId, handle: K::Handle) -> ResOwnerResult<()> {
        K::array_mut(self.tree.get_mut(owner)?).remember(handle);
        Ok(())
    }

    fn forget<K: ResourceKind>(&mut self, owner: OwnerId, handle: K::Handle) -> ResOwnerResult<()> {
        let node = self.tree.get_mut(owner)?;
        if K::array_mut(node).forget(handle) {
            return Ok(());
        }
        Err(ResourceOwnerError::NotOwned {
            kind: K::TYPE.name(),
            handle: handle.to_string(),
            owner: node.name().to_string(),
        })
    }

    /// Makes room for one more buffer pin. Untracked scopes need no room.
    pub fn enlarge_buffers(&mut self, owner: BufferOwner) -> ResOwnerResult<()> {
        match owner {
            BufferOwner::Tracked(id) => self.enlarge::<BufferPins>(id),
            BufferOwner::Untracked => Ok(()),
        }
    }

    /// Records a buffer pin. Untracked scopes record nothing.
    pub fn remember_buffer(&mut self, owner: BufferOwner, buffer: BufferId) -> ResOwnerResult<()> {
        match owner {
            BufferOwner::Tracked(id) => self.remember::<BufferPins>(id, buffer),
            BufferOwner::Untracked => Ok(()),
        }
    }

    /// Removes a buffer pin record.
    pub fn forget_buffer(&mut self, owner: BufferOwner, buffer: BufferId) -> ResOwnerResult<()> {
        match owner {
            BufferOwner::Tracked(id) => self.forget::<BufferPins>(id, buffer),
            BufferOwner::Untracked => Ok(()),
        }
    }

    /// Makes room for one more catalog cache entry reference.
    pub fn enlarge_catcache_refs(&mut self, owner: OwnerId) -> ResOwnerResult<()> {
        self.enlarge::<CatCacheRefs>(owner)
    }

    /// Records a catalog cache entry reference.
    pub fn remember_catcache_ref(&mut self, owner: OwnerId, entry: CatCacheRef) -> ResOwnerResult<()> {
        self.remember::<CatCacheRefs>(owner, entry)
    }

    /// Removes a catalog cache entry reference record.
    pub fn forget_catcache_ref(&mut self, owner: OwnerId, entry: CatCacheRef) -> ResOwnerResult<()> {
        self.forget::<CatCacheRefs>(owner, entry)
    }

    /// Makes room for one more catalog cache list reference.
    pub fn enlarge_catcache_list_refs(&mut self, owner: OwnerId) -> ResOwnerResult<()> {
        self.enlarge::<CatCacheListRefs>(owner)
    }

    /// Records a catalog cache list reference.
    pub fn remember_catcache_list_ref(
        &mut self,
        owner: OwnerId,
        list: CatCacheListRef,
    ) -> ResOwnerResult<()> {
        self.remember::<CatCacheListRefs>(owner, list)
    }

    /// Removes a catalog cache list reference record.
    pub fn forget_catcache_list_ref(
        &mut self,
        owner: OwnerId,
        list: CatCacheListRef,
    ) -> ResOwnerResult<()> {
        self.forget::<CatCacheListRefs>(owner, list)
    }

    /// Makes room for one more relation reference.
    pub fn enlarge_relation_refs(&mut self, owner: OwnerId) -> ResOwnerResult<()> {
        self.enlarge::<RelationRefs>(owner)
    }

    /// Records a relation reference.
    pub fn remember_relation_ref(&mut self, owner: OwnerId, relation: RelationId) -> ResOwnerResult<()> {
        self.remember::<RelationRefs>(owner, relation)
    }

    /// Removes a relation reference record.
    pub fn forget_relation_ref(&mut self, owner: OwnerId, relation: RelationId) -> ResOwnerResult<()> {
        self.forget::<RelationRefs>(owner, relation)
    }

    // =========================================================================
    // Execution context
    // =========================================================================

    /// Returns the session's execution context.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The active owner.
    pub fn current_owner(&self) -> Option<OwnerId> {
        self.context.current()
    }

    /// Sets the active owner, returning the previous one.
    pub fn set_current_owner(&mut self, owner: Option<OwnerId>) -> Option<OwnerId> {
        debug_assert!(owner.map_or(true, |id| self.tree.contains(id)));
        self.context.set_current(owner)
    }

    /// Owner of the innermost open transaction.
    pub fn cur_transaction_owner(&self) -> Option<OwnerId> {
        self.context.cur_transaction()
    }

    /// Sets the owner of the innermost open transaction.
    pub fn set_cur_transaction_owner(&mut self, owner: Option<OwnerId>) {
        debug_assert!(owner.map_or(true, |id| self.tree.contains(id)));
        self.context.set_cur_transaction(owner);
    }

    /// Owner of the top-level transaction.
    pub fn top_transaction_owner(&self) -> Option<OwnerId> {
        self.context.top_transaction()
    }

    /// Sets the owner of the top-level transaction.
    pub fn set_top_transaction_owner(&mut self, owner: Option<OwnerId>) {
        debug_assert!(owner.map_or(true, |id| self.tree.contains(id)));
        self.context.set_top_transaction(owner);
    }

    /// The active owner as a buffer pin target.
    pub fn current_buffer_owner(&self) -> BufferOwner {
        self.context.buffer_owner()
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    /// Registers a release callback at the front of the list.
    pub fn register_callback(&mut self, callback: CallbackRef, arg: CallbackArg) {
        self.callbacks.register(callback, arg);
    }

    /// Removes the first registration of `callback` with `arg`.
    pub fn unregister_callback(&mut self, callback: &CallbackRef, arg: CallbackArg) -> bool {
        self.callbacks.unregister(callback, arg)
    }

    /// Number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }
}

impl Default for ResourceOwnerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourceOwnerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOwnerManager")
            .field("owners", &self.tree.len())
            .field("context", &self.context)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
