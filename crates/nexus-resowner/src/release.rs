//! Phased release of an owner subtree.
//!
//! A scope boundary runs three phases over the subtree, in order:
//!
//! | Phase | Work per owner |
//! |---|---|
//! | `BeforeLocks` | drain buffer pins, then relation references |
//! | `Locks` | release or hand over locks |
//! | `AfterLocks` | drain catalog cache references and lists, end index scans |
//!
//! Each owner is processed after all of its descendants. While an owner is
//! processed it is the active owner, so the Forget calls made by collaborators
//! land in its arrays. Registered callbacks run after the built-in work of
//! every owner in every phase.
//!
//! The active owner saved at entry is restored by a drop guard, so it is put
//! back on success, on error and on unwinding.

use std::fmt;
use std::ops::{Deref, DerefMut};

use tracing::{debug, trace};

use crate::error::{ResOwnerResult, ResourceOwnerError};
use crate::kind::{BufferPins, CatCacheListRefs, CatCacheRefs, RelationRefs, ResourceKind};
use crate::manager::ResourceOwnerManager;
use crate::managers::Collaborators;
use crate::owner::OwnerId;

/// One step of releasing a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleasePhase {
    /// Buffer pins and relation references.
    BeforeLocks,
    /// Transaction locks.
    Locks,
    /// Catalog cache references and index scan state.
    AfterLocks,
}

impl ReleasePhase {
    /// All phases, in the order they must run.
    pub const ALL: [ReleasePhase; 3] = [
        ReleasePhase::BeforeLocks,
        ReleasePhase::Locks,
        ReleasePhase::AfterLocks,
    ];

    /// Returns the phase name.
    pub const fn name(self) -> &'static str {
        match self {
            ReleasePhase::BeforeLocks => "BEFORE_LOCKS",
            ReleasePhase::Locks => "LOCKS",
            ReleasePhase::AfterLocks => "AFTER_LOCKS",
        }
    }
}

impl fmt::Display for ReleasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Restores the active owner when dropped.
struct CurrentOwnerGuard<'a> {
    manager: &'a mut ResourceOwnerManager,
    saved: Option<OwnerId>,
}

impl<'a> CurrentOwnerGuard<'a> {
    fn new(manager: &'a mut ResourceOwnerManager) -> Self {
        let saved = manager.context.current();
        Self { manager, saved }
    }
}

impl Deref for CurrentOwnerGuard<'_> {
    type Target = ResourceOwnerManager;

    fn deref(&self) -> &ResourceOwnerManager {
        self.manager
    }
}

impl DerefMut for CurrentOwnerGuard<'_> {
    fn deref_mut(&mut self) -> &mut ResourceOwnerManager {
        self.manager
    }
}

impl Drop for CurrentOwnerGuard<'_> {
    fn drop(&mut self) {
        self.manager.context.set_current(self.saved);
    }
}

impl ResourceOwnerManager {
    /// Runs one release phase over `owner` and its descendants.
    ///
    /// `is_top_level` selects a single bulk lock release, issued only when
    /// `owner` is the top-level transaction owner. Otherwise each owner's
    /// locks go to its parent on commit and are dropped on abort.
    ///
    /// An error stops the walk. The active owner is restored before it is
    /// returned.
    pub fn release(
        &mut self,
        owner: OwnerId,
        phase: ReleasePhase,
        is_commit: bool,
        is_top_level: bool,
        collaborators: &mut Collaborators<'_>,
    ) -> ResOwnerResult<()> {
        self.tree.get(owner)?;
        self.stats.record_release_call();

        let mut guard = CurrentOwnerGuard::new(self);
        let result = guard.release_subtree(owner, phase, is_commit, is_top_level, collaborators);
        drop(guard);

        if let Err(err) = &result {
            debug!(owner = %owner, %phase, error = %err, "resource owner release failed");
        }
        result
    }

    /// Runs all three phases over `owner` in order.
    pub fn release_all_phases(
        &mut self,
        owner: OwnerId,
        is_commit: bool,
        is_top_level: bool,
        collaborators: &mut Collaborators<'_>,
    ) -> ResOwnerResult<()> {
        for phase in ReleasePhase::ALL {
            self.release(owner, phase, is_commit, is_top_level, collaborators)?;
        }
        Ok(())
    }

    fn release_subtree(
        &mut self,
        owner: OwnerId,
        phase: ReleasePhase,
        is_commit: bool,
        is_top_level: bool,
        collaborators: &mut Collaborators<'_>,
    ) -> ResOwnerResult<()> {
        // Collaborators may reshape the tree while we recurse.
        let children: Vec<OwnerId> = self.tree.get(owner)?.children().collect();
        for child in children {
            if self.tree.contains(child) {
                self.release_subtree(child, phase, is_commit, is_top_level, collaborators)?;
            }
        }

        let mut guard = CurrentOwnerGuard::new(self);
        guard.context.set_current(Some(owner));
        guard.release_owner(owner, phase, is_commit, is_top_level, collaborators)
    }

    fn release_owner(
        &mut self,
        owner: OwnerId,
        phase: ReleasePhase,
        is_commit: bool,
        is_top_level: bool,
        collaborators: &mut Collaborators<'_>,
    ) -> ResOwnerResult<()> {
        self.stats.record_visit();
        trace!(owner = %owner, %phase, is_commit, is_top_level, "releasing resource owner");

        match phase {
            ReleasePhase::BeforeLocks => {
                self.drain::<BufferPins>(owner, is_commit, collaborators)?;
                self.drain::<RelationRefs>(owner, is_commit, collaborators)?;
            }
            ReleasePhase::Locks => {
                if is_top_level {
                    // Lock state is per transaction, so only the top owner
                    // releases it.
                    if self.context.top_transaction() == Some(owner) {
                        collaborators.locks.release_all_locks(is_commit)?;
                    }
                } else if is_commit {
                    let node = self.tree.get(owner)?;
                    let parent = node.parent().ok_or_else(|| ResourceOwnerError::MissingParent {
                        owner: node.name().to_string(),
                    })?;
                    collaborators.locks.reassign_locks(owner, parent)?;
                } else {
                    collaborators.locks.release_owner_locks(owner)?;
                }
            }
            ReleasePhase::AfterLocks => {
                self.drain::<CatCacheRefs>(owner, is_commit, collaborators)?;
                self.drain::<CatCacheListRefs>(owner, is_commit, collaborators)?;
                collaborators.index_scans.release_gist_scans()?;
                collaborators.index_scans.release_hash_scans()?;
            }
        }

        let invoked = self.callbacks.invoke_all(phase, is_commit, is_top_level)?;
        self.stats.record_callbacks(invoked);
        Ok(())
    }

    /// Releases every `K` handle held by `owner`, newest first.
    fn drain<K: ResourceKind>(
        &mut self,
        owner: OwnerId,
        is_commit: bool,
        collaborators: &mut Collaborators<'_>,
    ) -> ResOwnerResult<()> {
        let warn = is_commit && self.config.warn_on_leaks;

        loop {
            let array = K::array(self.tree.get(owner)?);
            let Some(handle) = array.last() else {
                return Ok(());
            };
            let held = array.len();

            if warn {
                K::warn_leak(collaborators, &self.tree.name_of(owner), handle);
                self.stats.record_leak(K::TYPE);
            }

            K::release(collaborators, self, handle)?;

            // A collaborator that skips Forget would keep us here forever.
            if K::array(self.tree.get(owner)?).len() >= held {
                return Err(ResourceOwnerError::ReleaseNotForgotten {
                    kind: K::TYPE.name(),
                    handle: handle.to_string(),
                    owner: self.tree.name_of(owner),
                });
            }
            self.stats.record_resource_released();
        }
    }
}
