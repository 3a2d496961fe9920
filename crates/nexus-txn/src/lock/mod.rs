//! Owner-aware lock table.
//!
//! Locks are granted to transactions, but every acquisition is also ledgered
//! against the resource owner that was active when it was taken. That lets a
//! scope boundary do the right thing with the locks its owner holds:
//!
//! - top-level commit or abort releases everything the transaction holds in
//!   one call ([`LockManager::release_all`]);
//! - subtransaction commit hands the owner's locks to its parent
//!   ([`LockManager::reassign_owner`]);
//! - subtransaction abort releases the owner's locks now
//!   ([`LockManager::release_owner`]).
//!
//! A transaction keeps a lock in the table as long as at least one of its
//! owners holds it, in the strongest mode any of those owners asked for. When
//! an owner lets go, the transaction's mode drops back to what the remaining
//! owners hold.
//!
//! # Lock Compatibility Matrix
//!
//! ```text
//!          │ S  │ X  │ IS │ IX │
//! ─────────┼────┼────┼────┼────┤
//!     S    │ ✓  │ ✗  │ ✓  │ ✗  │
//!     X    │ ✗  │ ✗  │ ✗  │ ✗  │
//!     IS   │ ✓  │ ✗  │ ✓  │ ✓  │
//!     IX   │ ✗  │ ✗  │ ✓  │ ✓  │
//! ```
//!
//! Conflicting requests are refused with [`LockResult::Conflict`]; waiting
//! and deadlock detection belong to the caller.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use bytes::Bytes;
use nexus_common::config::LockConfig;
use nexus_common::error::{NexusError, NexusResult};
use nexus_common::types::{RelationId, TxnId};
use nexus_resowner::{LockReleaser, OwnerId};
use parking_lot::RwLock;
use tracing::{debug, trace};

/// Lock mode for a lockable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock (read lock).
    Shared,
    /// Exclusive lock (write lock).
    Exclusive,
    /// Intention shared (relation-level hint for tuple S locks).
    IntentionShared,
    /// Intention exclusive (relation-level hint for tuple X locks).
    IntentionExclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        use LockMode::*;
        matches!(
            (self, other),
            (Shared, Shared) | (Shared, IntentionShared) |
            (IntentionShared, Shared) | (IntentionShared, IntentionShared) |
            (IntentionShared, IntentionExclusive) |
            (IntentionExclusive, IntentionShared) | (IntentionExclusive, IntentionExclusive)
        )
    }

    /// Returns the stronger of two lock modes.
    pub fn stronger(self, other: LockMode) -> LockMode {
        use LockMode::*;
        match (self, other) {
            (Exclusive, _) | (_, Exclusive) => Exclusive,
            (IntentionExclusive, Shared) | (Shared, IntentionExclusive) => Exclusive,
            (Shared, _) | (_, Shared) => Shared,
            (IntentionExclusive, _) | (_, IntentionExclusive) => IntentionExclusive,
            (IntentionShared, IntentionShared) => IntentionShared,
        }
    }

    /// Returns true if holding `self` already covers a request for `other`.
    pub fn covers(self, other: LockMode) -> bool {
        self.stronger(other) == self
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "S"),
            LockMode::Exclusive => write!(f, "X"),
            LockMode::IntentionShared => write!(f, "IS"),
            LockMode::IntentionExclusive => write!(f, "IX"),
        }
    }
}

/// Identifies a lockable object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockTag {
    /// A whole relation.
    Relation(RelationId),
    /// One page of a relation.
    Page(RelationId, u32),
    /// One tuple of a relation, by key.
    Tuple(RelationId, Bytes),
}

impl LockTag {
    /// Creates a relation tag.
    pub fn relation(relation: RelationId) -> Self {
        LockTag::Relation(relation)
    }

    /// Creates a page tag.
    pub fn page(relation: RelationId, page: u32) -> Self {
        LockTag::Page(relation, page)
    }

    /// Creates a tuple tag.
    pub fn tuple(relation: RelationId, key: impl Into<Bytes>) -> Self {
        LockTag::Tuple(relation, key.into())
    }

    /// Returns the relation this tag belongs to.
    pub fn relation_id(&self) -> RelationId {
        match self {
            LockTag::Relation(id) | LockTag::Page(id, _) | LockTag::Tuple(id, _) => *id,
        }
    }
}

impl fmt::Display for LockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTag::Relation(id) => write!(f, "Relation({})", id),
            LockTag::Page(id, page) => write!(f, "Page({}, {})", id, page),
            LockTag::Tuple(id, key) => write!(f, "Tuple({}, {:?})", id, key),
        }
    }
}

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResult {
    /// Lock was granted.
    Granted,
    /// Lock was upgraded from a weaker mode.
    Upgraded,
    /// The transaction already held the lock in a covering mode.
    AlreadyHeld,
    /// Another transaction holds a conflicting mode.
    Conflict,
}

impl LockResult {
    /// Returns true if the lock is now held.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            LockResult::Granted | LockResult::Upgraded | LockResult::AlreadyHeld
        )
    }
}

/// Information about a held lock.
#[derive(Debug)]
pub struct LockInfo {
    /// The locked object.
    pub tag: LockTag,
    /// Current group mode, the strongest mode of any holder.
    pub mode: LockMode,
    /// Transactions holding the lock, with the mode each holds.
    pub holders: HashMap<TxnId, LockMode>,
}

impl LockInfo {
    /// Creates new lock info.
    pub fn new(tag: LockTag) -> Self {
        Self {
            tag,
            mode: LockMode::Shared, // Will be set on first grant
            holders: HashMap::new(),
        }
    }

    /// Returns the mode `txn_id` holds, if any.
    pub fn holder_mode(&self, txn_id: TxnId) -> Option<LockMode> {
        self.holders.get(&txn_id).copied()
    }

    /// Checks if a lock mode can be granted.
    ///
    /// The request is combined with what `txn_id` already holds and checked
    /// against every other holder.
    pub fn can_grant(&self, txn_id: TxnId, mode: LockMode) -> bool {
        let wanted = self
            .holder_mode(txn_id)
            .map_or(mode, |held| held.stronger(mode));
        self.holders
            .iter()
            .filter(|(holder, _)| **holder != txn_id)
            .all(|(_, held)| wanted.is_compatible_with(held))
    }

    /// Grants a lock to a transaction.
    pub fn grant(&mut self, txn_id: TxnId, mode: LockMode) {
        let held = self
            .holder_mode(txn_id)
            .map_or(mode, |held| held.stronger(mode));
        self.set_holder_mode(txn_id, held);
    }

    /// Sets the mode `txn_id` holds, weaker or stronger than before.
    pub fn set_holder_mode(&mut self, txn_id: TxnId, mode: LockMode) {
        self.holders.insert(txn_id, mode);
        self.recompute_mode();
    }

    /// Releases a lock held by a transaction.
    pub fn release(&mut self, txn_id: TxnId) -> bool {
        let removed = self.holders.remove(&txn_id).is_some();
        self.recompute_mode();
        removed
    }

    fn recompute_mode(&mut self) {
        if let Some(mode) = self.holders.values().copied().reduce(LockMode::stronger) {
            self.mode = mode;
        }
    }

    /// Returns true if the lock is free.
    pub fn is_free(&self) -> bool {
        self.holders.is_empty()
    }
}

/// Statistics about the lock manager.
#[derive(Debug, Default)]
pub struct LockStats {
    /// Total lock acquisitions.
    pub acquisitions: AtomicU64,
    /// Total lock releases from the table.
    pub releases: AtomicU64,
    /// Total refused requests.
    pub conflicts: AtomicU64,
    /// Total lock upgrades.
    pub upgrades: AtomicU64,
    /// Total owner-to-parent reassignments.
    pub reassignments: AtomicU64,
}

impl LockStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful acquisition.
    pub fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a release.
    pub fn record_release(&self) {
        self.releases.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a conflict.
    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records an upgrade.
    pub fn record_upgrade(&self) {
        self.upgrades.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a reassignment.
    pub fn record_reassignment(&self) {
        self.reassignments.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

/// What one owner holds on one tag.
#[derive(Debug, Clone, Copy)]
struct OwnerHold {
    /// Acquisitions not yet unlocked.
    count: u32,
    /// Strongest mode requested through this owner.
    mode: LockMode,
}

impl OwnerHold {
    fn merge(&mut self, other: OwnerHold) {
        self.count += other.count;
        self.mode = self.mode.stronger(other.mode);
    }
}

/// Per-transaction ledger: acquisitions per owner per tag.
#[derive(Debug, Default)]
struct TxnLedger {
    by_owner: HashMap<OwnerId, HashMap<LockTag, OwnerHold>>,
}

impl TxnLedger {
    fn record(&mut self, owner: OwnerId, tag: LockTag, mode: LockMode) {
        self.by_owner
            .entry(owner)
            .or_default()
            .entry(tag)
            .or_insert(OwnerHold { count: 0, mode })
            .merge(OwnerHold { count: 1, mode });
    }

    /// Mode the transaction holds `tag` in across all of its owners.
    fn mode_of(&self, tag: &LockTag) -> Option<LockMode> {
        self.by_owner
            .values()
            .filter_map(|tags| tags.get(tag))
            .map(|hold| hold.mode)
            .reduce(LockMode::stronger)
    }

    fn distinct_tags(&self) -> HashSet<&LockTag> {
        self.by_owner.values().flat_map(HashMap::keys).collect()
    }
}

/// The lock manager for transaction locks.
pub struct LockManager {
    /// All locks, keyed by tag.
    locks: RwLock<HashMap<LockTag, LockInfo>>,
    /// Owner ledgers of each transaction.
    ledgers: RwLock<HashMap<TxnId, TxnLedger>>,
    /// Configuration.
    config: LockConfig,
    /// Statistics.
    stats: LockStats,
}

impl LockManager {
    /// Creates a new lock manager with default configuration.
    pub fn new() -> Self {
        Self::with_config(LockConfig::default())
    }

    /// Creates a lock manager with custom configuration.
    pub fn with_config(config: LockConfig) -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
            ledgers: RwLock::new(HashMap::new()),
            config,
            stats: LockStats::new(),
        }
    }

    /// Tries to acquire a lock for `txn_id` on behalf of `owner`.
    ///
    /// Fails with [`NexusError::LockFailed`] when granting a new lock would
    /// exceed the per-transaction limit.
    pub fn try_lock(
        &self,
        txn_id: TxnId,
        owner: OwnerId,
        tag: LockTag,
        mode: LockMode,
    ) -> NexusResult<LockResult> {
        let mut locks = self.locks.write();
        let mut ledgers = self.ledgers.write();

        let held = locks.get(&tag).and_then(|info| info.holder_mode(txn_id));
        if held.map_or(false, |held| held.covers(mode)) {
            ledgers.entry(txn_id).or_default().record(owner, tag, mode);
            return Ok(LockResult::AlreadyHeld);
        }

        let held_by_txn = held.is_some();
        if !held_by_txn && self.config.is_limited() {
            let held = ledgers
                .get(&txn_id)
                .map_or(0, |ledger| ledger.distinct_tags().len());
            if held >= self.config.max_locks_per_txn {
                return Err(NexusError::LockFailed {
                    txn_id,
                    reason: format!(
                        "limit of {} locks per transaction reached",
                        self.config.max_locks_per_txn
                    ),
                });
            }
        }

        let lock_info = locks
            .entry(tag.clone())
            .or_insert_with(|| LockInfo::new(tag.clone()));

        if !lock_info.can_grant(txn_id, mode) {
            if lock_info.is_free() {
                locks.remove(&tag);
            }
            self.stats.record_conflict();
            trace!(txn = %txn_id, %tag, %mode, "lock conflict");
            return Ok(LockResult::Conflict);
        }

        lock_info.grant(txn_id, mode);
        ledgers.entry(txn_id).or_default().record(owner, tag, mode);

        if held_by_txn {
            self.stats.record_upgrade();
            Ok(LockResult::Upgraded)
        } else {
            self.stats.record_acquisition();
            Ok(LockResult::Granted)
        }
    }

    /// Releases one acquisition of `tag` made through `owner`.
    ///
    /// The lock leaves the table once no owner of the transaction holds it.
    /// Until then the transaction keeps the strongest mode its remaining
    /// owners hold.
    pub fn unlock(&self, txn_id: TxnId, owner: OwnerId, tag: &LockTag) -> NexusResult<()> {
        let mut locks = self.locks.write();
        let mut ledgers = self.ledgers.write();

        let not_held = || NexusError::LockNotHeld {
            txn_id,
            lock: tag.to_string(),
        };
        let ledger = ledgers.get_mut(&txn_id).ok_or_else(not_held)?;
        let tags = ledger.by_owner.get_mut(&owner).ok_or_else(not_held)?;
        let hold = tags.get_mut(tag).ok_or_else(not_held)?;

        hold.count -= 1;
        if hold.count == 0 {
            tags.remove(tag);
            if tags.is_empty() {
                ledger.by_owner.remove(&owner);
            }
            self.sync_holder(&mut locks, txn_id, tag, ledger.mode_of(tag));
        }
        if ledger.by_owner.is_empty() {
            ledgers.remove(&txn_id);
        }
        Ok(())
    }

    /// Releases every lock `owner` holds for `txn_id`.
    ///
    /// Locks other owners of the transaction still hold stay, in the mode
    /// those owners hold them. Returns the number of locks that left the
    /// table.
    pub fn release_owner(&self, txn_id: TxnId, owner: OwnerId) -> usize {
        let mut locks = self.locks.write();
        let mut ledgers = self.ledgers.write();

        let Some(ledger) = ledgers.get_mut(&txn_id) else {
            return 0;
        };
        let Some(tags) = ledger.by_owner.remove(&owner) else {
            return 0;
        };

        let mut released = 0;
        for tag in tags.keys() {
            if self.sync_holder(&mut locks, txn_id, tag, ledger.mode_of(tag)) {
                released += 1;
            }
        }
        if ledger.by_owner.is_empty() {
            ledgers.remove(&txn_id);
        }

        debug!(txn = %txn_id, owner = %owner, released, "released owner locks");
        released
    }

    /// Moves every lock `owner` holds for `txn_id` to `parent`.
    ///
    /// The transaction's modes are unchanged: the parent takes over the
    /// count and mode of every moved lock. Returns the number of distinct
    /// locks moved.
    pub fn reassign_owner(&self, txn_id: TxnId, owner: OwnerId, parent: OwnerId) -> usize {
        let mut ledgers = self.ledgers.write();

        let Some(ledger) = ledgers.get_mut(&txn_id) else {
            return 0;
        };
        let Some(tags) = ledger.by_owner.remove(&owner) else {
            return 0;
        };

        let moved = tags.len();
        let target = ledger.by_owner.entry(parent).or_default();
        for (tag, hold) in tags {
            target
                .entry(tag)
                .and_modify(|existing| existing.merge(hold))
                .or_insert(hold);
        }

        self.stats.record_reassignment();
        debug!(txn = %txn_id, owner = %owner, parent = %parent, moved, "reassigned owner locks");
        moved
    }

    /// Releases all locks held by a transaction.
    ///
    /// Returns the number of locks released.
    pub fn release_all(&self, txn_id: TxnId) -> usize {
        let mut locks = self.locks.write();
        let Some(ledger) = self.ledgers.write().remove(&txn_id) else {
            return 0;
        };

        let tags: Vec<LockTag> = ledger.distinct_tags().into_iter().cloned().collect();
        for tag in &tags {
            self.release_from_table(&mut locks, txn_id, tag);
        }

        debug!(txn = %txn_id, released = tags.len(), "released all transaction locks");
        tags.len()
    }

    /// Brings the table entry of `txn_id` on `tag` in line with the mode
    /// its ledger still holds. Returns true if the lock left the table for
    /// this transaction.
    fn sync_holder(
        &self,
        locks: &mut HashMap<LockTag, LockInfo>,
        txn_id: TxnId,
        tag: &LockTag,
        held: Option<LockMode>,
    ) -> bool {
        match held {
            Some(mode) => {
                if let Some(lock_info) = locks.get_mut(tag) {
                    lock_info.set_holder_mode(txn_id, mode);
                }
                false
            }
            None => {
                self.release_from_table(locks, txn_id, tag);
                true
            }
        }
    }

    fn release_from_table(
        &self,
        locks: &mut HashMap<LockTag, LockInfo>,
        txn_id: TxnId,
        tag: &LockTag,
    ) {
        if let Some(lock_info) = locks.get_mut(tag) {
            if lock_info.release(txn_id) {
                self.stats.record_release();
            }
            if lock_info.is_free() {
                locks.remove(tag);
            }
        }
    }

    /// Returns statistics about the lock manager.
    pub fn stats(&self) -> &LockStats {
        &self.stats
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Returns the number of locked objects.
    pub fn lock_count(&self) -> usize {
        self.locks.read().len()
    }

    /// Returns the number of transactions holding locks.
    pub fn txn_count(&self) -> usize {
        self.ledgers.read().len()
    }

    /// Returns the current group mode of `tag`, if locked.
    pub fn lock_mode(&self, tag: &LockTag) -> Option<LockMode> {
        self.locks.read().get(tag).map(|info| info.mode)
    }

    /// Returns the mode `txn_id` holds `tag` in, if any.
    pub fn held_mode(&self, txn_id: TxnId, tag: &LockTag) -> Option<LockMode> {
        self.locks
            .read()
            .get(tag)
            .and_then(|info| info.holder_mode(txn_id))
    }

    /// Returns the locks held by a transaction.
    pub fn txn_locks(&self, txn_id: TxnId) -> Vec<LockTag> {
        self.ledgers
            .read()
            .get(&txn_id)
            .map(|ledger| ledger.distinct_tags().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the locks `owner` holds for a transaction.
    pub fn owner_locks(&self, txn_id: TxnId, owner: OwnerId) -> Vec<LockTag> {
        self.ledgers
            .read()
            .get(&txn_id)
            .and_then(|ledger| ledger.by_owner.get(&owner))
            .map(|tags| tags.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("lock_count", &self.lock_count())
            .field("txn_count", &self.txn_count())
            .finish()
    }
}

/// One transaction's view of the lock manager, used by the LOCKS phase.
#[derive(Debug, Clone, Copy)]
pub struct TransactionLocks<'a> {
    manager: &'a LockManager,
    txn_id: TxnId,
}

impl<'a> TransactionLocks<'a> {
    /// Binds `manager` to `txn_id`.
    pub fn new(manager: &'a LockManager, txn_id: TxnId) -> Self {
        Self { manager, txn_id }
    }

    /// The bound transaction.
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }
}

impl LockReleaser for TransactionLocks<'_> {
    fn release_all_locks(&mut self, is_commit: bool) -> NexusResult<()> {
        let released = self.manager.release_all(self.txn_id);
        trace!(txn = %self.txn_id, is_commit, released, "LOCKS phase released transaction");
        Ok(())
    }

    fn reassign_locks(&mut self, owner: OwnerId, parent: OwnerId) -> NexusResult<()> {
        self.manager.reassign_owner(self.txn_id, owner, parent);
        Ok(())
    }

    fn release_owner_locks(&mut self, owner: OwnerId) -> NexusResult<()> {
        self.manager.release_owner(self.txn_id, owner);
        Ok(())
    }
}
