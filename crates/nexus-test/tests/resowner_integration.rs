//! End-to-end resource owner tests.
//!
//! These tests drive the owner tree the way a transaction manager does:
//! owners for the top-level transaction, subtransactions and portals, the
//! three release phases at every boundary, and the lock table as the LOCKS
//! phase collaborator.

use anyhow::Result;
use nexus_common::config::DatabaseConfig;
use nexus_common::types::{BufferId, CatCacheListRef, CatCacheRef, RelationId, TxnId};
use nexus_resowner::{CallbackArg, OwnerId, ReleasePhase, ResourceOwnerError, ResourceOwnerManager};
use nexus_test::utils::{init_test_logging, CapturedLogs, MockSubsystems, PhaseCounter};
use nexus_test::workload::{self, WorkloadConfig};
use nexus_txn::{LockManager, LockMode, LockTag, TransactionLocks};

/// Starts a top-level transaction: creates its owner and points the context
/// at it.
fn begin(owners: &mut ResourceOwnerManager) -> Result<OwnerId> {
    let top = owners.create(None, "TopTransaction")?;
    owners.set_top_transaction_owner(Some(top));
    owners.set_cur_transaction_owner(Some(top));
    owners.set_current_owner(Some(top));
    Ok(top)
}

/// Starts a subtransaction under the current transaction.
fn begin_sub(owners: &mut ResourceOwnerManager) -> Result<OwnerId> {
    let parent = owners.cur_transaction_owner();
    let sub = owners.create(parent, "SubTransaction")?;
    owners.set_cur_transaction_owner(Some(sub));
    owners.set_current_owner(Some(sub));
    Ok(sub)
}

/// Ends a subtransaction: runs the three phases on it, hands the context
/// back to the parent and deletes it.
fn end_sub(
    owners: &mut ResourceOwnerManager,
    subsystems: &mut MockSubsystems<'_>,
    sub: OwnerId,
    is_commit: bool,
) -> Result<()> {
    owners.release_all_phases(sub, is_commit, false, &mut subsystems.collaborators())?;
    let parent = owners.get_parent(sub)?;
    owners.set_cur_transaction_owner(parent);
    owners.set_current_owner(parent);
    owners.delete(sub)?;
    Ok(())
}

/// Ends the top-level transaction.
fn end(
    owners: &mut ResourceOwnerManager,
    subsystems: &mut MockSubsystems<'_>,
    top: OwnerId,
    is_commit: bool,
) -> Result<()> {
    owners.release_all_phases(top, is_commit, true, &mut subsystems.collaborators())?;
    owners.set_current_owner(None);
    owners.delete(top)?;
    Ok(())
}

#[test]
fn test_clean_commit_has_no_leaks() -> Result<()> {
    init_test_logging();
    let locks = LockManager::new();
    let txn = TxnId::new(1);
    let mut owners = ResourceOwnerManager::new();
    let mut subsystems = MockSubsystems::new(TransactionLocks::new(&locks, txn));

    let top = begin(&mut owners)?;
    let rel = RelationId::new(16384);
    subsystems.relations.open(&mut owners, rel)?;
    subsystems.buffers.pin(&mut owners, BufferId::new(1))?;
    locks.try_lock(txn, top, LockTag::relation(rel), LockMode::IntentionExclusive)?;

    // Query code cleans up after itself.
    subsystems.buffers.unpin(&mut owners, BufferId::new(1))?;
    subsystems.relations.close(&mut owners, rel)?;

    end(&mut owners, &mut subsystems, top, true)?;

    assert_eq!(owners.stats().snapshot().total_leaks(), 0);
    assert_eq!(locks.lock_count(), 0);
    assert_eq!(owners.owner_count(), 0);
    assert_eq!(owners.top_transaction_owner(), None);
    Ok(())
}

#[test]
fn test_commit_with_leaks_releases_everything() -> Result<()> {
    init_test_logging();
    let locks = LockManager::new();
    let txn = TxnId::new(2);
    let mut owners = ResourceOwnerManager::new();
    let mut subsystems = MockSubsystems::new(TransactionLocks::new(&locks, txn));
    subsystems
        .relations
        .define(RelationId::new(16385), "accounts");

    let top = begin(&mut owners)?;
    for b in 1..=3 {
        subsystems.buffers.pin(&mut owners, BufferId::new(b))?;
    }
    subsystems.relations.open(&mut owners, RelationId::new(16385))?;
    subsystems.relations.open(&mut owners, RelationId::new(16386))?;
    subsystems.catalog.search(&mut owners, CatCacheRef::new(0xbeef))?;
    subsystems
        .catalog
        .search_list(&mut owners, CatCacheListRef::new(0xcafe))?;

    let logs = CapturedLogs::new();
    logs.capture(|| end(&mut owners, &mut subsystems, top, true))?;

    // Five before the locks go, two after.
    let warnings = logs.warnings();
    assert_eq!(warnings.len(), 7, "{warnings:#?}");
    assert_eq!(
        warnings
            .iter()
            .filter(|w| w.contains("buffer refcount leak"))
            .count(),
        3
    );
    assert!(warnings
        .iter()
        .any(|w| w.contains(r#"relation "accounts" not closed"#)));
    assert!(warnings
        .iter()
        .any(|w| w.contains(r#"relation "16386" not closed"#)));

    let snap = owners.stats().snapshot();
    assert_eq!(snap.buffer_leaks, 3);
    assert_eq!(snap.relation_leaks, 2);
    assert_eq!(snap.catcache_leaks, 1);
    assert_eq!(snap.catcache_list_leaks, 1);
    assert_eq!(subsystems.buffers.total_pins(), 0);
    assert_eq!(subsystems.catalog.outstanding(), 0);
    assert_eq!(
        subsystems.buffers.released(),
        &[BufferId::new(3), BufferId::new(2), BufferId::new(1)]
    );
    assert_eq!(subsystems.scans.gist_sweeps, 1);
    assert_eq!(subsystems.scans.hash_sweeps, 1);
    Ok(())
}

#[test]
fn test_abort_releases_without_warnings() -> Result<()> {
    init_test_logging();
    let locks = LockManager::new();
    let txn = TxnId::new(12);
    let mut owners = ResourceOwnerManager::new();
    let mut subsystems = MockSubsystems::new(TransactionLocks::new(&locks, txn));
    subsystems
        .relations
        .define(RelationId::new(16385), "accounts");

    let top = begin(&mut owners)?;
    let sub = begin_sub(&mut owners)?;
    subsystems.buffers.pin(&mut owners, BufferId::new(7))?;
    subsystems.relations.open(&mut owners, RelationId::new(16385))?;
    subsystems.catalog.search(&mut owners, CatCacheRef::new(0xbeef))?;

    let logs = CapturedLogs::new();
    logs.capture(|| -> Result<()> {
        end_sub(&mut owners, &mut subsystems, sub, false)?;
        end(&mut owners, &mut subsystems, top, false)
    })?;

    assert!(logs.warnings().is_empty(), "{}", logs.contents());
    assert_eq!(owners.stats().snapshot().total_leaks(), 0);
    assert_eq!(subsystems.buffers.total_pins(), 0);
    assert_eq!(subsystems.relations.open_count(RelationId::new(16385)), 0);
    assert_eq!(subsystems.catalog.outstanding(), 0);
    Ok(())
}

#[test]
fn test_leak_warnings_can_be_disabled() -> Result<()> {
    init_test_logging();
    let mut config = DatabaseConfig::for_testing();
    config.resource_owner.warn_on_leaks = false;
    let locks = LockManager::new();
    let txn = TxnId::new(13);
    let mut owners = ResourceOwnerManager::with_config(config.resource_owner)?;
    let mut subsystems = MockSubsystems::new(TransactionLocks::new(&locks, txn));

    let top = begin(&mut owners)?;
    subsystems.buffers.pin(&mut owners, BufferId::new(3))?;

    let logs = CapturedLogs::new();
    logs.capture(|| end(&mut owners, &mut subsystems, top, true))?;

    assert!(logs.warnings().is_empty(), "{}", logs.contents());
    assert_eq!(subsystems.buffers.total_pins(), 0);
    Ok(())
}

#[test]
fn test_subtransaction_commit_keeps_locks_in_parent() -> Result<()> {
    init_test_logging();
    let locks = LockManager::new();
    let txn = TxnId::new(3);
    let mut owners = ResourceOwnerManager::new();
    let mut subsystems = MockSubsystems::new(TransactionLocks::new(&locks, txn));

    let top = begin(&mut owners)?;
    let sub = begin_sub(&mut owners)?;
    let tag = LockTag::tuple(RelationId::new(1), "k1");
    locks.try_lock(txn, sub, tag.clone(), LockMode::Exclusive)?;
    subsystems.buffers.pin(&mut owners, BufferId::new(10))?;

    end_sub(&mut owners, &mut subsystems, sub, true)?;

    // The pin was released at subcommit; the lock moved up.
    assert_eq!(subsystems.buffers.total_pins(), 0);
    assert_eq!(locks.owner_locks(txn, top), vec![tag.clone()]);
    assert_eq!(locks.lock_mode(&tag), Some(LockMode::Exclusive));
    assert_eq!(owners.current_owner(), Some(top));

    end(&mut owners, &mut subsystems, top, true)?;
    assert_eq!(locks.lock_count(), 0);
    Ok(())
}

#[test]
fn test_subtransaction_abort_drops_only_its_locks() -> Result<()> {
    init_test_logging();
    let locks = LockManager::new();
    let txn = TxnId::new(4);
    let mut owners = ResourceOwnerManager::new();
    let mut subsystems = MockSubsystems::new(TransactionLocks::new(&locks, txn));

    let top = begin(&mut owners)?;
    let outer = LockTag::relation(RelationId::new(100));
    locks.try_lock(txn, top, outer.clone(), LockMode::Shared)?;

    let sub = begin_sub(&mut owners)?;
    let inner = LockTag::relation(RelationId::new(200));
    locks.try_lock(txn, sub, inner.clone(), LockMode::Exclusive)?;
    subsystems.relations.open(&mut owners, RelationId::new(200))?;

    end_sub(&mut owners, &mut subsystems, sub, false)?;

    assert_eq!(locks.lock_mode(&inner), None);
    assert_eq!(locks.lock_mode(&outer), Some(LockMode::Shared));
    assert_eq!(subsystems.relations.open_count(RelationId::new(200)), 0);
    // Abort never warns.
    assert_eq!(owners.stats().snapshot().total_leaks(), 0);

    end(&mut owners, &mut subsystems, top, false)?;
    assert_eq!(locks.txn_count(), 0);
    Ok(())
}

#[test]
fn test_portal_survives_subtransaction_by_reparenting() -> Result<()> {
    init_test_logging();
    let locks = LockManager::new();
    let txn = TxnId::new(5);
    let mut owners = ResourceOwnerManager::new();
    let mut subsystems = MockSubsystems::new(TransactionLocks::new(&locks, txn));

    let top = begin(&mut owners)?;
    let sub = begin_sub(&mut owners)?;
    let portal = owners.create(Some(sub), "Portal")?;
    owners.set_current_owner(Some(portal));
    subsystems.buffers.pin(&mut owners, BufferId::new(77))?;
    owners.set_current_owner(Some(sub));

    // Keep the portal alive past the subtransaction.
    owners.new_parent(portal, Some(top))?;
    end_sub(&mut owners, &mut subsystems, sub, true)?;

    assert!(owners.contains(portal));
    assert_eq!(owners.get_parent(portal)?, Some(top));
    assert_eq!(subsystems.buffers.pin_count(BufferId::new(77)), 1);

    end(&mut owners, &mut subsystems, top, false)?;
    assert_eq!(subsystems.buffers.total_pins(), 0);
    assert!(!owners.contains(portal));
    Ok(())
}

#[test]
fn test_random_workload_is_fully_released() -> Result<()> {
    init_test_logging();
    let config = DatabaseConfig::for_testing();
    let locks = LockManager::with_config(config.lock.clone());
    let txn = TxnId::new(6);
    let mut owners = ResourceOwnerManager::with_config(config.resource_owner.clone())?;
    let mut subsystems = MockSubsystems::new(TransactionLocks::new(&locks, txn));

    let top = begin(&mut owners)?;
    let portal = owners.create(Some(top), "Portal")?;
    owners.set_current_owner(Some(portal));

    let ops = workload::generate(&WorkloadConfig {
        seed: 7,
        ops: 2_000,
        ..WorkloadConfig::default()
    });
    workload::apply(&ops, &mut owners, &mut subsystems)?;
    let held = owners.resource_counts(portal)?;
    assert!(held.total() > 0);

    owners.set_current_owner(Some(top));
    end(&mut owners, &mut subsystems, top, false)?;

    assert_eq!(subsystems.buffers.total_pins(), 0);
    assert_eq!(subsystems.catalog.outstanding(), 0);
    assert_eq!(
        owners.stats().snapshot().resources_released,
        held.total() as u64
    );
    Ok(())
}

#[test]
fn test_callbacks_see_every_owner_and_phase() -> Result<()> {
    init_test_logging();
    let locks = LockManager::new();
    let txn = TxnId::new(7);
    let mut owners = ResourceOwnerManager::new();
    let mut subsystems = MockSubsystems::new(TransactionLocks::new(&locks, txn));
    let counter = PhaseCounter::shared();
    owners.register_callback(counter.as_callback(), CallbackArg(0));

    let top = begin(&mut owners)?;
    let sub = begin_sub(&mut owners)?;
    owners.create(Some(sub), "Portal")?;
    owners.set_current_owner(Some(top));

    end(&mut owners, &mut subsystems, top, true)?;

    for phase in ReleasePhase::ALL {
        assert_eq!(counter.count(phase), 3);
    }
    assert!(owners.unregister_callback(&counter.as_callback(), CallbackArg(0)));
    assert_eq!(owners.callback_count(), 0);
    Ok(())
}

#[test]
fn test_failed_release_restores_context_and_can_resume() -> Result<()> {
    init_test_logging();
    let locks = LockManager::new();
    let txn = TxnId::new(8);
    let mut owners = ResourceOwnerManager::new();
    let mut subsystems = MockSubsystems::new(TransactionLocks::new(&locks, txn));

    let top = begin(&mut owners)?;
    subsystems.buffers.pin(&mut owners, BufferId::new(5))?;
    // Forget the pin behind the pool's back: the owner still lists it, the
    // pool no longer does.
    subsystems.buffers.lose_pin(BufferId::new(5));

    let err = owners
        .release(top, ReleasePhase::BeforeLocks, false, true, &mut subsystems.collaborators())
        .unwrap_err();
    assert!(matches!(err, ResourceOwnerError::Nexus(_)));
    assert_eq!(owners.current_owner(), Some(top));

    // Deleting with the pin still listed is refused.
    owners.set_current_owner(None);
    assert!(matches!(
        owners.delete(top),
        Err(ResourceOwnerError::OwnerNotEmpty { .. })
    ));
    Ok(())
}

#[test]
fn test_delete_refused_for_active_subtree() -> Result<()> {
    let mut owners = ResourceOwnerManager::new();
    let top = begin(&mut owners)?;
    let sub = begin_sub(&mut owners)?;

    assert!(matches!(
        owners.delete(top),
        Err(ResourceOwnerError::DeleteCurrentOwner { .. })
    ));
    assert!(owners.contains(sub));
    Ok(())
}
