//! Test utilities: logging setup and in-memory collaborators.
//!
//! The mock subsystems keep their own reference counts and follow the
//! expected protocol: acquire calls Enlarge, takes the resource, then
//! Remembers it on the active owner; release drops the resource and calls
//! Forget before returning.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nexus_common::error::{NexusError, NexusResult};
use nexus_common::types::{BufferId, CatCacheListRef, CatCacheRef, RelationId};
use nexus_resowner::{
    BufferManager, CallbackArg, CallbackRef, CatalogCache, Collaborators, IndexScanCleanup,
    OwnerId, RelationCache, ReleaseCallback, ReleasePhase, ResOwnerResult, ResourceOwnerError,
    ResourceOwnerManager,
};
use nexus_txn::TransactionLocks;
use parking_lot::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once; later calls are ignored.
///
/// Honors `RUST_LOG`, defaulting to warnings so leak reports are visible.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(true)
        .try_init();
}

/// Collects formatted log output in memory.
///
/// Run code under [`CapturedLogs::capture`] to see exactly which events it
/// emitted, independent of any global subscriber.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with a thread-local subscriber that writes WARN and above
    /// into this capture.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(Level::WARN)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    /// Everything captured so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// Captured WARN events, one line each.
    pub fn warnings(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.trim_start().starts_with("WARN"))
            .map(str::to_string)
            .collect()
    }
}

/// Writer handed out by [`CapturedLogs`].
#[derive(Debug)]
pub struct CapturedWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CapturedWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter {
            buf: Arc::clone(&self.buf),
        }
    }
}

fn to_nexus(err: ResourceOwnerError) -> NexusError {
    match err {
        ResourceOwnerError::Nexus(inner) => inner,
        other => NexusError::internal(other.to_string()),
    }
}

fn active_owner(owners: &ResourceOwnerManager) -> NexusResult<OwnerId> {
    owners
        .current_owner()
        .ok_or_else(|| NexusError::internal("no active resource owner"))
}

/// Buffer pool that counts pins per buffer.
#[derive(Debug, Default)]
pub struct MockBufferPool {
    pins: HashMap<BufferId, u32>,
    released: Vec<BufferId>,
}

impl MockBufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `buffer` for the active owner, or untracked outside a scope.
    pub fn pin(&mut self, owners: &mut ResourceOwnerManager, buffer: BufferId) -> NexusResult<()> {
        let owner = owners.current_buffer_owner();
        owners.enlarge_buffers(owner).map_err(to_nexus)?;
        *self.pins.entry(buffer).or_insert(0) += 1;
        owners.remember_buffer(owner, buffer).map_err(to_nexus)
    }

    /// Unpins `buffer` the way normal query code does.
    pub fn unpin(&mut self, owners: &mut ResourceOwnerManager, buffer: BufferId) -> NexusResult<()> {
        self.release_buffer(owners, buffer)
    }

    /// Drops a pin without telling the owner, leaving a stale entry behind.
    pub fn lose_pin(&mut self, buffer: BufferId) {
        if let Some(count) = self.pins.get_mut(&buffer) {
            *count = count.saturating_sub(1);
        }
    }

    /// Pin count of `buffer`.
    pub fn pin_count(&self, buffer: BufferId) -> u32 {
        self.pins.get(&buffer).copied().unwrap_or(0)
    }

    /// Total pins across all buffers.
    pub fn total_pins(&self) -> u32 {
        self.pins.values().sum()
    }

    /// Buffers released so far, in order.
    pub fn released(&self) -> &[BufferId] {
        &self.released
    }
}

impl BufferManager for MockBufferPool {
    fn release_buffer(
        &mut self,
        owners: &mut ResourceOwnerManager,
        buffer: BufferId,
    ) -> NexusResult<()> {
        let count = self
            .pins
            .get_mut(&buffer)
            .filter(|count| **count > 0)
            .ok_or(NexusError::BufferNotPinned { buffer })?;
        *count -= 1;
        self.released.push(buffer);
        owners
            .forget_buffer(owners.current_buffer_owner(), buffer)
            .map_err(to_nexus)
    }
}

/// Relation cache with named relations and open counts.
#[derive(Debug, Default)]
pub struct MockRelationCache {
    names: HashMap<RelationId, String>,
    open: HashMap<RelationId, u32>,
    closed: Vec<RelationId>,
}

impl MockRelationCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a relation name for leak messages.
    pub fn define(&mut self, relation: RelationId, name: impl Into<String>) {
        self.names.insert(relation, name.into());
    }

    /// Opens `relation` for the active owner.
    pub fn open(&mut self, owners: &mut ResourceOwnerManager, relation: RelationId) -> NexusResult<()> {
        let owner = active_owner(owners)?;
        owners.enlarge_relation_refs(owner).map_err(to_nexus)?;
        *self.open.entry(relation).or_insert(0) += 1;
        owners.remember_relation_ref(owner, relation).map_err(to_nexus)
    }

    /// Closes `relation` the way normal query code does.
    pub fn close(&mut self, owners: &mut ResourceOwnerManager, relation: RelationId) -> NexusResult<()> {
        self.close_relation(owners, relation)
    }

    /// Open count of `relation`.
    pub fn open_count(&self, relation: RelationId) -> u32 {
        self.open.get(&relation).copied().unwrap_or(0)
    }

    /// Relations closed so far, in order.
    pub fn closed(&self) -> &[RelationId] {
        &self.closed
    }
}

impl RelationCache for MockRelationCache {
    fn close_relation(
        &mut self,
        owners: &mut ResourceOwnerManager,
        relation: RelationId,
    ) -> NexusResult<()> {
        let count = self
            .open
            .get_mut(&relation)
            .filter(|count| **count > 0)
            .ok_or(NexusError::RelationNotFound { relation })?;
        *count -= 1;
        self.closed.push(relation);
        let owner = active_owner(owners)?;
        owners.forget_relation_ref(owner, relation).map_err(to_nexus)
    }

    fn relation_name(&self, relation: RelationId) -> Option<String> {
        self.names.get(&relation).cloned()
    }
}

/// Catalog cache with reference counts for entries and lists.
#[derive(Debug, Default)]
pub struct MockCatalogCache {
    entries: HashMap<CatCacheRef, u32>,
    lists: HashMap<CatCacheListRef, u32>,
}

impl MockCatalogCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a reference to a cache entry for the active owner.
    pub fn search(&mut self, owners: &mut ResourceOwnerManager, entry: CatCacheRef) -> NexusResult<()> {
        let owner = active_owner(owners)?;
        owners.enlarge_catcache_refs(owner).map_err(to_nexus)?;
        *self.entries.entry(entry).or_insert(0) += 1;
        owners.remember_catcache_ref(owner, entry).map_err(to_nexus)
    }

    /// Takes a reference to a cache list for the active owner.
    pub fn search_list(
        &mut self,
        owners: &mut ResourceOwnerManager,
        list: CatCacheListRef,
    ) -> NexusResult<()> {
        let owner = active_owner(owners)?;
        owners.enlarge_catcache_list_refs(owner).map_err(to_nexus)?;
        *self.lists.entry(list).or_insert(0) += 1;
        owners.remember_catcache_list_ref(owner, list).map_err(to_nexus)
    }

    /// Outstanding references across entries and lists.
    pub fn outstanding(&self) -> u32 {
        self.entries.values().sum::<u32>() + self.lists.values().sum::<u32>()
    }
}

impl CatalogCache for MockCatalogCache {
    fn release_cache_entry(
        &mut self,
        owners: &mut ResourceOwnerManager,
        entry: CatCacheRef,
    ) -> NexusResult<()> {
        let count = self
            .entries
            .get_mut(&entry)
            .filter(|count| **count > 0)
            .ok_or_else(|| NexusError::CacheEntryNotFound {
                entry: entry.to_string(),
            })?;
        *count -= 1;
        let owner = active_owner(owners)?;
        owners.forget_catcache_ref(owner, entry).map_err(to_nexus)
    }

    fn release_cache_list(
        &mut self,
        owners: &mut ResourceOwnerManager,
        list: CatCacheListRef,
    ) -> NexusResult<()> {
        let count = self
            .lists
            .get_mut(&list)
            .filter(|count| **count > 0)
            .ok_or_else(|| NexusError::CacheEntryNotFound {
                entry: list.to_string(),
            })?;
        *count -= 1;
        let owner = active_owner(owners)?;
        owners.forget_catcache_list_ref(owner, list).map_err(to_nexus)
    }
}

/// Counts index scan sweeps.
#[derive(Debug, Default)]
pub struct MockIndexScans {
    /// GiST sweeps.
    pub gist_sweeps: u32,
    /// Hash sweeps.
    pub hash_sweeps: u32,
}

impl IndexScanCleanup for MockIndexScans {
    fn release_gist_scans(&mut self) -> NexusResult<()> {
        self.gist_sweeps += 1;
        Ok(())
    }

    fn release_hash_scans(&mut self) -> NexusResult<()> {
        self.hash_sweeps += 1;
        Ok(())
    }
}

/// All collaborators of one session, with locks bound to one transaction.
#[derive(Debug)]
pub struct MockSubsystems<'a> {
    /// Buffer pool.
    pub buffers: MockBufferPool,
    /// Relation cache.
    pub relations: MockRelationCache,
    /// Catalog cache.
    pub catalog: MockCatalogCache,
    /// Lock table view.
    pub locks: TransactionLocks<'a>,
    /// Index scan sweeps.
    pub scans: MockIndexScans,
}

impl<'a> MockSubsystems<'a> {
    /// Creates empty subsystems around `locks`.
    pub fn new(locks: TransactionLocks<'a>) -> Self {
        Self {
            buffers: MockBufferPool::new(),
            relations: MockRelationCache::new(),
            catalog: MockCatalogCache::new(),
            locks,
            scans: MockIndexScans::default(),
        }
    }

    /// Borrows everything as release collaborators.
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

/// Callback that counts invocations per phase.
#[derive(Debug, Default)]
pub struct PhaseCounter {
    counts: [AtomicU64; 3],
}

impl PhaseCounter {
    /// Creates a shared counter ready to register.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Invocations seen for `phase`.
    pub fn count(&self, phase: ReleasePhase) -> u64 {
        self.counts[Self::slot(phase)].load(Ordering::Relaxed)
    }

    /// Invocations across all phases.
    pub fn total(&self) -> u64 {
        ReleasePhase::ALL.iter().map(|p| self.count(*p)).sum()
    }

    /// Returns `self` as a registrable callback.
    pub fn as_callback(self: &Arc<Self>) -> CallbackRef {
        self.clone()
    }

    fn slot(phase: ReleasePhase) -> usize {
        match phase {
            ReleasePhase::BeforeLocks => 0,
            ReleasePhase::Locks => 1,
            ReleasePhase::AfterLocks => 2,
        }
    }
}

impl ReleaseCallback for PhaseCounter {
    fn on_release(
        &self,
        phase: ReleasePhase,
        _is_commit: bool,
        _is_top_level: bool,
        _arg: CallbackArg,
    ) -> ResOwnerResult<()> {
        self.counts[Self::slot(phase)].fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
