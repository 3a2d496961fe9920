//! # nexus-resowner
//!
//! Resource owners for NexusDB's execution layer.
//!
//! Every scarce runtime resource acquired while a query runs (buffer pins,
//! catalog cache references, open relations) is recorded against an owner
//! that stands for a transaction, subtransaction or portal. When the scope
//! ends, normally or by abort, the owner's subtree is walked in three phases
//! and everything still held is handed back exactly once, in an order that
//! is safe with respect to locking.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   ResourceOwnerManager                       │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌────────────────┐  │
//! │  │  OwnerTree   │  │ ExecutionContext │  │CallbackRegistry│  │
//! │  │  (arena)     │  │ current / cur /  │  │ (newest first) │  │
//! │  │              │  │ top transaction  │  │                │  │
//! │  └──────┬───────┘  └──────────────────┘  └────────────────┘  │
//! │         │                                                    │
//! │         ▼                                                    │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ OwnerNode: name, parent, children                      │  │
//! │  │   ResourceArray<BufferPins>                            │  │
//! │  │   ResourceArray<RelationRefs>                          │  │
//! │  │   ResourceArray<CatCacheRefs>                          │  │
//! │  │   ResourceArray<CatCacheListRefs>                      │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ release(owner, phase, ..)
//!                                ▼
//!        BufferManager · RelationCache · CatalogCache ·
//!        LockReleaser · IndexScanCleanup   (Collaborators)
//! ```
//!
//! # Acquire and release pattern
//!
//! ```rust
//! use nexus_common::types::RelationId;
//! use nexus_resowner::{ResOwnerResult, ResourceOwnerManager};
//!
//! fn example() -> ResOwnerResult<()> {
//!     let mut owners = ResourceOwnerManager::new();
//!     let top = owners.create(None, "TopTransaction")?;
//!     owners.set_current_owner(Some(top));
//!
//!     // Make room first, then acquire, then remember.
//!     owners.enlarge_relation_refs(top)?;
//!     let relation = RelationId::new(16384);
//!     owners.remember_relation_ref(top, relation)?;
//!
//!     // The relation cache forgets the reference when it closes it.
//!     owners.forget_relation_ref(top, relation)?;
//!
//!     owners.set_current_owner(None);
//!     owners.delete(top)
//! }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Release callbacks for subsystems without a built-in array.
pub mod callback;

/// Session execution context.
pub mod context;

/// Error types.
pub mod error;

/// Resource kinds and their bindings.
pub mod kind;

/// Per-session manager.
pub mod manager;

/// Collaborator interfaces.
pub mod managers;

/// Owner nodes and the owner arena.
pub mod owner;

/// Growable per-owner handle arrays.
pub mod registry;

/// Phased release protocol.
pub mod release;

/// Statistics.
pub mod stats;

pub use callback::{CallbackArg, CallbackRef, CallbackRegistry, ReleaseCallback};
pub use context::ExecutionContext;
pub use error::{ResOwnerResult, ResourceOwnerError};
pub use kind::{
    BufferPins, CatCacheListRefs, CatCacheRefs, RelationRefs, ResourceKind, ResourceType,
};
pub use manager::ResourceOwnerManager;
pub use managers::{
    BufferManager, CatalogCache, Collaborators, IndexScanCleanup, LockReleaser, NoIndexScans,
    RelationCache,
};
pub use owner::{BufferOwner, OwnerId, OwnerNode, ResourceCounts};
pub use registry::ResourceArray;
pub use release::ReleasePhase;
pub use stats::{ResourceOwnerStats, StatsSnapshot};
