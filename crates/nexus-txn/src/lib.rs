//! # nexus-txn
//!
//! Transaction locking for NexusDB.
//!
//! This crate provides the lock table the resource owner LOCKS phase talks
//! to:
//!
//! - **Lock Management**: Relation, page and tuple locks with shared (S) and
//!   exclusive (X) modes, plus intention locks for hierarchical locking.
//!
//! - **Owner Ledger**: Every acquisition is recorded against the resource
//!   owner that was active, so a subtransaction's locks can be handed to its
//!   parent on commit or dropped on abort.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                   ResourceOwnerManager                         │
//! │                  release(.., LOCKS, ..)                        │
//! │                           │                                    │
//! │                           ▼                                    │
//! │                ┌─────────────────────┐                         │
//! │                │  TransactionLocks   │  (LockReleaser)         │
//! │                └──────────┬──────────┘                         │
//! │                           ▼                                    │
//! │                ┌─────────────────────┐                         │
//! │                │     LockManager     │                         │
//! │                │  locks  │  ledgers  │                         │
//! │                └─────────────────────┘                         │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use nexus_common::types::{RelationId, TxnId};
//! use nexus_resowner::ResourceOwnerManager;
//! use nexus_txn::{LockManager, LockMode, LockTag};
//!
//! let mut owners = ResourceOwnerManager::new();
//! let top = owners.create(None, "TopTransaction").unwrap();
//! let sub = owners.create(Some(top), "SubTransaction").unwrap();
//!
//! let locks = LockManager::new();
//! let txn = TxnId::new(1);
//! let tag = LockTag::relation(RelationId::new(16384));
//! locks.try_lock(txn, sub, tag.clone(), LockMode::Exclusive).unwrap();
//!
//! // Subtransaction commit: the parent now holds the lock.
//! locks.reassign_owner(txn, sub, top);
//! assert_eq!(locks.owner_locks(txn, top), vec![tag]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Lock table implementation.
///
/// This module provides:
/// - [`lock::LockManager`]: Manages all locks
/// - [`lock::LockMode`]: Shared, Exclusive, and intention locks
/// - [`lock::LockTag`]: Identifies lockable objects
/// - [`lock::TransactionLocks`]: The LOCKS phase collaborator
pub mod lock;

// Re-export commonly used types

pub use lock::{
    LockInfo, LockManager, LockMode, LockResult, LockStats, LockTag, TransactionLocks,
};
