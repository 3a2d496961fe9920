//! # nexus-common
//!
//! Common types, errors, and utilities for NexusDB.
//!
//! This crate provides the foundational types and abstractions used across
//! all NexusDB components. It includes:
//!
//! - **Types**: Resource handles (`BufferId`, `RelationId`, catalog cache
//!   references) and `TxnId`
//! - **Errors**: Unified error handling with `NexusError`
//! - **Config**: Resource owner and lock table configuration
//! - **Constants**: System-wide constants and limits
//!
//! ## Example
//!
//! ```rust
//! use nexus_common::types::{BufferId, RelationId};
//! use nexus_common::error::NexusResult;
//!
//! fn example() -> NexusResult<()> {
//!     let buffer = BufferId::new(42);
//!     let relation = RelationId::new(16384);
//!     assert!(buffer.is_valid() && relation.is_valid());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use error::{NexusError, NexusResult};
pub use types::{BufferId, CatCacheListRef, CatCacheRef, RelationId, TxnId};
