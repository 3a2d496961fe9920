//! Type definitions for NexusDB.
//!
//! This module contains the identifier types shared by the execution layer
//! and the subsystems whose resources it tracks.

mod ids;

pub use ids::{BufferId, CatCacheListRef, CatCacheRef, RelationId, TxnId};
