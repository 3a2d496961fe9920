//! Configuration for NexusDB.
//!
//! This module provides configuration structures for the execution layer.

mod database;

pub use database::{DatabaseConfig, LockConfig, ResourceOwnerConfig};
