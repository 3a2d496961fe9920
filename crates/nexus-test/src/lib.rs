//! # nexus-test
//!
//! Integration tests for NexusDB resource owners.
//!
//! This crate contains:
//! - In-memory collaborators that follow the Enlarge/Remember/Forget protocol
//! - Randomized acquire/release workloads
//! - End-to-end transaction lifecycle tests (under `tests/`)

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Test utilities and helpers
pub mod utils;

/// Workload generators
pub mod workload;
