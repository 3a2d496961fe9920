//! NexusDB Performance Benchmarks
//!
//! This crate contains benchmarks for the resource owner machinery:
//! - Resource array remember/forget in LIFO and random order
//! - Phased release of owner trees of varying shape
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p nexus-bench
//! ```

pub mod utils;
