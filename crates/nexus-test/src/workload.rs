//! Randomized acquire/release workloads.
//!
//! A workload is a seeded sequence of resource operations against the
//! active owner. Releases pick mostly the newest held resource, with an
//! occasional random pick, which is the mix the arrays are tuned for.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nexus_common::error::NexusResult;
use nexus_common::types::{BufferId, CatCacheRef, RelationId};
use nexus_resowner::ResourceOwnerManager;

use crate::utils::MockSubsystems;

/// One step of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadOp {
    /// Pin a buffer.
    PinBuffer(BufferId),
    /// Unpin a previously pinned buffer.
    UnpinBuffer(BufferId),
    /// Open a relation.
    OpenRelation(RelationId),
    /// Take a catalog cache entry reference.
    CacheLookup(CatCacheRef),
}

/// Settings for [`generate`].
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// RNG seed.
    pub seed: u64,
    /// Number of operations.
    pub ops: usize,
    /// Share of unpins, out of 100, while buffers are pinned.
    pub unpin_percent: u32,
    /// Share of unpins that pick a random buffer instead of the newest.
    pub out_of_order_percent: u32,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ops: 1_000,
            unpin_percent: 40,
            out_of_order_percent: 10,
        }
    }
}

/// Generates a workload. Every unpin refers to a buffer pinned earlier and
/// not yet unpinned.
pub fn generate(config: &WorkloadConfig) -> Vec<WorkloadOp> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut pinned: Vec<BufferId> = Vec::new();
    let mut ops = Vec::with_capacity(config.ops);

    for _ in 0..config.ops {
        let roll = rng.gen_range(0..100);
        if !pinned.is_empty() && roll < config.unpin_percent {
            let pos = if rng.gen_range(0..100) < config.out_of_order_percent {
                rng.gen_range(0..pinned.len())
            } else {
                pinned.len() - 1
            };
            ops.push(WorkloadOp::UnpinBuffer(pinned.remove(pos)));
        } else if roll < 85 {
            let buffer = BufferId::new(rng.gen_range(1..=4096));
            pinned.push(buffer);
            ops.push(WorkloadOp::PinBuffer(buffer));
        } else if roll < 93 {
            ops.push(WorkloadOp::OpenRelation(RelationId::new(rng.gen_range(16384..16484))));
        } else {
            ops.push(WorkloadOp::CacheLookup(CatCacheRef::new(rng.gen())));
        }
    }
    ops
}

/// Applies `ops` against the active owner of `owners`.
pub fn apply(
    ops: &[WorkloadOp],
    owners: &mut ResourceOwnerManager,
    subsystems: &mut MockSubsystems<'_>,
) -> NexusResult<()> {
    for op in ops {
        match *op {
            WorkloadOp::PinBuffer(buffer) => subsystems.buffers.pin(owners, buffer)?,
            WorkloadOp::UnpinBuffer(buffer) => subsystems.buffers.unpin(owners, buffer)?,
            WorkloadOp::OpenRelation(relation) => subsystems.relations.open(owners, relation)?,
            WorkloadOp::CacheLookup(entry) => subsystems.catalog.search(owners, entry)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_deterministic() {
        let config = WorkloadConfig::default();
        assert_eq!(generate(&config), generate(&config));
    }

    #[test]
    fn test_unpins_follow_pins() {
        let ops = generate(&WorkloadConfig {
            ops: 500,
            out_of_order_percent: 50,
            ..WorkloadConfig::default()
        });
        let mut held: Vec<BufferId> = Vec::new();
        for op in ops {
            match op {
                WorkloadOp::PinBuffer(b) => held.push(b),
                WorkloadOp::UnpinBuffer(b) => {
                    let pos = held.iter().position(|h| *h == b).unwrap();
                    held.remove(pos);
                }
                _ => {}
            }
        }
    }
}
