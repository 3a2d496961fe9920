//! System-wide constants for NexusDB.
//!
//! This module defines constants used across the execution layer.

// =============================================================================
// Resource Owner Constants
// =============================================================================

/// Number of slots a resource array receives the first time it grows.
///
/// Later growths double the capacity, so the k-th growth leaves room for
/// `16 * 2^(k-1)` handles.
pub const RESOURCE_ARRAY_INITIAL_CAPACITY: usize = 16;

/// Factor by which a full resource array grows.
pub const RESOURCE_ARRAY_GROWTH_FACTOR: usize = 2;

// =============================================================================
// Lock Constants
// =============================================================================

/// Sentinel for "no per-transaction lock limit".
pub const UNLIMITED_LOCKS_PER_TXN: usize = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_array_constants() {
        assert!(RESOURCE_ARRAY_INITIAL_CAPACITY.is_power_of_two());
        assert_eq!(RESOURCE_ARRAY_GROWTH_FACTOR, 2);
    }
}
