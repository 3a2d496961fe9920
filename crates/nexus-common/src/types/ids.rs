//! Core identifier types for NexusDB.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types. Every handle that a
//! resource owner can track is one of these: they are `Copy`, cheap to compare
//! and carry no lifetime of their own.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Buffer identifier - names one shared buffer slot that can be pinned.
///
/// Buffer numbers start at 1; 0 is reserved as the invalid sentinel, so a
/// zeroed handle is never mistaken for a real pin.
///
/// # Example
///
/// ```rust
/// use nexus_common::types::BufferId;
///
/// let buf = BufferId::new(42);
/// assert_eq!(buf.as_u32(), 42);
/// assert!(buf.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct BufferId(u32);

impl BufferId {
    /// Invalid buffer ID, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// Creates a new `BufferId` from a raw u32 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Checks if this is a valid buffer ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "BufferId(INVALID)")
        } else {
            write!(f, "BufferId({})", self.0)
        }
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BufferId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

/// Relation identifier - the catalog OID of an open table or index.
///
/// # Example
///
/// ```rust
/// use nexus_common::types::RelationId;
///
/// let rel = RelationId::new(16384);
/// assert!(rel.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RelationId(u32);

impl RelationId {
    /// Invalid relation ID, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// Creates a new `RelationId` from a raw u32 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Checks if this is a valid relation ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "RelationId(INVALID)")
        } else {
            write!(f, "RelationId({})", self.0)
        }
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RelationId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

/// Reference to a single pinned catalog cache entry.
///
/// The value is opaque: the catalog cache hands it out and the only thing
/// anyone else may do with it is compare it and give it back.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CatCacheRef(u64);

impl CatCacheRef {
    /// Creates a reference from the catalog cache's raw entry address.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for CatCacheRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CatCacheRef({:#x})", self.0)
    }
}

impl fmt::Display for CatCacheRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Reference to a pinned catalog cache search-result list.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CatCacheListRef(u64);

impl CatCacheListRef {
    /// Creates a reference from the catalog cache's raw list address.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for CatCacheListRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CatCacheListRef({:#x})", self.0)
    }
}

impl fmt::Display for CatCacheListRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Transaction identifier - uniquely identifies a top-level transaction.
///
/// # Example
///
/// ```rust
/// use nexus_common::types::TxnId;
///
/// let txn = TxnId::new(1);
/// assert!(txn.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TxnId(u64);

impl TxnId {
    /// Invalid transaction ID, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// Minimum valid transaction ID.
    pub const MIN: Self = Self(1);

    /// Creates a new `TxnId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next transaction ID.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid transaction ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "TxnId(INVALID)")
        } else {
            write!(f, "TxnId({})", self.0)
        }
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TxnId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_id() {
        let buf = BufferId::new(7);
        assert_eq!(buf.as_u32(), 7);
        assert!(buf.is_valid());
        assert!(!BufferId::INVALID.is_valid());
        assert_eq!(format!("{:?}", BufferId::INVALID), "BufferId(INVALID)");
        assert_eq!(buf.to_string(), "7");
    }

    #[test]
    fn test_relation_id() {
        let rel = RelationId::from(16384);
        assert_eq!(rel.as_u32(), 16384);
        assert!(rel.is_valid());
        assert!(!RelationId::INVALID.is_valid());
    }

    #[test]
    fn test_catcache_refs_display_as_hex() {
        assert_eq!(CatCacheRef::new(0xbeef).to_string(), "0xbeef");
        assert_eq!(format!("{:?}", CatCacheListRef::new(16)), "CatCacheListRef(0x10)");
    }

    #[test]
    fn test_txn_id() {
        let txn = TxnId::new(100);
        assert_eq!(txn.as_u64(), 100);
        assert!(txn.is_valid());
        assert!(!TxnId::INVALID.is_valid());
        assert_eq!(txn.next().as_u64(), 101);
    }

    #[test]
    fn test_ordering() {
        assert!(BufferId::new(1) < BufferId::new(2));
        assert!(RelationId::new(1) < RelationId::new(2));
        assert!(TxnId::new(1) < TxnId::new(2));
    }
}
