//! Database error types.
//!
//! Provides the error type returned by the subsystems that hold runtime
//! resources (buffer manager, catalog and relation caches, lock table).

use std::fmt;
use thiserror::Error;

use crate::types::{BufferId, RelationId, TxnId};

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Configuration rejected.
    InvalidConfig = 0x0004,

    // Storage errors (0x0200 - 0x02FF)
    /// Buffer is not pinned by the caller.
    BufferNotPinned = 0x0207,

    // Transaction errors (0x0300 - 0x03FF)
    /// Lock acquisition failed.
    LockFailed = 0x0303,
    /// Lock is not held by the caller.
    LockNotHeld = 0x0306,

    // Catalog errors (0x0700 - 0x07FF)
    /// Relation not found or not open.
    RelationNotFound = 0x0700,
    /// Catalog cache entry not found.
    CacheEntryNotFound = 0x0701,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x02 => "Storage",
            0x03 => "Transaction",
            0x07 => "Catalog",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for NexusDB.
///
/// Each variant includes relevant context for debugging.
///
/// # Example
///
/// ```rust
/// use nexus_common::error::{NexusError, NexusResult};
/// use nexus_common::types::BufferId;
///
/// fn unpin(buffer: BufferId) -> NexusResult<()> {
///     Err(NexusError::BufferNotPinned { buffer })
/// }
/// ```
#[derive(Debug, Error)]
pub enum NexusError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    /// The buffer is not pinned by the releasing backend.
    #[error("buffer {buffer} is not pinned")]
    BufferNotPinned {
        /// The buffer that was released.
        buffer: BufferId,
    },

    // ==========================================================================
    // Transaction Errors
    // ==========================================================================
    /// Lock acquisition failed.
    #[error("failed to acquire lock for transaction {txn_id}: {reason}")]
    LockFailed {
        /// The transaction that couldn't acquire the lock.
        txn_id: TxnId,
        /// Reason for failure.
        reason: String,
    },

    /// The lock being released is not held.
    #[error("lock {lock} is not held by transaction {txn_id}")]
    LockNotHeld {
        /// The transaction releasing the lock.
        txn_id: TxnId,
        /// Description of the lock.
        lock: String,
    },

    // ==========================================================================
    // Catalog Errors
    // ==========================================================================
    /// Relation is not open.
    #[error("relation {relation} is not open")]
    RelationNotFound {
        /// The missing relation.
        relation: RelationId,
    },

    /// Catalog cache entry is not present.
    #[error("catalog cache entry {entry} not found")]
    CacheEntryNotFound {
        /// Description of the entry.
        entry: String,
    },

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

impl NexusError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::BufferNotPinned { .. } => ErrorCode::BufferNotPinned,
            Self::LockFailed { .. } => ErrorCode::LockFailed,
            Self::LockNotHeld { .. } => ErrorCode::LockNotHeld,
            Self::RelationNotFound { .. } => ErrorCode::RelationNotFound,
            Self::CacheEntryNotFound { .. } => ErrorCode::CacheEntryNotFound,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockFailed { .. })
    }

    /// Returns true if this error signals corrupted bookkeeping rather than a
    /// failed request.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Internal { .. }
                | Self::BufferNotPinned { .. }
                | Self::LockNotHeld { .. }
                | Self::CacheEntryNotFound { .. }
        )
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = NexusError::BufferNotPinned {
            buffer: BufferId::new(42),
        };
        assert_eq!(err.code(), ErrorCode::BufferNotPinned);
        assert_eq!(err.code().category(), "Storage");

        let err = NexusError::RelationNotFound {
            relation: RelationId::new(1259),
        };
        assert_eq!(err.code().category(), "Catalog");
    }

    #[test]
    fn test_error_display() {
        let err = NexusError::BufferNotPinned {
            buffer: BufferId::new(42),
        };
        assert_eq!(err.to_string(), "buffer 42 is not pinned");

        let err = NexusError::LockNotHeld {
            txn_id: TxnId::new(7),
            lock: "Relation(16384)".to_string(),
        };
        assert_eq!(err.to_string(), "lock Relation(16384) is not held by transaction 7");
    }

    #[test]
    fn test_retryable() {
        let err = NexusError::LockFailed {
            txn_id: TxnId::new(1),
            reason: "limit reached".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!NexusError::internal("bug").is_retryable());
    }

    #[test]
    fn test_fatal() {
        assert!(NexusError::internal("bug").is_fatal());
        let err = NexusError::InvalidConfig {
            message: "initial_capacity must be at least 1".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
    }
}
