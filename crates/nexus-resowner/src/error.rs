//! Resource owner errors.

use nexus_common::error::NexusError;
use thiserror::Error;

use crate::owner::OwnerId;

/// Result type for resource owner operations.
pub type ResOwnerResult<T> = Result<T, ResourceOwnerError>;

/// Errors that can occur while tracking or releasing resources.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum ResourceOwnerError {
    /// Forget was called for a handle the owner does not hold.
    ///
    /// The resource was never remembered, was already forgotten, or belongs
    /// to a different owner than the caller claimed.
    #[error("{kind} {handle} is not owned by resource owner {owner}")]
    NotOwned {
        kind: &'static str,
        handle: String,
        owner: String,
    },

    /// An owner still holding resources was asked to be deleted.
    #[error("resource owner {owner} still holds {count} {kind} entries")]
    OwnerNotEmpty {
        owner: String,
        kind: &'static str,
        count: usize,
    },

    /// The active owner (or an ancestor of it) was asked to be deleted.
    #[error("cannot delete resource owner {owner} while it is the current owner")]
    DeleteCurrentOwner { owner: String },

    /// An owner was asked to become its own parent.
    #[error("resource owner {owner} cannot be its own parent")]
    SelfParent { owner: String },

    /// Reparenting would make an owner a descendant of itself.
    #[error("resource owner {owner} cannot be moved under its descendant {new_parent}")]
    CyclicParent { owner: String, new_parent: String },

    /// The handle does not name a live owner.
    #[error("unknown resource owner {id}")]
    UnknownOwner { id: OwnerId },

    /// A nested-scope lock release reached an owner with no parent.
    #[error("resource owner {owner} has no parent to hand its locks to")]
    MissingParent { owner: String },

    /// A collaborator's release operation returned without calling Forget.
    #[error("releasing {kind} {handle} did not remove it from resource owner {owner}")]
    ReleaseNotForgotten {
        kind: &'static str,
        handle: String,
        owner: String,
    },

    /// Growing a resource array failed before the resource was acquired.
    #[error("out of memory while enlarging {kind} array to {requested} entries")]
    OutOfMemory { kind: &'static str, requested: usize },

    /// Error surfaced by an external subsystem.
    #[error(transparent)]
    Nexus(#[from] NexusError),

    /// Error raised by a registered release callback.
    #[error("release callback failed: {message}")]
    Callback { message: String },
}

impl ResourceOwnerError {
    /// Creates a callback error.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Returns true if this error means the owner bookkeeping itself is
    /// inconsistent (a caller bug) rather than a failed request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotOwned { .. }
                | Self::OwnerNotEmpty { .. }
                | Self::DeleteCurrentOwner { .. }
                | Self::SelfParent { .. }
                | Self::CyclicParent { .. }
                | Self::UnknownOwner { .. }
                | Self::MissingParent { .. }
                | Self::ReleaseNotForgotten { .. }
        )
    }

    /// Returns true if the operation can be retried once memory is available.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OutOfMemory { .. } => true,
            Self::Nexus(err) => err.is_retryable(),
            _ => false,
        }
    }
}
