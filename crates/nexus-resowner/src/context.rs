//! Session execution context.
//!
//! Holds the three owner pointers the transaction manager moves at scope
//! boundaries. The active owner is where implicit Remember and Forget calls
//! land; the other two mark the innermost and outermost open transactions.

use crate::owner::{BufferOwner, OwnerId};

/// Owner pointers for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    current: Option<OwnerId>,
    cur_transaction: Option<OwnerId>,
    top_transaction: Option<OwnerId>,
}

impl ExecutionContext {
    /// Creates a context with no open scope.
    pub const fn new() -> Self {
        Self {
            current: None,
            cur_transaction: None,
            top_transaction: None,
        }
    }

    /// The active owner.
    #[inline]
    pub fn current(&self) -> Option<OwnerId> {
        self.current
    }

    /// Replaces the active owner, returning the previous one.
    #[inline]
    pub fn set_current(&mut self, owner: Option<OwnerId>) -> Option<OwnerId> {
        std::mem::replace(&mut self.current, owner)
    }

    /// Owner of the innermost open transaction.
    #[inline]
    pub fn cur_transaction(&self) -> Option<OwnerId> {
        self.cur_transaction
    }

    /// Sets the owner of the innermost open transaction.
    #[inline]
    pub fn set_cur_transaction(&mut self, owner: Option<OwnerId>) {
        self.cur_transaction = owner;
    }

    /// Owner of the top-level transaction.
    #[inline]
    pub fn top_transaction(&self) -> Option<OwnerId> {
        self.top_transaction
    }

    /// Sets the owner of the top-level transaction.
    #[inline]
    pub fn set_top_transaction(&mut self, owner: Option<OwnerId>) {
        self.top_transaction = owner;
    }

    /// The active owner as a buffer pin target.
    ///
    /// Outside any transaction this is [`BufferOwner::Untracked`].
    #[inline]
    pub fn buffer_owner(&self) -> BufferOwner {
        BufferOwner::from(self.current)
    }

    /// Clears any pointer that refers to `owner`.
    pub(crate) fn forget_owner(&mut self, owner: OwnerId) {
        if self.cur_transaction == Some(owner) {
            self.cur_transaction = None;
        }
        if self.top_transaction == Some(owner) {
            self.top_transaction = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::OwnerTree;
    use nexus_common::config::ResourceOwnerConfig;

    #[test]
    fn test_empty_context() {
        let ctx = ExecutionContext::new();
        assert_eq!(ctx.current(), None);
        assert_eq!(ctx.cur_transaction(), None);
        assert_eq!(ctx.top_transaction(), None);
        assert_eq!(ctx.buffer_owner(), BufferOwner::Untracked);
    }

    #[test]
    fn test_set_current_returns_previous() {
        let mut tree = OwnerTree::new(&ResourceOwnerConfig::default());
        let a = tree.create(None, "a".into()).unwrap();
        let b = tree.create(None, "b".into()).unwrap();

        let mut ctx = ExecutionContext::new();
        assert_eq!(ctx.set_current(Some(a)), None);
        assert_eq!(ctx.set_current(Some(b)), Some(a));
        assert_eq!(ctx.buffer_owner(), BufferOwner::Tracked(b));
    }

    #[test]
    fn test_forget_owner_clears_transaction_pointers() {
        let mut tree = OwnerTree::new(&ResourceOwnerConfig::default());
        let top = tree.create(None, "top".into()).unwrap();

        let mut ctx = ExecutionContext::new();
        ctx.set_top_transaction(Some(top));
        ctx.set_cur_transaction(Some(top));
        ctx.forget_owner(top);

        assert_eq!(ctx.top_transaction(), None);
        assert_eq!(ctx.cur_transaction(), None);
    }
}
