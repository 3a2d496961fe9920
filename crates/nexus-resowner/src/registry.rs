//! Growable per-owner handle arrays.
//!
//! A [`ResourceArray`] is a dense list of handles with an explicit capacity.
//! Growth is split from insertion: [`ResourceArray::enlarge`] must succeed
//! before the resource is acquired, after which [`ResourceArray::remember`]
//! cannot fail. An allocation failure therefore always happens while there is
//! nothing to leak.
//!
//! Removal scans from the newest entry backwards. Resources are usually
//! released in roughly reverse acquisition order, so the match is normally
//! found within the first few comparisons.

use std::fmt;
use std::marker::PhantomData;
use std::mem;

use nexus_common::constants::{RESOURCE_ARRAY_GROWTH_FACTOR, RESOURCE_ARRAY_INITIAL_CAPACITY};

use crate::error::{ResOwnerResult, ResourceOwnerError};
use crate::kind::ResourceKind;

/// Dense array of handles of one resource kind.
pub struct ResourceArray<K: ResourceKind> {
    /// Remembered handles, oldest first.
    handles: Vec<K::Handle>,
    /// Slots reserved by `enlarge`; `handles.len()` never exceeds it.
    capacity: usize,
    /// Capacity granted by the first growth.
    initial_capacity: usize,
    _kind: PhantomData<K>,
}

impl<K: ResourceKind> ResourceArray<K> {
    /// Creates an empty array that grows to the default initial capacity.
    pub fn new() -> Self {
        Self::with_initial_capacity(RESOURCE_ARRAY_INITIAL_CAPACITY)
    }

    /// Creates an empty array whose first growth reserves `initial_capacity`
    /// slots. Values below 1 are clamped to 1.
    pub fn with_initial_capacity(initial_capacity: usize) -> Self {
        Self {
            handles: Vec::new(),
            capacity: 0,
            initial_capacity: initial_capacity.max(1),
            _kind: PhantomData,
        }
    }

    /// Makes sure there is room for at least one more handle.
    ///
    /// Does nothing while spare capacity remains. Otherwise reserves the
    /// initial capacity on first use and doubles it afterwards.
    pub fn enlarge(&mut self) -> ResOwnerResult<()> {
        if self.handles.len() < self.capacity {
            return Ok(());
        }

        let new_capacity = if self.capacity == 0 {
            self.initial_capacity
        } else {
            self.capacity
                .checked_mul(RESOURCE_ARRAY_GROWTH_FACTOR)
                .ok_or(ResourceOwnerError::OutOfMemory {
                    kind: K::TYPE.name(),
                    requested: usize::MAX,
                })?
        };

        self.handles
            .try_reserve_exact(new_capacity - self.handles.len())
            .map_err(|_| ResourceOwnerError::OutOfMemory {
                kind: K::TYPE.name(),
                requested: new_capacity,
            })?;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Appends a handle.
    ///
    /// The caller must have called [`enlarge`](Self::enlarge) since the last
    /// append, so this never allocates.
    pub fn remember(&mut self, handle: K::Handle) {
        debug_assert!(
            self.handles.len() < self.capacity,
            "{} array remembered without a preceding enlarge",
            K::TYPE.name()
        );
        self.handles.push(handle);
    }

    /// Removes the newest entry equal to `handle`, keeping the array dense.
    ///
    /// Returns false if no entry matches.
    pub fn forget(&mut self, handle: K::Handle) -> bool {
        match self.handles.iter().rposition(|h| *h == handle) {
            Some(pos) => {
                self.handles.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Returns the most recently remembered handle.
    #[inline]
    pub fn last(&self) -> Option<K::Handle> {
        self.handles.last().copied()
    }

    /// Returns true if `handle` is remembered at least once.
    pub fn contains(&self, handle: K::Handle) -> bool {
        self.handles.contains(&handle)
    }

    /// Returns the number of remembered handles.
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if nothing is remembered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns the number of slots reserved by `enlarge`.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over remembered handles, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = K::Handle> + '_ {
        self.handles.iter().copied()
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        self.capacity * mem::size_of::<K::Handle>()
    }
}

impl<K: ResourceKind> Default for ResourceArray<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ResourceKind> fmt::Debug for ResourceArray<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceArray")
            .field("kind", &K::TYPE)
            .field("len", &self.handles.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{BufferPins, RelationRefs};
    use nexus_common::types::{BufferId, RelationId};

    fn buf(n: u32) -> BufferId {
        BufferId::new(n)
    }

    #[test]
    fn test_new_array_has_no_capacity() {
        let array = ResourceArray::<BufferPins>::new();
        assert_eq!(array.len(), 0);
        assert_eq!(array.capacity(), 0);
        assert!(array.is_empty());
        assert_eq!(array.last(), None);
    }

    #[test]
    fn test_growth_sequence() {
        let mut array = ResourceArray::<BufferPins>::new();
        let mut growths = 0;
        let mut last_capacity = 0;

        for i in 1..=200 {
            array.enlarge().unwrap();
            if array.capacity() != last_capacity {
                growths += 1;
                assert!(array.capacity() >= 16 * (1 << (growths - 1)));
                last_capacity = array.capacity();
            }
            array.remember(buf(i));
        }

        // 16, 32, 64, 128, 256
        assert_eq!(growths, 5);
        assert_eq!(array.capacity(), 256);
        assert_eq!(array.len(), 200);
    }

    #[test]
    fn test_enlarge_is_noop_with_spare_room() {
        let mut array = ResourceArray::<BufferPins>::new();
        array.enlarge().unwrap();
        array.enlarge().unwrap();
        assert_eq!(array.capacity(), 16);

        array.remember(buf(1));
        array.enlarge().unwrap();
        assert_eq!(array.capacity(), 16);
    }

    #[test]
    fn test_custom_initial_capacity() {
        let mut array = ResourceArray::<BufferPins>::with_initial_capacity(2);
        for i in 1..=3 {
            array.enlarge().unwrap();
            array.remember(buf(i));
        }
        assert_eq!(array.capacity(), 4);

        let clamped = ResourceArray::<BufferPins>::with_initial_capacity(0);
        assert_eq!(clamped.initial_capacity, 1);
    }

    #[test]
    fn test_remember_then_forget_restores_state() {
        let mut array = ResourceArray::<BufferPins>::new();
        for i in 1..=5 {
            array.enlarge().unwrap();
            array.remember(buf(i));
        }
        let before: Vec<_> = array.iter().collect();

        array.enlarge().unwrap();
        array.remember(buf(99));
        assert!(array.forget(buf(99)));

        let after: Vec<_> = array.iter().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_forget_middle_keeps_order() {
        let mut array = ResourceArray::<RelationRefs>::new();
        for i in 1..=4 {
            array.enlarge().unwrap();
            array.remember(RelationId::new(i));
        }

        assert!(array.forget(RelationId::new(2)));
        let rest: Vec<u32> = array.iter().map(RelationId::as_u32).collect();
        assert_eq!(rest, vec![1, 3, 4]);
        assert_eq!(array.last(), Some(RelationId::new(4)));
    }

    #[test]
    fn test_forget_removes_newest_duplicate() {
        let mut array = ResourceArray::<BufferPins>::new();
        for b in [1, 2, 1, 3] {
            array.enlarge().unwrap();
            array.remember(buf(b));
        }

        assert!(array.forget(buf(1)));
        let rest: Vec<u32> = array.iter().map(BufferId::as_u32).collect();
        assert_eq!(rest, vec![1, 2, 3]);
        assert!(array.contains(buf(1)));
    }

    #[test]
    fn test_forget_missing_returns_false() {
        let mut array = ResourceArray::<BufferPins>::new();
        assert!(!array.forget(buf(1)));

        array.enlarge().unwrap();
        array.remember(buf(1));
        assert!(array.forget(buf(1)));
        assert!(!array.forget(buf(1)));
    }

    #[test]
    fn test_memory_usage_tracks_capacity() {
        let mut array = ResourceArray::<BufferPins>::new();
        assert_eq!(array.memory_usage(), 0);
        array.enlarge().unwrap();
        assert_eq!(array.memory_usage(), 16 * mem::size_of::<BufferId>());
    }
}
