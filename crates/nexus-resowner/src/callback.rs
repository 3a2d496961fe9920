//! Release callbacks for subsystems without a built-in registry.
//!
//! A callback is invoked once for every owner visited in every phase. It
//! receives the phase and flags and must filter for the phases it cares
//! about itself.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::ResOwnerResult;
use crate::release::ReleasePhase;

/// Opaque argument handed back to a callback on every invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CallbackArg(pub u64);

/// Hook run after the built-in work of each phase.
pub trait ReleaseCallback: Send + Sync {
    /// Called once per (owner, phase) pair.
    fn on_release(
        &self,
        phase: ReleasePhase,
        is_commit: bool,
        is_top_level: bool,
        arg: CallbackArg,
    ) -> ResOwnerResult<()>;
}

impl<F> ReleaseCallback for F
where
    F: Fn(ReleasePhase, bool, bool, CallbackArg) -> ResOwnerResult<()> + Send + Sync,
{
    fn on_release(
        &self,
        phase: ReleasePhase,
        is_commit: bool,
        is_top_level: bool,
        arg: CallbackArg,
    ) -> ResOwnerResult<()> {
        self(phase, is_commit, is_top_level, arg)
    }
}

/// Shared handle to a registered callback.
pub type CallbackRef = Arc<dyn ReleaseCallback>;

struct Entry {
    callback: CallbackRef,
    arg: CallbackArg,
}

impl Entry {
    fn matches(&self, callback: &CallbackRef, arg: CallbackArg) -> bool {
        // Compare data pointers only; vtable pointers may differ across
        // codegen units for the same type.
        Arc::as_ptr(&self.callback).cast::<()>() == Arc::as_ptr(callback).cast::<()>()
            && self.arg == arg
    }
}

/// Ordered list of registered callbacks, newest first.
#[derive(Default)]
pub struct CallbackRegistry {
    entries: VecDeque<Entry>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry at the front. Duplicate pairs are kept as separate
    /// entries.
    pub fn register(&mut self, callback: CallbackRef, arg: CallbackArg) {
        self.entries.push_front(Entry { callback, arg });
    }

    /// Removes the first entry matching `callback` and `arg`.
    ///
    /// Returns false if nothing matched.
    pub fn unregister(&mut self, callback: &CallbackRef, arg: CallbackArg) -> bool {
        match self.entries.iter().position(|e| e.matches(callback, arg)) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invokes every entry in list order, stopping at the first error.
    ///
    /// Returns the number of callbacks that ran.
    pub(crate) fn invoke_all(
        &self,
        phase: ReleasePhase,
        is_commit: bool,
        is_top_level: bool,
    ) -> ResOwnerResult<u64> {
        let mut invoked = 0;
        for entry in &self.entries {
            invoked += 1;
            entry
                .callback
                .on_release(phase, is_commit, is_top_level, entry.arg)?;
        }
        Ok(invoked)
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceOwnerError;
    use parking_lot::Mutex;

    struct Recorder {
        seen: Mutex<Vec<(ReleasePhase, u64)>>,
    }

    impl ReleaseCallback for Recorder {
        fn on_release(
            &self,
            phase: ReleasePhase,
            _is_commit: bool,
            _is_top_level: bool,
            arg: CallbackArg,
        ) -> ResOwnerResult<()> {
            self.seen.lock().push((phase, arg.0));
            Ok(())
        }
    }

    fn recorder() -> Arc<Recorder> {
        Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_register_prepends() {
        let rec = recorder();
        let cb: CallbackRef = rec.clone();
        let mut registry = CallbackRegistry::new();
        registry.register(cb.clone(), CallbackArg(1));
        registry.register(cb, CallbackArg(2));

        registry
            .invoke_all(ReleasePhase::BeforeLocks, false, false)
            .unwrap();
        let seen = rec.seen.lock().clone();
        assert_eq!(
            seen,
            vec![(ReleasePhase::BeforeLocks, 2), (ReleasePhase::BeforeLocks, 1)]
        );
    }

    #[test]
    fn test_duplicate_registrations_are_independent() {
        let rec = recorder();
        let cb: CallbackRef = rec.clone();
        let mut registry = CallbackRegistry::new();
        registry.register(cb.clone(), CallbackArg(7));
        registry.register(cb.clone(), CallbackArg(7));
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(&cb, CallbackArg(7)));
        assert_eq!(registry.len(), 1);

        registry.invoke_all(ReleasePhase::Locks, true, true).unwrap();
        assert_eq!(rec.seen.lock().len(), 1);
    }

    #[test]
    fn test_unregister_requires_same_callback_and_arg() {
        let cb: CallbackRef = recorder();
        let other: CallbackRef = recorder();
        let mut registry = CallbackRegistry::new();
        registry.register(cb.clone(), CallbackArg(1));

        assert!(!registry.unregister(&cb, CallbackArg(2)));
        assert!(!registry.unregister(&other, CallbackArg(1)));
        assert!(registry.unregister(&cb, CallbackArg(1)));
        assert!(registry.is_empty());
        assert!(!registry.unregister(&cb, CallbackArg(1)));
    }

    #[test]
    fn test_closure_callback_error_stops_invocation() {
        let mut registry = CallbackRegistry::new();
        let failing: CallbackRef = Arc::new(
            |_: ReleasePhase, _: bool, _: bool, _: CallbackArg| -> ResOwnerResult<()> {
                Err(ResourceOwnerError::callback("nope"))
            },
        );
        let rec = recorder();
        registry.register(rec.clone(), CallbackArg(0));
        registry.register(failing, CallbackArg(0));

        let err = registry
            .invoke_all(ReleasePhase::AfterLocks, false, false)
            .unwrap_err();
        assert!(matches!(err, ResourceOwnerError::Callback { .. }));
        assert!(rec.seen.lock().is_empty());
    }
}
