// src/hook/patcher.rs
//! Consumed patching primitives
//!
//! `Patcher` is the symbol-resolution and rerouting service the engine is
//! built against. Replacements and originals cross this boundary type-erased;
//! `hook::binding` restores the concrete handler types.

use crate::utils::errors::Result;
use std::any::Any;

/// Resolved address of a symbolic target
pub type Address = u64;

/// Type-erased handler crossing the patcher boundary
pub type RoutedHandler = Box<dyn Any + Send + Sync>;

/// Minimum distance, in bytes, between two replacement sites before both may
/// be installed. Two co-located targets closer than this get only the
/// higher-priority replacement, to avoid corrupting adjacent instruction
/// bytes. Evaluated unconditionally at every startup.
pub const MIN_ROUTE_DISTANCE: u64 = 32;

/// Symbol resolution and hook installation (consumed boundary)
pub trait Patcher: Send + Sync {
    /// Resolve a symbolic name to an address, or None if unknown
    fn solve_symbol(&self, symbol: &str) -> Option<Address>;

    /// Install `replacement` over the target at `address` and return the
    /// original implementation. `wants_trampoline` requests that the original
    /// remain callable through the returned handle.
    fn route_function(
        &self,
        address: Address,
        replacement: RoutedHandler,
        wants_trampoline: bool,
    ) -> Result<RoutedHandler>;

    /// Distance in bytes between two resolved targets
    fn distance(&self, a: Address, b: Address) -> u64 {
        a.abs_diff(b)
    }
}

/// Scoped writable-memory permission over a protected region.
///
/// `open`/`close` are the raw host operations; use `WritePermit` so the
/// permission is released unconditionally, even on versions where the
/// operation is a no-op.
pub trait MemoryGuard: Send + Sync {
    fn open(&self);
    fn close(&self);
}

/// RAII permit over a `MemoryGuard`
pub struct WritePermit<'a> {
    guard: &'a dyn MemoryGuard,
}

impl<'a> WritePermit<'a> {
    pub fn acquire(guard: &'a dyn MemoryGuard) -> Self {
        guard.open();
        Self { guard }
    }
}

impl Drop for WritePermit<'_> {
    fn drop(&mut self) {
        self.guard.close();
    }
}

/// Guard for regions that are always writable
pub struct NoopGuard;

impl MemoryGuard for NoopGuard {
    fn open(&self) {}
    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingGuard {
        opened: AtomicU32,
        closed: AtomicU32,
    }

    impl MemoryGuard for CountingGuard {
        fn open(&self) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }
        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let guard = CountingGuard::default();
        {
            let _permit = WritePermit::acquire(&guard);
            assert_eq!(guard.opened.load(Ordering::SeqCst), 1);
            assert_eq!(guard.closed.load(Ordering::SeqCst), 0);
        }
        assert_eq!(guard.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_permit_releases_on_early_exit() {
        let guard = CountingGuard::default();
        let attempt = || -> std::result::Result<(), ()> {
            let _permit = WritePermit::acquire(&guard);
            Err(())
        };
        assert!(attempt().is_err());
        assert_eq!(guard.opened.load(Ordering::SeqCst), 1);
        assert_eq!(guard.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_distance() {
        struct NullPatcher;
        impl Patcher for NullPatcher {
            fn solve_symbol(&self, _: &str) -> Option<Address> {
                None
            }
            fn route_function(
                &self,
                _: Address,
                replacement: RoutedHandler,
                _: bool,
            ) -> crate::utils::errors::Result<RoutedHandler> {
                Ok(replacement)
            }
        }
        let p = NullPatcher;
        assert_eq!(p.distance(0x1000, 0x1040), 0x40);
        assert_eq!(p.distance(0x1040, 0x1000), 0x40);
    }
}
