//! The version authority: a single mutex-guarded counter.

use crate::error::{ServerError, ServerResult};
use parking_lot::{Mutex, MutexGuard};
use rostersync_protocol::GlobalVersion;

/// Owns the server-wide [`GlobalVersion`].
///
/// The counter lives behind one mutex. A bump is a read-modify-write under
/// that mutex, so two concurrent bumps never return the same value.
///
/// Writers that must check the version, mutate, and bump as one step take
/// a [`VersionGuard`] with [`VersionAuthority::lock`] and hold it for the
/// whole sequence.
#[derive(Debug)]
pub struct VersionAuthority {
    counter: Mutex<GlobalVersion>,
}

impl VersionAuthority {
    /// Creates an authority starting at [`GlobalVersion::INITIAL`].
    pub fn new() -> Self {
        Self::with_version(GlobalVersion::INITIAL)
    }

    /// Resumes from a persisted version.
    pub fn with_version(version: GlobalVersion) -> Self {
        Self {
            counter: Mutex::new(version),
        }
    }

    /// Returns the current version.
    pub fn current_version(&self) -> GlobalVersion {
        *self.counter.lock()
    }

    /// Atomically increments the counter and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Internal`] if the counter would overflow.
    pub fn bump(&self) -> ServerResult<GlobalVersion> {
        self.lock().bump()
    }

    /// Takes exclusive hold of the counter.
    pub fn lock(&self) -> VersionGuard<'_> {
        VersionGuard {
            counter: self.counter.lock(),
        }
    }
}

impl Default for VersionAuthority {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive hold of the version counter.
///
/// No other bump or read completes until the guard is dropped.
pub struct VersionGuard<'a> {
    counter: MutexGuard<'a, GlobalVersion>,
}

impl VersionGuard<'_> {
    /// Returns the current version.
    pub fn current(&self) -> GlobalVersion {
        *self.counter
    }

    /// Increments the counter and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Internal`] if the counter would overflow.
    pub fn bump(&mut self) -> ServerResult<GlobalVersion> {
        let next = self.peek_next()?;
        *self.counter = next;
        Ok(next)
    }

    /// Returns the version the next bump assigns, leaving the counter as is.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Internal`] if the counter would overflow.
    pub fn peek_next(&self) -> ServerResult<GlobalVersion> {
        self.counter
            .checked_next()
            .ok_or_else(|| ServerError::Internal("global version overflow".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_at_one() {
        let authority = VersionAuthority::new();
        assert_eq!(authority.current_version(), GlobalVersion(1));
        assert_eq!(authority.bump().unwrap(), GlobalVersion(2));
        assert_eq!(authority.current_version(), GlobalVersion(2));
    }

    #[test]
    fn resumes_from_persisted() {
        let authority = VersionAuthority::with_version(GlobalVersion(41));
        assert_eq!(authority.bump().unwrap(), GlobalVersion(42));
    }

    #[test]
    fn overflow_is_error() {
        let authority = VersionAuthority::with_version(GlobalVersion(u64::MAX));
        assert!(matches!(authority.bump(), Err(ServerError::Internal(_))));
        assert_eq!(authority.current_version(), GlobalVersion(u64::MAX));
    }

    #[test]
    fn peek_does_not_advance() {
        let authority = VersionAuthority::with_version(GlobalVersion(5));
        let mut guard = authority.lock();
        assert_eq!(guard.peek_next().unwrap(), GlobalVersion(6));
        assert_eq!(guard.current(), GlobalVersion(5));
        assert_eq!(guard.bump().unwrap(), GlobalVersion(6));
    }

    #[test]
    fn guard_holds_read_and_bump_together() {
        let authority = VersionAuthority::new();
        let mut guard = authority.lock();
        let seen = guard.current();
        let bumped = guard.bump().unwrap();
        assert_eq!(bumped, seen.next());
        drop(guard);
        assert_eq!(authority.current_version(), bumped);
    }

    #[test]
    fn concurrent_bumps_are_unique() {
        let authority = Arc::new(VersionAuthority::new());
        let threads = 8;
        let per_thread = 250;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let authority = Arc::clone(&authority);
                thread::spawn(move || {
                    (0..per_thread)
                        .map(|_| authority.bump().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for v in handle.join().unwrap() {
                assert!(seen.insert(v), "duplicate version {v}");
            }
        }

        let total = (threads * per_thread) as u64;
        assert_eq!(seen.len() as u64, total);
        assert_eq!(authority.current_version(), GlobalVersion(1 + total));
    }

    proptest! {
        #[test]
        fn bumps_are_strictly_increasing(start in 1u64..1_000_000, n in 1usize..64) {
            let authority = VersionAuthority::with_version(GlobalVersion(start));
            let mut last = authority.current_version();
            for _ in 0..n {
                let next = authority.bump().unwrap();
                prop_assert_eq!(next, last.next());
                last = next;
            }
        }
    }
}
