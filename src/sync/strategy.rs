//! Locking disciplines for [`AtomicCache`](crate::sync::atomic::AtomicCache).
//!
//! | Strategy            | Reads            | Mutations                          |
//! |---------------------|------------------|------------------------------------|
//! | [`Exclusive`]       | single lock      | single lock                        |
//! | [`SharedExclusive`] | shared lock      | shared probe, then exclusive lock  |
//!
//! Both strategies are reentrant for the thread that holds the exclusive
//! side: a compute closure or removal listener may call back into the same
//! cache without deadlocking.

use std::cell::RefCell;
use std::fmt;

use parking_lot::{ReentrantMutex, RwLock};

/// A lock discipline that serializes access to a cache.
pub trait LockStrategy: Send + Sync {
    /// Whether mutating operations should probe under the shared lock before
    /// taking the exclusive one.
    const OPTIMISTIC: bool;

    /// Runs `f` with at least shared access.
    fn shared<R>(&self, f: impl FnOnce() -> R) -> R;

    /// Runs `f` with exclusive access.
    fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R;
}

// ---------------------------------------------------------------------------
// Exclusive
// ---------------------------------------------------------------------------

/// One reentrant mutex guards every call.
///
/// User closures run while the mutex is held, so a slow `compute` blocks
/// every other caller.
#[derive(Default)]
pub struct Exclusive {
    lock: ReentrantMutex<()>,
}

impl Exclusive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockStrategy for Exclusive {
    const OPTIMISTIC: bool = false;

    fn shared<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock();
        f()
    }

    fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock();
        f()
    }
}

impl fmt::Debug for Exclusive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exclusive")
            .field("locked", &self.lock.is_locked())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SharedExclusive
// ---------------------------------------------------------------------------

thread_local! {
    /// Addresses of the `SharedExclusive` locks this thread holds exclusively.
    static WRITING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Pops the lock address on scope exit, including unwinds.
struct WritingMark(usize);

impl WritingMark {
    fn enter(id: usize) -> Self {
        WRITING.with(|held| held.borrow_mut().push(id));
        Self(id)
    }
}

impl Drop for WritingMark {
    fn drop(&mut self) {
        WRITING.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&id| id == self.0) {
                held.remove(pos);
            }
        });
    }
}

/// A reader/writer lock with an optimistic probe for mutations.
///
/// Readers run concurrently. A thread that holds the write side may
/// re-enter either side; re-entry runs under the write lock it already holds.
#[derive(Default)]
pub struct SharedExclusive {
    lock: RwLock<()>,
}

impl SharedExclusive {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&self) -> usize {
        &self.lock as *const RwLock<()> as usize
    }

    /// Holds a shared lock outside of any closure, as a foreign reader would.
    #[cfg(test)]
    pub(crate) fn hold_shared(&self) -> parking_lot::RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    fn held_by_current_thread(&self) -> bool {
        let id = self.id();
        WRITING.with(|held| held.borrow().contains(&id))
    }
}

impl LockStrategy for SharedExclusive {
    const OPTIMISTIC: bool = true;

    fn shared<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.held_by_current_thread() {
            return f();
        }
        let _guard = self.lock.read();
        f()
    }

    fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.held_by_current_thread() {
            return f();
        }
        let _guard = self.lock.write();
        let _mark = WritingMark::enter(self.id());
        f()
    }
}

impl fmt::Debug for SharedExclusive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedExclusive")
            .field("locked", &self.lock.is_locked())
            .field("exclusive", &self.lock.is_locked_exclusive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use super::*;

    mod exclusive {
        use super::*;

        #[test]
        fn reenters_from_both_sides() {
            let lock = Exclusive::new();
            let value = lock.exclusive(|| lock.shared(|| lock.exclusive(|| 7)));
            assert_eq!(value, 7);
            assert!(!lock.lock.is_locked());
        }
    }

    mod shared_exclusive {
        use super::*;

        #[test]
        fn writer_reenters_shared_and_exclusive() {
            let lock = SharedExclusive::new();
            let value = lock.exclusive(|| {
                assert!(lock.lock.is_locked_exclusive());
                lock.shared(|| lock.exclusive(|| 3))
            });
            assert_eq!(value, 3);
            assert!(!lock.lock.is_locked());
            assert!(!lock.held_by_current_thread());
        }

        #[test]
        fn mark_is_cleared_after_panic() {
            let lock = SharedExclusive::new();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                lock.exclusive(|| panic!("boom"));
            }));
            assert!(result.is_err());
            assert!(!lock.held_by_current_thread());
            assert!(!lock.lock.is_locked());
        }

        #[test]
        fn readers_run_concurrently() {
            let lock = Arc::new(SharedExclusive::new());
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let lock = Arc::clone(&lock);
                    let barrier = Arc::clone(&barrier);
                    // Both readers must be inside the shared section to pass the barrier.
                    thread::spawn(move || lock.shared(|| barrier.wait()))
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        }

        #[test]
        fn writers_are_mutually_exclusive() {
            let lock = Arc::new(SharedExclusive::new());
            let inside = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let lock = Arc::clone(&lock);
                    let inside = Arc::clone(&inside);
                    thread::spawn(move || {
                        for _ in 0..50 {
                            lock.exclusive(|| {
                                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                                thread::sleep(Duration::from_micros(10));
                                inside.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        }
    }
}
