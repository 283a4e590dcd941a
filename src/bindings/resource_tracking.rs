// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Lazy allocation of CPU mirrors
//!
//! A managed resource starts without a mirror.  The first CPU access allocates one, and from
//! then on the mirror lives as long as the resource.
//!
//! # Overview
//!
//! The slot holding the mirror is guarded by a reader/writer lock:
//!
//! - The fast path takes the shared lock, sees the mirror is already there, and returns a
//!   clone of its `Arc`.  After the first access this is the only path taken, and readers
//!   never wait on each other.
//! - The slow path drops the shared lock, takes the exclusive lock, and checks again before
//!   creating anything, since another thread may have created the mirror in between.
//!
//! The sync engine also needs the exclusive lock to claim a dirty flag, and it may have to
//! allocate the mirror while it holds it.  [`ExclusiveSlot::ensure`] is the variant for a
//! caller that already holds the exclusive lock; calling [`MirrorSlot::ensure`] there would
//! deadlock.
//!
//! Callers get an `Arc` of the mirror and use it after the lock is released.  The one
//! exception is a pull, which keeps the exclusive lock until the mirror is filled; see
//! [`MirrorSlot::wait_for_writer`].

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

pub(crate) struct MirrorSlot<M> {
    //None until the first CPU access
    slot: RwLock<Option<Arc<M>>>,
}

impl<M> Debug for MirrorSlot<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorSlot")
            .field("allocated", &self.is_allocated())
            .finish()
    }
}

/// Exclusive access to a [`MirrorSlot`].  Dropping it releases the lock.
pub(crate) struct ExclusiveSlot<'a, M> {
    guard: RwLockWriteGuard<'a, Option<Arc<M>>>,
}

impl<M> MirrorSlot<M> {
    pub fn new() -> Self {
        MirrorSlot {
            slot: RwLock::new(None),
        }
    }

    /// The mirror, if allocated.
    pub fn get(&self) -> Option<Arc<M>> {
        //the slot holds no invariant a panicking writer could break, so poisoning is ignored
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_allocated(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /**
    Returns the mirror, allocating it with `create` if needed.

    `create` runs at most once across all threads for a successful allocation, and it runs
    while the exclusive lock is held.  If it fails the slot stays empty and the error is
    returned; a later call tries again.
    */
    pub fn ensure<E>(&self, create: impl FnOnce() -> Result<M, E>) -> Result<Arc<M>, E> {
        if let Some(mirror) = self.get() {
            logwise::trace_sync!("MirrorSlot::ensure fast path");
            return Ok(mirror);
        }
        self.write().ensure(create)
    }

    /**
    Blocks until no one holds the exclusive lock.

    Pulls copy into the mirror while holding the exclusive lock, so a caller that saw the
    pull's flag cleared waits here for the copy to finish.
    */
    pub fn wait_for_writer(&self) {
        drop(self.slot.read().unwrap_or_else(PoisonError::into_inner));
    }

    /// Takes the exclusive lock.
    pub fn write(&self) -> ExclusiveSlot<'_, M> {
        ExclusiveSlot {
            guard: self.slot.write().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

impl<M> ExclusiveSlot<'_, M> {
    pub fn is_allocated(&self) -> bool {
        self.guard.is_some()
    }

    /// Like [`MirrorSlot::ensure`], for a caller that already holds the exclusive lock.
    pub fn ensure<E>(&mut self, create: impl FnOnce() -> Result<M, E>) -> Result<Arc<M>, E> {
        //check again, another thread may have won the race for the exclusive lock
        if let Some(mirror) = self.guard.as_ref() {
            return Ok(mirror.clone());
        }
        let mirror = Arc::new(create()?);
        *self.guard = Some(mirror.clone());
        Ok(mirror)
    }
}

#[cfg(test)]
mod tests {
    use super::MirrorSlot;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn concurrent_first_access_creates_once() {
        const THREADS: usize = 16;
        let slot = MirrorSlot::<usize>::new();
        let creations = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);
        let mirrors: Vec<Arc<usize>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        slot.ensure(|| {
                            Ok::<_, ()>(creations.fetch_add(1, Ordering::SeqCst) + 100)
                        })
                        .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(creations.load(Ordering::SeqCst), 1);
        assert!(mirrors.iter().all(|m| Arc::ptr_eq(m, &mirrors[0])));
        assert_eq!(*mirrors[0], 100);
    }

    #[test]
    fn failed_creation_leaves_slot_empty() {
        let slot = MirrorSlot::<u8>::new();
        assert_eq!(slot.ensure(|| Err::<u8, _>("no memory")), Err("no memory"));
        assert!(!slot.is_allocated());
        assert_eq!(*slot.ensure(|| Ok::<_, &str>(7)).unwrap(), 7);
        assert!(slot.is_allocated());
    }

    #[test]
    fn exclusive_variant_does_not_relock() {
        let slot = MirrorSlot::<u8>::new();
        let mut exclusive = slot.write();
        let first = exclusive.ensure(|| Ok::<_, ()>(1)).unwrap();
        //a second ensure under the same lock returns the existing mirror
        let second = exclusive.ensure(|| Ok::<_, ()>(2)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        drop(exclusive);
        assert_eq!(slot.get().as_deref(), Some(&1));
    }

    #[test]
    fn waiting_reader_sees_the_writers_work() {
        let slot = MirrorSlot::<u8>::new();
        let done = AtomicBool::new(false);
        let held = Barrier::new(2);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let _exclusive = slot.write();
                held.wait();
                std::thread::sleep(Duration::from_millis(20));
                done.store(true, Ordering::SeqCst);
            });
            held.wait();
            slot.wait_for_writer();
            assert!(done.load(Ordering::SeqCst));
        });
    }
}
