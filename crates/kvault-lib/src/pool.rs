//! Bounded admission gate for file operations.
//!
//! `WorkerPool` is a counting semaphore with a completion barrier:
//! - `acquire` blocks until fewer than `capacity` slots are held
//! - dropping the returned [`WorkSlot`] releases it, on success, error or unwind
//! - `wait` blocks until no slot is held
//!
//! The pool knows nothing about the I/O it gates. Archive and restore runs
//! use [`WorkerPool::spawn`] to take a slot in the dispatching thread and
//! hand it to a scoped worker thread, so at most `capacity` workers (and
//! their open files and store transactions) exist at once.
//!
//! # Example
//!
//! ```
//! use kvault_lib::pool::WorkerPool;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let pool = WorkerPool::new(4).unwrap();
//! let done = AtomicUsize::new(0);
//!
//! std::thread::scope(|s| {
//!     for _ in 0..16 {
//!         pool.spawn(s, || {
//!             done.fetch_add(1, Ordering::SeqCst);
//!         });
//!     }
//!     pool.wait();
//! });
//! assert_eq!(done.load(Ordering::SeqCst), 16);
//! ```

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::Scope;

use log::{debug, warn};

use crate::error::SetupError;

/// Default number of concurrently active file operations.
pub const DEFAULT_WORKERS: usize = 20;

/// File descriptors kept back for the store, stdio and the logger.
const FD_RESERVE: u64 = 64;

pub struct WorkerPool {
    capacity: usize,
    /// Number of slots currently held
    active: Mutex<usize>,
    /// Signalled whenever a slot is released
    released: Condvar,
}

/// A held slot. Released when dropped.
#[must_use = "the slot is released as soon as it is dropped"]
pub struct WorkSlot<'a> {
    pool: &'a WorkerPool,
}

impl WorkerPool {
    /// Create a pool admitting at most `capacity` concurrent operations.
    pub fn new(capacity: usize) -> Result<Self, SetupError> {
        if capacity == 0 {
            return Err(SetupError::InvalidWorkers(capacity));
        }
        Ok(Self {
            capacity,
            active: Mutex::new(0),
            released: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        *self.lock()
    }

    /// Block until a slot is free, then take it.
    pub fn acquire(&self) -> WorkSlot<'_> {
        let mut active = self.lock();
        while *active >= self.capacity {
            active = self
                .released
                .wait(active)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *active += 1;
        WorkSlot { pool: self }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<WorkSlot<'_>> {
        let mut active = self.lock();
        if *active >= self.capacity {
            return None;
        }
        *active += 1;
        Some(WorkSlot { pool: self })
    }

    /// Completion barrier: block until every held slot has been released.
    pub fn wait(&self) {
        let mut active = self.lock();
        while *active > 0 {
            active = self
                .released
                .wait(active)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Acquire a slot in the calling thread, then run `task` on a new scoped
    /// thread that holds the slot until `task` returns.
    pub fn spawn<'scope, 'env, F>(&'scope self, scope: &'scope Scope<'scope, 'env>, task: F)
    where
        F: FnOnce() + Send + 'scope,
    {
        let slot = self.acquire();
        scope.spawn(move || {
            let _slot = slot;
            task();
        });
    }

    fn release(&self) {
        let mut active = self.lock();
        *active -= 1;
        drop(active); // Release lock before notify
        // Both blocked acquirers and the barrier wait on the same condvar.
        self.released.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WorkSlot<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Make sure the open-file limit leaves room for `workers` concurrent files.
///
/// Tries to raise the soft `RLIMIT_NOFILE` limit and returns the limit in
/// effect afterwards. On non-Unix platforms this returns `None`.
pub fn fd_headroom(workers: usize) -> Option<u64> {
    #[cfg(unix)]
    {
        let wanted = workers as u64 + FD_RESERVE;
        match rlimit::getrlimit(rlimit::Resource::NOFILE) {
            Ok((soft, _)) if soft >= wanted => Some(soft),
            Ok((soft, _)) => match rlimit::increase_nofile_limit(wanted) {
                Ok(raised) => {
                    debug!("raised open-file limit from {} to {}", soft, raised);
                    Some(raised)
                }
                Err(e) => {
                    warn!("could not raise open-file limit: {}", e);
                    Some(soft)
                }
            },
            Err(e) => {
                warn!("could not read open-file limit: {}", e);
                None
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = workers;
        None
    }
}
