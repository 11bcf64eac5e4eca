//! Bounded hand-off queue between the store scan and the restore writers.
//!
//! This module provides a thread-safe FIFO with:
//! - `VecDeque` storage
//! - `Condvar` notification in both directions (wake-on-push, wake-on-pop)
//! - Hard capacity: `push` blocks while the queue is full
//! - Close semantics: consumers drain what is left, then see `None`
//!
//! # Example
//!
//! ```
//! use kvault_lib::engine::HandoffQueue;
//!
//! let queue = HandoffQueue::with_capacity(2);
//! std::thread::scope(|s| {
//!     s.spawn(|| {
//!         for i in 0..5 {
//!             queue.push(i).unwrap();
//!         }
//!         queue.close();
//!     });
//!
//!     let mut received = Vec::new();
//!     while let Some(i) = queue.pop() {
//!         received.push(i);
//!     }
//!     assert_eq!(received, vec![0, 1, 2, 3, 4]);
//! });
//! ```

use log::debug;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Default queue capacity
pub const DEFAULT_CAPACITY: usize = 64;

pub struct HandoffQueue<T> {
    inner: Mutex<QueueInner<T>>,
    /// Signalled when an item is pushed or the queue is closed
    not_empty: Condvar,
    /// Signalled when an item is popped or the queue is closed
    not_full: Condvar,
}

struct QueueInner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

/// Closes the queue when dropped, so consumers are released even if the
/// producer unwinds.
pub struct CloseOnDrop<'a, T> {
    queue: &'a HandoffQueue<T>,
}

impl<T> HandoffQueue<T> {
    /// Create a new queue with default capacity (64).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new queue holding at most `capacity` items (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                queue: VecDeque::with_capacity(capacity.min(1000)),
                capacity,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Push an item, blocking while the queue is full.
    ///
    /// Returns `Err(item)` if the queue has been closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut inner = self.lock();
        while inner.queue.len() >= inner.capacity && !inner.closed {
            inner = self
                .not_full
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if inner.closed {
            return Err(item);
        }
        inner.queue.push_back(item);
        debug!("HandoffQueue::push: queue_len={}", inner.queue.len());
        drop(inner); // Release lock before notify
        self.not_empty.notify_one();
        Ok(())
    }

    /// Push an item without blocking.
    ///
    /// Returns `Err(item)` if the queue is full or closed.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut inner = self.lock();
        if inner.closed || inner.queue.len() >= inner.capacity {
            return Err(item);
        }
        inner.queue.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop an item, blocking until one is available.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.queue.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .not_empty
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Pop an item without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.lock().queue.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Stop accepting items and wake every waiter.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Guard that calls [`close`](Self::close) when dropped.
    pub fn close_on_drop(&self) -> CloseOnDrop<'_, T> {
        CloseOnDrop { queue: self }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for CloseOnDrop<'_, T> {
    fn drop(&mut self) {
        self.queue.close();
    }
}
