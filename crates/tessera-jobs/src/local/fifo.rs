//! In-memory FIFO queue with blocking pop.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Thread-safe first-in-first-out queue over opaque byte strings.
///
/// One mutex guards the buffer; a condition variable wakes blocked
/// consumers on push.
#[derive(Debug, Default)]
pub struct LocalQueue {
    inner: Mutex<VecDeque<Vec<u8>>>,
    not_empty: Condvar,
}

impl LocalQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item to the tail.
    pub fn push(&self, item: Vec<u8>) {
        self.inner.lock().push_back(item);
        self.not_empty.notify_one();
    }

    /// Removes and returns the head item.
    ///
    /// With `block`, suspends up to `timeout` (indefinitely when `None`)
    /// until an item arrives; returns `None` on expiry. Without `block`,
    /// returns `None` immediately when empty.
    pub fn pop(&self, block: bool, timeout: Option<Duration>) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();

        if let Some(item) = inner.pop_front() {
            return Some(item);
        }
        if !block {
            return None;
        }

        match timeout {
            Some(duration) => {
                let deadline = Instant::now() + duration;
                while inner.is_empty() {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let _ = self.not_empty.wait_for(&mut inner, deadline - now);
                }
                inner.pop_front()
            }
            None => {
                while inner.is_empty() {
                    self.not_empty.wait(&mut inner);
                }
                inner.pop_front()
            }
        }
    }

    /// Number of queued items.
    pub fn qsize(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true when no items are queued.
    pub fn empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Removes all items, returning how many were removed.
    pub fn clean(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.len();
        inner.clear();
        count
    }
}
