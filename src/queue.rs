//! Thread-safe record queue with blocking pop and cooperative stop.
//!
//! Every stage boundary in the pipeline is one of these queues: each tailing
//! reader pushes into its own local queue, and the merger pushes into a
//! single global queue consumed by the median calculator. The queue owns its
//! records; a popped record belongs to the consumer.
//!
//! # Semantics
//!
//! - Strict FIFO for a single producer; consumers observe pushes with a
//!   happens-before edge (the mutex).
//! - [`RecordQueue::stop`] is one-shot: it wakes every waiter, makes
//!   [`RecordQueue::wait_and_pop`] return `None` once drained, and turns
//!   further pushes into silent drops.
//! - [`RecordQueue::total_count`] counts lifetime successful pushes and is
//!   monotonically non-decreasing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::types::Record;

#[derive(Default)]
struct Inner {
    items: VecDeque<Record>,
    stopped: bool,
}

/// FIFO of owned records shared between one producer stage and one consumer
/// stage.
pub struct RecordQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    total_count: AtomicU64,
}

impl RecordQueue {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            available: Condvar::new(),
            total_count: AtomicU64::new(0),
        }
    }

    /// Append a record at the tail and wake one waiter.
    ///
    /// Returns `false` (dropping the record) if the queue has been stopped.
    pub fn push(&self, record: Record) -> bool {
        let mut inner = self.inner.lock();
        if inner.stopped {
            return false;
        }
        inner.items.push_back(record);
        self.total_count.fetch_add(1, Ordering::Relaxed);
        drop(inner);

        self.available.notify_one();
        true
    }

    /// Block until a record is available or the queue is stopped and drained.
    ///
    /// Returns `None` only after `stop()` once every queued record has been
    /// consumed, so no record pushed before the stop is ever lost.
    pub fn wait_and_pop(&self) -> Option<Record> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(record) = inner.items.pop_front() {
                return Some(record);
            }
            if inner.stopped {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Pop the head without blocking.
    pub fn try_pop(&self) -> Option<Record> {
        self.inner.lock().items.pop_front()
    }

    /// Timestamp of the head record, if any.
    ///
    /// Used by the merger to pick the queue with the minimum timestamp
    /// without committing to a pop.
    pub fn peek_ts(&self) -> Option<i64> {
        self.inner.lock().items.front().map(|r| r.receive_ts)
    }

    /// Whether the queue currently holds no records.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether `stop()` has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    /// Lifetime count of successful pushes.
    pub fn total_count(&self) -> u64 {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Stop the queue and wake all waiters.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        drop(inner);

        self.available.notify_all();
    }
}

impl Default for RecordQueue {
    fn default() -> Self {
        Self::new()
    }
}
