//! Delayed FIFO order queue.
//!
//! A min-heap of (ready_at, sequence) pairs rather than per-order ad hoc
//! timers: requeues with a delay are just pushes with a later ready
//! time, and readiness is decided against an explicit clock so tests
//! stay deterministic. Same-instant orders drain in insertion order.

use chrono::{DateTime, Duration, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Mutex;
use tokio::sync::Notify;

use crate::types::BetOrder;

struct QueuedOrder {
    ready_at: DateTime<Utc>,
    seq: u64,
    order: BetOrder,
}

impl PartialEq for QueuedOrder {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl Eq for QueuedOrder {}

impl PartialOrd for QueuedOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ready_at
            .cmp(&other.ready_at)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Reverse<QueuedOrder>>,
    next_seq: u64,
}

/// Shared between the ingestion path (push) and the worker (pop).
pub struct OrderQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for OrderQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue an order, ready immediately.
    pub fn push(&self, order: BetOrder) {
        self.push_delayed(order, Duration::zero());
    }

    /// Enqueue an order that becomes ready only after `delay`.
    pub fn push_delayed(&self, order: BetOrder, delay: Duration) {
        {
            let mut inner = self.inner.lock().unwrap();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(Reverse(QueuedOrder {
                ready_at: Utc::now() + delay,
                seq,
                order,
            }));
        }
        self.notify.notify_waiters();
    }

    /// Pop the oldest order whose ready time has passed, if any.
    pub fn pop_ready(&self, now: DateTime<Utc>) -> Option<BetOrder> {
        let mut inner = self.inner.lock().unwrap();
        let head_ready = inner
            .heap
            .peek()
            .is_some_and(|Reverse(head)| head.ready_at <= now);
        if head_ready {
            inner.heap.pop().map(|Reverse(q)| q.order)
        } else {
            None
        }
    }

    /// Earliest ready time of any pending order.
    pub fn next_ready_at(&self) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().unwrap();
        inner.heap.peek().map(|Reverse(q)| q.ready_at)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every pending order without executing anything.
    /// Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let drained = inner.heap.len();
        inner.heap.clear();
        drained
    }

    /// Wait until something is pushed. Used by the worker to avoid
    /// polling a quiet queue.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }

    /// Wake any parked worker, e.g. on shutdown.
    pub fn wake(&self) {
        self.notify.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
