//! Alert deduplication.
//!
//! Filters the alert stream to first-seen-only on the composite
//! (event id, line type) key, drops alerts for matches that already
//! kicked off, and keeps memory bounded by evicting the oldest keys
//! once a capacity cap is exceeded. Exact LRU is not required, only
//! boundedness.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tracing::debug;

use crate::types::{Alert, LineType};

type DedupKey = (String, LineType);

/// What to do with an incoming alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// First sighting; process it.
    Pass,
    /// Same (event, line type) already handled.
    Duplicate,
    /// Match started beyond the safety buffer.
    Stale,
}

pub struct AlertDeduplicator {
    capacity: usize,
    stale_after: Duration,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    seen: HashSet<DedupKey>,
    /// Insertion order of `seen` keys, oldest at the front.
    order: VecDeque<DedupKey>,
}

impl AlertDeduplicator {
    pub fn new(capacity: usize, stale_after: Duration) -> Self {
        Self {
            capacity,
            stale_after,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Decide an alert's fate and record its key when it passes.
    /// Shared across the ingestion and dispatch paths; safe to call
    /// concurrently.
    pub fn process(&self, alert: &Alert) -> DedupDecision {
        self.process_at(alert, Utc::now())
    }

    /// Same as `process` with an explicit clock, for deterministic tests.
    pub fn process_at(&self, alert: &Alert, now: DateTime<Utc>) -> DedupDecision {
        let key = (alert.event_id.clone(), alert.line_type);
        let mut inner = self.inner.lock().unwrap();

        if inner.seen.contains(&key) {
            debug!(event_id = %alert.event_id, line_type = %alert.line_type, "Duplicate alert dropped");
            return DedupDecision::Duplicate;
        }

        if alert.starts <= now - self.stale_after {
            debug!(event_id = %alert.event_id, starts = %alert.starts, "Stale alert dropped");
            return DedupDecision::Stale;
        }

        inner.seen.insert(key.clone());
        inner.order.push_back(key);

        while inner.seen.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            } else {
                break;
            }
        }

        DedupDecision::Pass
    }

    /// Number of keys currently remembered.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
