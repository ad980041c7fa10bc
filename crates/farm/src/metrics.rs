use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters shared by the farm, its dispatch loop, and its workers.
#[derive(Debug, Default)]
pub struct FarmMetrics {
    next_seq: AtomicU64,
    submitted: AtomicU64,
    completed: AtomicU64,
    interrupted: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`FarmMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Jobs accepted by the dispatch loop.
    pub submitted: u64,
    /// Jobs whose response was written to the result slot.
    pub completed: u64,
    /// Jobs closed without a value (forced shutdown or a panicking `work`).
    pub interrupted: u64,
    /// When the current (or last) run started.
    pub started_at: Option<DateTime<Utc>>,
}

impl FarmMetrics {
    /// Hand out the next job sequence number, starting at 1.
    pub(crate) fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a job the dispatch loop has accepted.
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_interrupted(&self, count: u64) {
        self.interrupted.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_start(&self) {
        if let Ok(mut started) = self.started_at.lock() {
            *started = Some(Utc::now());
        }
    }

    /// Zero every counter.
    pub(crate) fn reset(&self) {
        self.next_seq.store(0, Ordering::Relaxed);
        self.submitted.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.interrupted.store(0, Ordering::Relaxed);
        if let Ok(mut started) = self.started_at.lock() {
            *started = None;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            started_at: self.started_at.lock().ok().and_then(|s| *s),
        }
    }
}

impl MetricsSnapshot {
    /// Jobs accepted but neither completed nor interrupted yet.
    pub fn in_flight(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed)
            .saturating_sub(self.interrupted)
    }
}
