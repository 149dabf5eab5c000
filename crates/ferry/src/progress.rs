//! Progress counters shared between the driver, its workers, and any UI.
//!
//! All fields are atomics: workers publish with stores and adds, observers
//! poll with plain loads at whatever rate they like. Every counter is
//! non-decreasing for the life of a run.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ProgressCounters {
    /// Jobs discovered during enumeration.
    files_enumerated: AtomicU64,
    /// Jobs that reached a terminal state.
    files_processed: AtomicU64,
    /// Jobs that succeeded (including skips of already-present files).
    files_transferred: AtomicU64,
    /// Sum of all source sizes.
    bytes_expected: AtomicU64,
    /// Bytes the server has committed, summed across receivers.
    bytes_acked: AtomicU64,
}

impl ProgressCounters {
    pub fn add_enumerated(&self, n: u64) {
        self.files_enumerated.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_processed(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_transferred(&self) {
        self.files_transferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_expected(&self, bytes: u64) {
        self.bytes_expected.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_acked(&self, bytes: u64) {
        self.bytes_acked.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn files_enumerated(&self) -> u64 {
        self.files_enumerated.load(Ordering::Relaxed)
    }

    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    pub fn files_transferred(&self) -> u64 {
        self.files_transferred.load(Ordering::Relaxed)
    }

    pub fn bytes_expected(&self) -> u64 {
        self.bytes_expected.load(Ordering::Relaxed)
    }

    pub fn bytes_acked(&self) -> u64 {
        self.bytes_acked.load(Ordering::Relaxed)
    }
}

/// Tracks one receiver's monotone byte counter and forwards deltas into the
/// process-wide total, so concurrent jobs never double-count.
#[derive(Debug, Default)]
pub struct AckedTracker {
    last: AtomicU64,
}

impl AckedTracker {
    /// Record a fresh receiver reading; only growth is forwarded, and a
    /// racing pair of readings adds each byte exactly once.
    pub fn update(&self, counters: &ProgressCounters, bytes: u64) {
        let prev = self.last.fetch_max(bytes, Ordering::AcqRel);
        if bytes > prev {
            counters.add_acked(bytes - prev);
        }
    }
}
