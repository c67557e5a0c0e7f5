//! Operation counters for a guarded heap.
//!
//! Relaxed atomics: the numbers are observability, not synchronization. This
//! is not leak tracking; nothing records which blocks are live.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by every [`GuardedAllocator`](crate::GuardedAllocator).
#[derive(Debug)]
pub struct GuardStats {
    /// `allocate` calls.
    pub allocations: AtomicU64,
    /// `allocate_zeroed` calls.
    pub zeroed_allocations: AtomicU64,
    /// `reallocate` calls that completed.
    pub reallocations: AtomicU64,
    /// `free` calls on non-null pointers.
    pub frees: AtomicU64,
    /// Blocks that passed marker validation.
    pub checks_passed: AtomicU64,
    /// Sum of payload sizes currently handed out.
    pub live_bytes: AtomicU64,
}

/// Point-in-time copy of [`GuardStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardStatsSnapshot {
    pub allocations: u64,
    pub zeroed_allocations: u64,
    pub reallocations: u64,
    pub frees: u64,
    pub checks_passed: u64,
    pub live_bytes: u64,
}

impl GuardStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            zeroed_allocations: AtomicU64::new(0),
            reallocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            checks_passed: AtomicU64::new(0),
            live_bytes: AtomicU64::new(0),
        }
    }

    pub(crate) fn on_allocate(&self, size: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn on_allocate_zeroed(&self, size: usize) {
        self.zeroed_allocations.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn on_reallocate(&self, old_size: usize, new_size: usize) {
        self.reallocations.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(new_size as u64, Ordering::Relaxed);
        self.live_bytes.fetch_sub(old_size as u64, Ordering::Relaxed);
    }

    pub(crate) fn on_free(&self, size: usize) {
        self.frees.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn on_check_passed(&self) {
        self.checks_passed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> GuardStatsSnapshot {
        GuardStatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            zeroed_allocations: self.zeroed_allocations.load(Ordering::Relaxed),
            reallocations: self.reallocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            checks_passed: self.checks_passed.load(Ordering::Relaxed),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
        }
    }
}

impl Default for GuardStats {
    fn default() -> Self {
        Self::new()
    }
}
