//! Atomic counters for instance-pool observability.
//!
//! All counters use relaxed ordering; they are diagnostic, not
//! synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Per-engine pool counters.
#[derive(Debug)]
pub struct PoolMetrics {
    /// Times the pool lock was taken.
    pub lock_acquisitions: AtomicU64,
    /// Proxies that adopted a spare instance from the pool.
    pub reused: AtomicU64,
    /// Proxies that started from a freshly constructed instance.
    pub fresh: AtomicU64,
    /// Instances handed back to the pool.
    pub checkins: AtomicU64,
    /// Spare instances dropped by `clear`.
    pub cleared: AtomicU64,
    /// Instances taken out of the engine entirely.
    pub detached: AtomicU64,
}

impl PoolMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lock_acquisitions: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            fresh: AtomicU64::new(0),
            checkins: AtomicU64::new(0),
            cleared: AtomicU64::new(0),
            detached: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment a counter by `n`.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            lock_acquisitions: Self::get(&self.lock_acquisitions),
            reused: Self::get(&self.reused),
            fresh: Self::get(&self.fresh),
            checkins: Self::get(&self.checkins),
            cleared: Self::get(&self.cleared),
            detached: Self::get(&self.detached),
        }
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`PoolMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub lock_acquisitions: u64,
    pub reused: u64,
    pub fresh: u64,
    pub checkins: u64,
    pub cleared: u64,
    pub detached: u64,
}

impl PoolSnapshot {
    /// Instances currently bound to a live proxy, derived from the counters.
    ///
    /// Every instance enters circulation through `reused` or `fresh` and
    /// leaves it through a check-in or a detach.
    #[must_use]
    pub fn checked_out(&self) -> u64 {
        (self.reused + self.fresh).saturating_sub(self.checkins + self.detached)
    }

    /// Field-wise sum, used to aggregate the buckets of a dispatcher.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            lock_acquisitions: self.lock_acquisitions + other.lock_acquisitions,
            reused: self.reused + other.reused,
            fresh: self.fresh + other.fresh,
            checkins: self.checkins + other.checkins,
            cleared: self.cleared + other.cleared,
            detached: self.detached + other.detached,
        }
    }
}
