//! Shared pool of spare allocator instances.
//!
//! A thread that goes away hands its instance back here, and the next thread
//! to bind to the same engine adopts it instead of warming up a cold one.
//! The lock only ever covers a single push, pop or swap of the backing
//! vector; spare instances are torn down after the guard is released.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::metrics::PoolMetrics;
use crate::policy::AllocPolicy;

/// Engine ids are never reused, so a stale thread-local slot can never be
/// mistaken for a slot of a newer engine.
static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Lock-protected LIFO collection of spare instances.
#[derive(Debug)]
pub struct InstancePool<P> {
    id: u64,
    spares: Mutex<Vec<P>>,
    metrics: PoolMetrics,
}

impl<P: AllocPolicy> InstancePool<P> {
    /// Create an empty pool with a fresh engine id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            spares: Mutex::new(Vec::new()),
            metrics: PoolMetrics::new(),
        }
    }

    /// Identity of the engine owning this pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the most recently checked-in instance.
    ///
    /// `None` is the normal cold-start outcome: the caller constructs a
    /// default instance itself.
    pub fn checkout(&self) -> Option<P> {
        self.lock().pop()
    }

    /// Returns an instance to the pool. The pool has no capacity bound.
    pub fn checkin(&self, instance: P) {
        self.lock().push(instance);
        PoolMetrics::inc(&self.metrics.checkins);
    }

    /// Drops every spare instance and returns how many were dropped.
    ///
    /// Instances currently bound to a thread are not affected.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        let count = drained.len();
        for mut spare in drained {
            spare.clear();
        }
        PoolMetrics::add(&self.metrics.cleared, count as u64);
        count
    }

    /// Number of spare instances waiting for a thread.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    fn lock(&self) -> MutexGuard<'_, Vec<P>> {
        PoolMetrics::inc(&self.metrics.lock_acquisitions);
        self.spares.lock()
    }
}

impl<P: AllocPolicy> Default for InstancePool<P> {
    fn default() -> Self {
        Self::new()
    }
}
