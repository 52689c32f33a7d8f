//! Thread-pooled allocation engine.
//!
//! [`ThreadPooled`] turns an exclusively-owned [`AllocPolicy`] into a
//! [`SharedAlloc`] that any number of threads can call at once. Each thread
//! gets its own instance through a [`Proxy`](crate::proxy::Proxy), so after
//! the first call from a thread, `alloc` and `free` never take a lock. The
//! engine's only shared state is the pool of spare instances left behind by
//! threads that have exited.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::Arc;

use tracing::debug;

use crate::metrics::{PoolMetrics, PoolSnapshot};
use crate::policy::{AllocPolicy, SharedAlloc};
use crate::pool::InstancePool;
use crate::proxy;

/// One engine per allocator type; each thread drives its own instance.
#[derive(Debug)]
pub struct ThreadPooled<P: AllocPolicy> {
    pool: Arc<InstancePool<P>>,
}

impl<P: AllocPolicy> ThreadPooled<P> {
    #[must_use]
    pub fn new() -> Self {
        let pool = Arc::new(InstancePool::new());
        debug!(
            engine = pool.id(),
            policy = std::any::type_name::<P>(),
            "created thread-pooled engine"
        );
        Self { pool }
    }

    /// Process-unique identity of this engine.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.pool.id()
    }

    /// Spare instances waiting in the pool.
    #[must_use]
    pub fn spare_count(&self) -> usize {
        self.pool.len()
    }

    #[must_use]
    pub fn metrics(&self) -> PoolSnapshot {
        self.pool.metrics().snapshot()
    }

    /// Whether the calling thread currently holds an instance of this engine.
    #[must_use]
    pub fn is_bound_here(&self) -> bool {
        proxy::has_local(self.id())
    }

    /// Hands the calling thread's instance back to the pool now instead of
    /// at thread exit. The next call from this thread binds again.
    pub fn release_current_thread(&self) -> bool {
        // Dropping the proxy outside the slot map borrow checks it in.
        proxy::take_local::<P>(self.id()).is_some()
    }

    /// Takes the calling thread's instance out of the engine for good.
    ///
    /// The instance is neither pooled nor counted as checked out afterwards.
    pub fn detach_current_thread(&self) -> Option<P> {
        let mut proxy = proxy::take_local::<P>(self.id())?;
        let policy = proxy.unbind();
        PoolMetrics::inc(&self.pool.metrics().detached);
        debug!(engine = self.id(), "detached allocator instance from engine");
        Some(policy)
    }
}

impl<P: AllocPolicy> Default for ThreadPooled<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: AllocPolicy> SharedAlloc for ThreadPooled<P> {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        proxy::with_local(&self.pool, |proxy| proxy.alloc(size))
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        proxy::with_local(&self.pool, |proxy| {
            // SAFETY: forwarded caller contract.
            unsafe { proxy.free(ptr, size) }
        });
    }

    /// Drops every spare instance. Instances bound to live threads stay
    /// with those threads.
    fn clear(&self) {
        let dropped = self.pool.clear();
        debug!(engine = self.id(), dropped, "cleared spare allocator instances");
    }

    fn pool_metrics(&self) -> Option<PoolSnapshot> {
        Some(self.metrics())
    }
}

impl<P: AllocPolicy> Drop for ThreadPooled<P> {
    fn drop(&mut self) {
        self.clear();
    }
}
