//! Allocation contracts shared by every allocator in the engine.
//!
//! [`AllocPolicy`] is an allocator *instance*: it is driven by exactly one
//! thread at a time through `&mut self`, and moves between a thread's proxy
//! and the instance pool. [`SharedAlloc`] is what callers see: a thread-safe
//! handle with `&self` receivers that buckets, the fallback and the dispatcher
//! all expose.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::metrics::PoolSnapshot;

/// Exclusively-owned allocator state.
///
/// `Default` is the fresh (cold) state a new thread starts from when the
/// pool has no spare instance.
pub trait AllocPolicy: Default + Send + 'static {
    /// Allocates `size` bytes. `None` is the null result.
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Returns a block to this allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `alloc` on an instance of the same type with the
    /// same `size`, and must not have been freed since.
    unsafe fn free(&mut self, ptr: NonNull<u8>, size: usize);

    /// Releases whatever backing memory the instance holds.
    fn clear(&mut self);

    /// Exchanges internal state with `other`.
    fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }
}

/// Thread-safe allocation handle.
pub trait SharedAlloc: Send + Sync {
    /// Allocates `size` bytes. `None` is the null result.
    fn alloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Returns a block.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `alloc` on this handle with the same `size`, and
    /// must not have been freed since.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize);

    /// Drops pooled spare state.
    fn clear(&self);

    /// Aggregated instance-pool counters, for allocators that pool.
    fn pool_metrics(&self) -> Option<PoolSnapshot> {
        None
    }
}

impl<A: SharedAlloc + ?Sized> SharedAlloc for Box<A> {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).alloc(size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).free(ptr, size) }
    }

    fn clear(&self) {
        (**self).clear();
    }

    fn pool_metrics(&self) -> Option<PoolSnapshot> {
        (**self).pool_metrics()
    }
}

impl<A: SharedAlloc + ?Sized> SharedAlloc for std::sync::Arc<A> {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).alloc(size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).free(ptr, size) }
    }

    fn clear(&self) {
        (**self).clear();
    }

    fn pool_metrics(&self) -> Option<PoolSnapshot> {
        (**self).pool_metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        allocs: usize,
    }

    impl AllocPolicy for Counter {
        fn alloc(&mut self, _size: usize) -> Option<NonNull<u8>> {
            self.allocs += 1;
            None
        }

        unsafe fn free(&mut self, _ptr: NonNull<u8>, _size: usize) {}

        fn clear(&mut self) {
            self.allocs = 0;
        }
    }

    #[test]
    fn default_swap_exchanges_state() {
        let mut a = Counter::default();
        let mut b = Counter::default();
        a.alloc(8);
        a.alloc(8);
        b.alloc(8);

        a.swap(&mut b);
        assert_eq!(a.allocs, 1);
        assert_eq!(b.allocs, 2);
    }
}
