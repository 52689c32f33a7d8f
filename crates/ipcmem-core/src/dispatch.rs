//! Variable-size dispatcher over fixed-size buckets.
//!
//! [`VariableAlloc`] classifies every request with a [`SizeClassTable`] and
//! forwards it to the bucket serving that class, or to the fallback
//! allocator when the size is above every class. `free` repeats the same
//! classification with the caller's size, so a block always goes back to the
//! bucket it came from.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use tracing::trace;

use crate::config::{BASE_SIZE, CLASSES_SIZE};
use crate::error::EngineError;
use crate::fixed::FixedPool;
use crate::metrics::PoolSnapshot;
use crate::policy::SharedAlloc;
use crate::pooled::ThreadPooled;
use crate::size_class::{SizeClass, SizeClassTable};
use crate::system::SystemAlloc;

/// Handle to one size class's allocator.
pub type Bucket = Box<dyn SharedAlloc>;

macro_rules! fixed_buckets {
    ($($step:literal)*) => {
        vec![$(Box::new(ThreadPooled::<FixedPool<{ $step * BASE_SIZE }>>::new()) as Bucket,)*]
    };
}

const _: () = assert!(CLASSES_SIZE == 32, "default bucket list assumes 32 classes");

/// One thread-pooled `FixedPool` per class; bucket `i` serves
/// `(i + 1) * BASE_SIZE` bytes.
fn default_buckets() -> Box<[Bucket]> {
    fixed_buckets!(
        1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16
        17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32
    )
    .into_boxed_slice()
}

/// Size-class dispatcher.
pub struct VariableAlloc<F: SharedAlloc = SystemAlloc> {
    table: SizeClassTable,
    buckets: Box<[Bucket]>,
    fallback: F,
}

impl VariableAlloc<SystemAlloc> {
    /// Default table, default buckets, system fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fallback(SystemAlloc)
    }
}

impl Default for VariableAlloc<SystemAlloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: SharedAlloc> VariableAlloc<F> {
    /// Default table and buckets with a caller-chosen fallback.
    pub fn with_fallback(fallback: F) -> Self {
        Self {
            table: SizeClassTable::DEFAULT,
            buckets: default_buckets(),
            fallback,
        }
    }

    /// Assembles a dispatcher from explicit parts.
    ///
    /// `buckets[i]` must serve blocks of at least `table.bucket_size(i)`
    /// bytes.
    pub fn with_buckets(
        table: SizeClassTable,
        buckets: Vec<Bucket>,
        fallback: F,
    ) -> Result<Self, EngineError> {
        if buckets.len() != table.classes_size() {
            return Err(EngineError::BucketCountMismatch {
                expected: table.classes_size(),
                actual: buckets.len(),
            });
        }
        Ok(Self {
            table,
            buckets: buckets.into_boxed_slice(),
            fallback,
        })
    }

    #[must_use]
    pub fn table(&self) -> &SizeClassTable {
        &self.table
    }

    #[must_use]
    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    #[must_use]
    pub fn bucket(&self, index: usize) -> Option<&dyn SharedAlloc> {
        self.buckets.get(index).map(|b| &**b)
    }

    /// Where a request of `size` bytes goes.
    #[must_use]
    pub fn route(&self, size: usize) -> SizeClass {
        self.table.classify(size)
    }

    fn choose(&self, size: usize) -> &dyn SharedAlloc {
        match self.route(size) {
            SizeClass::Bucket(index) => &*self.buckets[index],
            SizeClass::Overflow => {
                trace!(size, "routing to fallback allocator");
                &self.fallback
            }
        }
    }
}

impl<F: SharedAlloc> SharedAlloc for VariableAlloc<F> {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        self.choose(size).alloc(size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        // Nothing of size zero was ever handed out.
        if size == 0 {
            return;
        }
        // SAFETY: same size as the matching `alloc`, so the same allocator.
        unsafe { self.choose(size).free(ptr, size) }
    }

    /// Drops the pooled spare state of every bucket and of the fallback.
    fn clear(&self) {
        for bucket in &*self.buckets {
            bucket.clear();
        }
        self.fallback.clear();
    }

    fn pool_metrics(&self) -> Option<PoolSnapshot> {
        self.buckets
            .iter()
            .filter_map(|bucket| bucket.pool_metrics())
            .chain(self.fallback.pool_metrics())
            .reduce(PoolSnapshot::merge)
    }
}

impl<F: SharedAlloc + std::fmt::Debug> std::fmt::Debug for VariableAlloc<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableAlloc")
            .field("table", &self.table)
            .field("buckets", &self.buckets.len())
            .field("fallback", &self.fallback)
            .finish()
    }
}
