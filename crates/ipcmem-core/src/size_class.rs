//! Size-class table: requested byte size -> bucket index.
//!
//! A request of `size` bytes is normalized to the step
//! `(size - 1) / base_size` and the table maps that step to the bucket that
//! serves it. Steps past the end of the table overflow to the fallback
//! allocator. Bucket `i` serves blocks of `(i + 1) * base_size` bytes.
//!
//! The table groups adjacent steps into one bucket, trading a little
//! internal waste for fewer distinct bucket allocators.

use crate::config::{BASE_SIZE, DEFAULT_TABLE};
use crate::error::EngineError;

/// Routing decision for one request size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeClass {
    /// Served by the bucket at this index.
    Bucket(usize),
    /// No bucket fits; use the fallback.
    Overflow,
}

impl SizeClass {
    #[must_use]
    pub const fn bucket(self) -> Option<usize> {
        match self {
            Self::Bucket(index) => Some(index),
            Self::Overflow => None,
        }
    }

    #[must_use]
    pub const fn is_overflow(self) -> bool {
        matches!(self, Self::Overflow)
    }
}

/// Immutable step -> bucket mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClassTable {
    base_size: usize,
    table: &'static [usize],
}

impl SizeClassTable {
    /// The build-time default: pointer-width steps, 32 classes.
    pub const DEFAULT: Self = Self::new(BASE_SIZE, &DEFAULT_TABLE);

    /// Builds a table, panicking at compile time when used in a `const`.
    ///
    /// # Panics
    ///
    /// Panics if the table fails any check listed on [`Self::try_new`].
    #[must_use]
    pub const fn new(base_size: usize, table: &'static [usize]) -> Self {
        match Self::validate(base_size, table) {
            Ok(()) => Self { base_size, table },
            Err(_) => panic!("invalid size-class table"),
        }
    }

    /// Builds a table after checking that it is non-empty, monotonic, never
    /// maps a step to a smaller bucket than itself, stays within range, and
    /// that its largest bucket size is representable.
    pub const fn try_new(base_size: usize, table: &'static [usize]) -> Result<Self, EngineError> {
        match Self::validate(base_size, table) {
            Ok(()) => Ok(Self { base_size, table }),
            Err(err) => Err(err),
        }
    }

    const fn validate(base_size: usize, table: &[usize]) -> Result<(), EngineError> {
        if base_size == 0 {
            return Err(EngineError::ZeroBaseSize);
        }
        if table.is_empty() {
            return Err(EngineError::EmptyTable);
        }
        let classes = table.len();
        if base_size.checked_mul(classes).is_none() {
            return Err(EngineError::SizeOverflow {
                base_size,
                classes,
            });
        }
        let mut step = 0;
        while step < classes {
            let bucket = table[step];
            if bucket >= classes {
                return Err(EngineError::BucketOutOfRange {
                    step,
                    bucket,
                    classes,
                });
            }
            if bucket < step {
                return Err(EngineError::RoundsDown { step, bucket });
            }
            if step > 0 && bucket < table[step - 1] {
                return Err(EngineError::NotMonotonic {
                    step,
                    bucket,
                    previous: table[step - 1],
                });
            }
            step += 1;
        }
        Ok(())
    }

    #[must_use]
    pub const fn base_size(&self) -> usize {
        self.base_size
    }

    /// Number of classes; also the numeric value of the overflow sentinel.
    #[must_use]
    pub const fn classes_size(&self) -> usize {
        self.table.len()
    }

    /// Largest size served by a bucket.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.base_size * self.table.len()
    }

    /// Block size of bucket `index`.
    #[must_use]
    pub const fn bucket_size(&self, index: usize) -> usize {
        (index + 1) * self.base_size
    }

    /// Classifies `size`. Zero never reaches a bucket.
    #[must_use]
    pub const fn classify(&self, size: usize) -> SizeClass {
        let Some(last) = size.checked_sub(1) else {
            return SizeClass::Overflow;
        };
        let step = last / self.base_size;
        if step < self.table.len() {
            SizeClass::Bucket(self.table[step])
        } else {
            SizeClass::Overflow
        }
    }

    /// Raw form of [`Self::classify`]: overflow is `classes_size()`.
    #[must_use]
    pub const fn classify_index(&self, size: usize) -> usize {
        match self.classify(size) {
            SizeClass::Bucket(index) => index,
            SizeClass::Overflow => self.table.len(),
        }
    }

    /// Bytes actually reserved for a request of `size`, if a bucket serves it.
    #[must_use]
    pub const fn rounded_size(&self, size: usize) -> Option<usize> {
        match self.classify(size) {
            SizeClass::Bucket(index) => Some(self.bucket_size(index)),
            SizeClass::Overflow => None,
        }
    }

    /// Indices referenced by at least one step, in ascending order.
    pub fn used_buckets(&self) -> impl Iterator<Item = usize> + '_ {
        self.table
            .iter()
            .enumerate()
            .filter(|&(step, &bucket)| step == 0 || self.table[step - 1] != bucket)
            .map(|(_, &bucket)| bucket)
    }
}

impl Default for SizeClassTable {
    fn default() -> Self {
        Self::DEFAULT
    }
}
