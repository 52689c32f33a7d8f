//! Configuration errors.
//!
//! The allocation path itself never fails with an error: a `None` from
//! `alloc` is the null result. These errors only come out of building a
//! size-class table or a dispatcher from caller-supplied parts.

use thiserror::Error;

/// Errors raised while assembling an engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The base granularity must be a non-zero size step.
    #[error("size-class base size must be non-zero")]
    ZeroBaseSize,
    /// The largest bucket size does not fit in `usize`.
    #[error("{classes} classes of {base_size} bytes overflow the address space")]
    SizeOverflow { base_size: usize, classes: usize },
    /// The class table has no entries.
    #[error("size-class table is empty")]
    EmptyTable,
    /// An entry points past the last bucket.
    #[error("table[{step}] = {bucket} is out of range for {classes} classes")]
    BucketOutOfRange {
        step: usize,
        bucket: usize,
        classes: usize,
    },
    /// An entry maps a step to a smaller bucket than its predecessor.
    #[error("table[{step}] = {bucket} is smaller than the previous entry {previous}")]
    NotMonotonic {
        step: usize,
        bucket: usize,
        previous: usize,
    },
    /// An entry maps a step to a bucket smaller than the step itself.
    #[error("table[{step}] = {bucket} would serve fewer bytes than requested")]
    RoundsDown { step: usize, bucket: usize },
    /// The dispatcher needs exactly one bucket per class.
    #[error("expected {expected} bucket allocators, got {actual}")]
    BucketCountMismatch { expected: usize, actual: usize },
}
