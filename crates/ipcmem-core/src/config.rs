//! Build-time configuration of the allocation engine.
//!
//! Nothing here is read at run time: the size-class layout and the bucket
//! growth parameters are constants, and changing them means recompiling.

/// Smallest size step of the size-class table (one pointer width).
pub const BASE_SIZE: usize = std::mem::size_of::<usize>();

/// Number of size classes served by fixed-size buckets.
pub const CLASSES_SIZE: usize = 32;

/// Largest request served by a bucket; anything above goes to the fallback.
pub const MAX_BUCKET_SIZE: usize = BASE_SIZE * CLASSES_SIZE;

/// Normalized size step -> bucket index.
///
/// The first four steps get their own bucket. Past that, every pair of
/// adjacent steps shares the larger of the two bucket sizes, so on a 64-bit
/// target requests of 33..=48 bytes are served by the 48-byte bucket,
/// 49..=64 by the 64-byte bucket, and so on up to 256.
pub const DEFAULT_TABLE: [usize; CLASSES_SIZE] = [
    0, 1, 2, 3, // 1 - 8 ~ 32
    5, 5, 7, 7, 9, 9, 11, 11, 13, 13, 15, 15, 17, 17, // 2 - 48 ~ 256
    19, 19, 21, 21, 23, 23, 25, 25, 27, 27, 29, 29, 31, 31,
];

/// Blocks carved by a bucket's first chunk.
pub const CHUNK_INITIAL_BLOCKS: usize = 32;

/// Upper bound on blocks per chunk; growth doubles until this cap.
pub const CHUNK_MAX_BLOCKS: usize = 4096;

/// Alignment used by the fallback allocator and the widest bucket alignment.
pub const MAX_ALIGN: usize = 16;

const _: () = assert!(BASE_SIZE.is_power_of_two());
const _: () = assert!(BASE_SIZE <= MAX_ALIGN);
const _: () = assert!(MAX_ALIGN.is_power_of_two());
const _: () = assert!(CHUNK_INITIAL_BLOCKS <= CHUNK_MAX_BLOCKS);
