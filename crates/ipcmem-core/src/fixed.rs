//! Fixed-size block allocator used as the per-class bucket instance.
//!
//! Blocks of exactly `BLOCK` bytes are carved from chunks obtained from the
//! system allocator and recycled through an intrusive free list: a free
//! block stores the pointer to the next free block in its first word.
//! Chunk size doubles on every refill up to [`CHUNK_MAX_BLOCKS`].
//!
//! A block can outlive the instance that carved it: a caller may still hold
//! it, or a free from another thread may have put it on another instance's
//! free list. `clear` therefore only returns chunks whose every block is back
//! on this instance's free list. Any other chunk stays allocated, and an
//! instance dropped while holding such chunks leaves them allocated for good.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::mem::size_of;
use std::ptr::NonNull;

use tracing::debug;

use crate::config::{CHUNK_INITIAL_BLOCKS, CHUNK_MAX_BLOCKS, MAX_ALIGN};
use crate::policy::AllocPolicy;

#[repr(C)]
struct FreeBlock {
    next: Option<NonNull<FreeBlock>>,
}

#[derive(Debug)]
struct Chunk {
    base: NonNull<u8>,
    layout: Layout,
}

impl Chunk {
    fn contains(&self, block: NonNull<u8>) -> bool {
        let start = self.base.as_ptr() as usize;
        let addr = block.as_ptr() as usize;
        addr >= start && addr - start < self.layout.size()
    }
}

/// Free-list allocator for one block size.
#[derive(Debug)]
pub struct FixedPool<const BLOCK: usize> {
    free: Option<NonNull<FreeBlock>>,
    chunks: Vec<Chunk>,
    next_chunk_blocks: usize,
    /// Blocks on the free list.
    available: usize,
}

// SAFETY: the pool exclusively owns its chunks and free list; nothing in it
// is tied to the thread that created it.
unsafe impl<const BLOCK: usize> Send for FixedPool<BLOCK> {}

impl<const BLOCK: usize> FixedPool<BLOCK> {
    const VALID: () = assert!(
        BLOCK >= size_of::<FreeBlock>() && BLOCK % size_of::<usize>() == 0,
        "block size must be a non-zero multiple of the pointer width"
    );

    /// Largest power-of-two divisor of `BLOCK`, capped at [`MAX_ALIGN`].
    pub const ALIGN: usize = {
        let align = BLOCK & BLOCK.wrapping_neg();
        if align > MAX_ALIGN { MAX_ALIGN } else { align }
    };

    #[must_use]
    pub fn new() -> Self {
        let () = Self::VALID;
        Self {
            free: None,
            chunks: Vec::new(),
            next_chunk_blocks: CHUNK_INITIAL_BLOCKS,
            available: 0,
        }
    }

    /// Bytes served per block.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        BLOCK
    }

    /// Blocks currently on the free list.
    #[must_use]
    pub fn available(&self) -> usize {
        self.available
    }

    /// Total blocks carved from all chunks.
    #[must_use]
    pub fn carved(&self) -> usize {
        self.chunks.iter().map(|c| c.layout.size() / BLOCK).sum()
    }

    /// Number of chunks requested from the system allocator.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn refill(&mut self) -> Option<()> {
        let blocks = self.next_chunk_blocks;
        let layout = Layout::from_size_align(BLOCK.checked_mul(blocks)?, Self::ALIGN).ok()?;
        // SAFETY: layout has non-zero size (BLOCK > 0, blocks > 0).
        let base = NonNull::new(unsafe { std::alloc::alloc(layout) })?;

        for i in (0..blocks).rev() {
            // SAFETY: i * BLOCK + BLOCK <= layout.size(); every block start is
            // ALIGN-aligned because BLOCK is a multiple of ALIGN.
            unsafe { self.push(base.add(i * BLOCK)) };
        }
        self.chunks.push(Chunk { base, layout });
        self.next_chunk_blocks = (blocks * 2).min(CHUNK_MAX_BLOCKS);
        Some(())
    }

    /// # Safety
    ///
    /// `block` must point to `BLOCK` writable bytes aligned for `FreeBlock`
    /// that nobody else is using.
    unsafe fn push(&mut self, block: NonNull<u8>) {
        let block = block.cast::<FreeBlock>();
        // SAFETY: guaranteed by the caller.
        unsafe { block.write(FreeBlock { next: self.free }) };
        self.free = Some(block);
        self.available += 1;
    }

    fn pop(&mut self) -> Option<NonNull<u8>> {
        let block = self.free?;
        // SAFETY: every block on the free list was written by `push` and is
        // still backed by a live chunk.
        self.free = unsafe { block.read().next };
        self.available -= 1;
        Some(block.cast())
    }

    /// Empties the free list, head first.
    fn drain_free(&mut self) -> Vec<NonNull<u8>> {
        let mut blocks = Vec::with_capacity(self.available);
        while let Some(block) = self.pop() {
            blocks.push(block);
        }
        blocks
    }

    fn chunk_of(&self, block: NonNull<u8>) -> Option<usize> {
        self.chunks.iter().position(|chunk| chunk.contains(block))
    }
}

impl<const BLOCK: usize> Default for FixedPool<BLOCK> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BLOCK: usize> AllocPolicy for FixedPool<BLOCK> {
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 || size > BLOCK {
            return None;
        }
        if self.free.is_none() {
            self.refill()?;
        }
        self.pop()
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, _size: usize) {
        // SAFETY: the caller hands back a block carved by a pool of this
        // block size, so it spans BLOCK bytes and is aligned.
        unsafe { self.push(ptr) };
    }

    /// Returns every chunk whose blocks are all on this free list to the
    /// system allocator. Chunks with a block in use, or parked on another
    /// instance's free list, are kept.
    fn clear(&mut self) {
        let blocks = self.drain_free();
        let mut free_per_chunk = vec![0usize; self.chunks.len()];
        let owners: Vec<Option<usize>> = blocks.iter().map(|&b| self.chunk_of(b)).collect();
        for index in owners.iter().flatten() {
            free_per_chunk[*index] += 1;
        }
        let release: Vec<bool> = self
            .chunks
            .iter()
            .zip(&free_per_chunk)
            .map(|(chunk, &free)| free == chunk.layout.size() / BLOCK)
            .collect();

        // Keep foreign blocks and blocks of retained chunks, in their old order.
        for (&block, owner) in blocks.iter().zip(&owners).rev() {
            if owner.is_some_and(|index| release[index]) {
                continue;
            }
            // SAFETY: the block was on this free list a moment ago and its
            // chunk stays allocated.
            unsafe { self.push(block) };
        }

        let chunks = std::mem::take(&mut self.chunks);
        for (chunk, release) in chunks.into_iter().zip(release) {
            if release {
                // SAFETY: allocated in `refill` with exactly this layout, and
                // none of its blocks is reachable any more.
                unsafe { std::alloc::dealloc(chunk.base.as_ptr(), chunk.layout) };
            } else {
                self.chunks.push(chunk);
            }
        }
        if self.chunks.is_empty() {
            self.next_chunk_blocks = CHUNK_INITIAL_BLOCKS;
        } else {
            debug!(
                block = BLOCK,
                retained = self.chunks.len(),
                "kept chunks with blocks still in use"
            );
        }
    }
}

impl<const BLOCK: usize> Drop for FixedPool<BLOCK> {
    fn drop(&mut self) {
        // Chunks `clear` keeps are left allocated; `Chunk` has no destructor.
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn rejects_zero_and_oversized_requests() {
        let mut pool = FixedPool::<32>::new();
        assert!(pool.alloc(0).is_none());
        assert!(pool.alloc(33).is_none());
        assert_eq!(pool.chunk_count(), 0);
    }

    #[test]
    fn first_alloc_carves_a_chunk() {
        let mut pool = FixedPool::<64>::new();
        let p = pool.alloc(40).unwrap();
        assert_eq!(pool.chunk_count(), 1);
        assert_eq!(pool.carved(), CHUNK_INITIAL_BLOCKS);
        assert_eq!(pool.available(), CHUNK_INITIAL_BLOCKS - 1);
        assert_eq!(p.as_ptr() as usize % FixedPool::<64>::ALIGN, 0);
        unsafe { pool.free(p, 40) };
        assert_eq!(pool.available(), CHUNK_INITIAL_BLOCKS);
    }

    #[test]
    fn freed_block_is_reused_first() {
        let mut pool = FixedPool::<16>::new();
        let a = pool.alloc(16).unwrap();
        let _b = pool.alloc(16).unwrap();
        unsafe { pool.free(a, 16) };
        assert_eq!(pool.alloc(10), Some(a));
    }

    #[test]
    fn blocks_are_distinct_and_writable() {
        let mut pool = FixedPool::<24>::new();
        let mut seen = HashSet::new();
        let mut blocks = Vec::new();
        for i in 0..(CHUNK_INITIAL_BLOCKS * 3) {
            let p = pool.alloc(24).unwrap();
            unsafe { p.as_ptr().write_bytes(i as u8, 24) };
            assert!(seen.insert(p.as_ptr() as usize));
            blocks.push(p);
        }
        // 32 + 64 blocks.
        assert_eq!(pool.chunk_count(), 2);
        for p in blocks {
            unsafe { pool.free(p, 24) };
        }
        assert_eq!(pool.available(), pool.carved());
    }

    #[test]
    fn chunk_growth_is_capped() {
        let mut pool = FixedPool::<8>::new();
        for _ in 0..16 {
            pool.refill().unwrap();
        }
        assert_eq!(pool.next_chunk_blocks, CHUNK_MAX_BLOCKS);
    }

    #[test]
    fn clear_releases_everything() {
        let mut pool = FixedPool::<128>::new();
        let p = pool.alloc(100).unwrap();
        unsafe { pool.free(p, 100) };
        pool.clear();
        assert_eq!(pool.chunk_count(), 0);
        assert_eq!(pool.available(), 0);
        assert!(pool.alloc(100).is_some());
    }

    #[test]
    fn clear_keeps_a_chunk_with_a_live_block() {
        let mut pool = FixedPool::<32>::new();
        let held = pool.alloc(32).unwrap();
        unsafe { held.as_ptr().write_bytes(0x7C, 32) };

        pool.clear();
        assert_eq!(pool.chunk_count(), 1);
        assert_eq!(pool.available(), CHUNK_INITIAL_BLOCKS - 1);
        assert_eq!(unsafe { held.as_ptr().add(31).read() }, 0x7C);

        unsafe { pool.free(held, 32) };
        pool.clear();
        assert_eq!(pool.chunk_count(), 0);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn clear_keeps_a_chunk_whose_block_moved_to_another_instance() {
        let mut owner = FixedPool::<32>::new();
        let mut other = FixedPool::<32>::new();
        let moved = owner.alloc(32).unwrap();
        unsafe { other.free(moved, 32) };

        // The owner sees one block missing; the other sees a foreign block.
        owner.clear();
        assert_eq!(owner.chunk_count(), 1);
        other.clear();
        assert_eq!(other.chunk_count(), 0);
        assert_eq!(other.available(), 1);

        let reused = other.alloc(32).unwrap();
        assert_eq!(reused, moved);
        unsafe { reused.as_ptr().write_bytes(0x3D, 32) };
        unsafe { owner.free(reused, 32) };
        owner.clear();
        assert_eq!(owner.chunk_count(), 0);
    }

    #[test]
    fn alignment_follows_block_size() {
        assert_eq!(FixedPool::<8>::ALIGN, 8);
        assert_eq!(FixedPool::<24>::ALIGN, 8);
        assert_eq!(FixedPool::<48>::ALIGN, 16);
        assert_eq!(FixedPool::<256>::ALIGN, 16);
    }
}
