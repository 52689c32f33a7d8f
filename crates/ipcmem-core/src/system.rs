//! Fallback allocator for requests above every bucket class.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::config::MAX_ALIGN;
use crate::policy::{AllocPolicy, SharedAlloc};

/// Stateless forwarder to the global allocator, 16-byte aligned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemAlloc;

impl SystemAlloc {
    fn layout(size: usize) -> Option<Layout> {
        if size == 0 {
            return None;
        }
        Layout::from_size_align(size, MAX_ALIGN).ok()
    }
}

impl SharedAlloc for SystemAlloc {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        let layout = Self::layout(size)?;
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        let Some(layout) = Self::layout(size) else {
            return;
        };
        // SAFETY: the caller passes the size used for `alloc`, which rebuilds
        // the same layout.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }

    fn clear(&self) {}
}

impl AllocPolicy for SystemAlloc {
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        SharedAlloc::alloc(&*self, size)
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { SharedAlloc::free(&*self, ptr, size) }
    }

    fn clear(&mut self) {}
}
