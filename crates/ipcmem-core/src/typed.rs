//! Element-typed view over a byte allocator.
//!
//! Lets container code ask for `count` values of `T` instead of raw bytes.
//! A zero count or a count whose byte size cannot be represented is a null
//! result, so those requests never reach the engine.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::NonNull;

use crate::policy::SharedAlloc;

/// Typed allocation handle borrowing a [`SharedAlloc`].
pub struct TypedAlloc<'a, T, A: SharedAlloc + ?Sized> {
    alloc: &'a A,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T, A: SharedAlloc + ?Sized> TypedAlloc<'a, T, A> {
    pub fn new(alloc: &'a A) -> Self {
        Self {
            alloc,
            _marker: PhantomData,
        }
    }

    /// Same backing allocator, different element type.
    pub fn rebind<U>(&self) -> TypedAlloc<'a, U, A> {
        TypedAlloc::new(self.alloc)
    }

    /// Largest element count whose byte size fits in `usize`.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        match size_of::<T>() {
            0 => usize::MAX,
            n => usize::MAX / n,
        }
    }

    /// Room for `count` values of `T`, uninitialized.
    pub fn allocate(&self, count: usize) -> Option<NonNull<T>> {
        if count == 0 || count > self.max_size() {
            return None;
        }
        self.alloc.alloc(count * size_of::<T>()).map(NonNull::cast)
    }

    /// # Safety
    ///
    /// `ptr` must come from `allocate(count)` on a handle over the same
    /// allocator, and must not have been freed since.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) {
        // SAFETY: same byte size as the matching `allocate`.
        unsafe { self.alloc.free(ptr.cast(), count * size_of::<T>()) }
    }
}

impl<T, A: SharedAlloc + ?Sized> Clone for TypedAlloc<'_, T, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, A: SharedAlloc + ?Sized> Copy for TypedAlloc<'_, T, A> {}

/// Handles over the same allocator can free each other's blocks.
impl<T, U, A: SharedAlloc + ?Sized> PartialEq<TypedAlloc<'_, U, A>> for TypedAlloc<'_, T, A> {
    fn eq(&self, other: &TypedAlloc<'_, U, A>) -> bool {
        std::ptr::addr_eq(self.alloc, other.alloc)
    }
}

impl<T, A: SharedAlloc + ?Sized> std::fmt::Debug for TypedAlloc<'_, T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedAlloc")
            .field("element", &std::any::type_name::<T>())
            .field("size", &size_of::<T>())
            .finish()
    }
}
