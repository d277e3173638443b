//! Raw storage behind arena buffers.
//!
//! An arena never talks to the allocator directly. It asks its [`Backing`] for
//! a block, to resize that block, and finally to release it. Swapping the
//! backing changes where bytes come from and whether a resize may move them.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment of every block handed out by the provided backings.
pub const BLOCK_ALIGN: usize = 16;

#[inline(always)]
fn block_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size, BLOCK_ALIGN).ok()
}

/// Source of raw byte blocks for arena buffers.
///
/// Sizes passed to these functions are never zero; the arena keeps empty
/// buffers without touching the backing.
///
/// # Safety
///
/// `allocate` and `resize` must return blocks of at least the requested size,
/// valid for reads and writes until passed to `resize` or `release`. A
/// successful `resize` must preserve the first `min(old_size, new_size)` bytes.
/// A failed `resize` (`None`) must leave the original block untouched.
pub unsafe trait Backing {
    /// Allocate a new block of `size` bytes. Contents are unspecified.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Resize the block at `ptr` from `old_size` to `new_size` bytes.
    ///
    /// The returned block may live at a different address.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this backing for a block of `old_size` bytes.
    unsafe fn resize(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>>;

    /// Return the block to the backing.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this backing for a block of `size` bytes,
    /// and must not be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, size: usize);
}

/// The global allocator. Resizes use `realloc` and move only when it has to.
#[derive(Clone, Copy, Debug, Default)]
pub struct System;

unsafe impl Backing for System {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let layout = block_layout(size)?;
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>> {
        let layout = block_layout(old_size)?;
        block_layout(new_size)?;
        NonNull::new(alloc::realloc(ptr.as_ptr(), layout, new_size))
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        if let Some(layout) = block_layout(size) {
            alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}

/// A backing whose resize always moves the block to a fresh address.
///
/// Each resize allocates the new block before releasing the old one, so the
/// two addresses can never coincide. Useful to exercise pointer rebasing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Relocating;

unsafe impl Backing for Relocating {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        System.allocate(size)
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>> {
        let new_ptr = System.allocate(new_size)?;
        std::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_size.min(new_size));
        System.release(ptr, old_size);
        Some(new_ptr)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        System.release(ptr, size)
    }
}
