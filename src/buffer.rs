use crate::backing::Backing;
use std::ptr::NonNull;

/// An owned, resizable byte block obtained from a [`Backing`].
///
/// Empty buffers hold a dangling pointer and never reach the backing.
pub struct Buffer<B: Backing> {
    ptr: NonNull<u8>,
    capacity: usize,
    backing: B,
}

impl<B: Backing> Buffer<B> {
    /// Returns `None` if the backing refuses the block.
    pub fn new(backing: B, capacity: usize) -> Option<Buffer<B>> {
        let ptr = if capacity == 0 {
            NonNull::dangling()
        } else {
            backing.allocate(capacity)?
        };
        Some(Buffer { ptr, capacity, backing })
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Resizes the block, preserving `[0, min(old, new))`.
    ///
    /// On failure nothing changes and `false` is returned. The base address
    /// may differ after a successful call.
    pub fn resize(&mut self, new_capacity: usize) -> bool {
        let resized = match (self.capacity, new_capacity) {
            (0, 0) => Some(NonNull::dangling()),
            (0, new) => self.backing.allocate(new),
            (old, 0) => {
                unsafe { self.backing.release(self.ptr, old) };
                Some(NonNull::dangling())
            }
            (old, new) => unsafe { self.backing.resize(self.ptr, old, new) },
        };
        match resized {
            Some(ptr) => {
                self.ptr = ptr;
                self.capacity = new_capacity;
                true
            }
            None => false,
        }
    }

    #[inline(always)]
    pub fn bytes(&self, start: usize, len: usize) -> &[u8] {
        debug_assert!(start + len <= self.capacity, "bytes: range within buffer");
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(start), len) }
    }

    #[inline(always)]
    pub fn bytes_mut(&mut self, start: usize, len: usize) -> &mut [u8] {
        debug_assert!(start + len <= self.capacity, "bytes_mut: range within buffer");
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(start), len) }
    }
}

impl<B: Backing> Drop for Buffer<B> {
    fn drop(&mut self) {
        if self.capacity > 0 {
            unsafe { self.backing.release(self.ptr, self.capacity) };
        }
    }
}

#[cfg(test)]
mod buffer_tests {
    use super::Buffer;
    use crate::backing::{Relocating, System};

    #[test]
    fn empty_buffer_grows_from_nothing() {
        let mut buffer = Buffer::new(System, 0).expect("empty");
        assert_eq!(0, buffer.capacity());
        assert!(buffer.resize(32));
        assert_eq!(32, buffer.capacity());
        buffer.bytes_mut(0, 32).fill(7);
        assert!(buffer.bytes(0, 32).iter().all(|b| *b == 7));
    }

    #[test]
    fn resize_keeps_prefix() {
        let mut buffer = Buffer::new(Relocating, 4).expect("buffer");
        buffer.bytes_mut(0, 4).copy_from_slice(b"abcd");
        let before = buffer.as_ptr();
        assert!(buffer.resize(64));
        assert_ne!(before, buffer.as_ptr());
        assert_eq!(b"abcd", buffer.bytes(0, 4));
    }

    #[test]
    fn shrink_to_zero_releases() {
        let mut buffer = Buffer::new(System, 16).expect("buffer");
        assert!(buffer.resize(0));
        assert_eq!(0, buffer.capacity());
    }

    #[test]
    fn refused_allocation() {
        assert!(Buffer::new(System, usize::MAX).is_none());
    }
}
