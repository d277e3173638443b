//! Addresses of pointer variables that live outside of the arena but point into it.
//!
//! This is the unsafe half of the crate. The arena only ever stores the address of
//! the caller's pointer variable, and writes a new value into that variable when
//! the buffer moves. Nothing here checks that the variable still exists or that
//! its value still points into the buffer; the caller promised both when the slot
//! was registered.
//!
//! Prefer `Region` handles, which never need any of this.

use crate::backing::Backing;
use crate::buffer::Buffer;
use crate::ArenaError;

/// Bytes taken by one slot in the slot storage.
pub const SLOT_SIZE: usize = std::mem::size_of::<*mut *mut u8>();

/// Slot storage lives in a block from the arena's own backing, so growing it
/// can fail the same way growing the arena can.
pub struct RelocationSlots<B: Backing> {
    storage: Buffer<B>,
    len: usize,
}

impl<B: Backing> RelocationSlots<B> {
    /// Reserves room for `capacity` slots up front; `None` if that fails.
    pub fn with_capacity(backing: B, capacity: usize) -> Option<RelocationSlots<B>> {
        let storage = Buffer::new(backing, capacity.checked_mul(SLOT_SIZE)?)?;
        Some(RelocationSlots { storage, len: 0 })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.storage.capacity() / SLOT_SIZE
    }

    #[inline(always)]
    fn slot_array(&self) -> *mut *mut *mut u8 {
        self.storage.as_ptr().cast()
    }

    /// Appends a slot, doubling the slot storage when it is full.
    /// A failed growth leaves the registered slots untouched.
    pub fn push(&mut self, slot: *mut *mut u8) -> Result<(), ArenaError> {
        let capacity = self.capacity();
        if self.len == capacity {
            let grown = match capacity.max(1).checked_mul(2).and_then(|c| c.checked_mul(SLOT_SIZE)) {
                Some(bytes) => self.storage.resize(bytes),
                None => false,
            };
            if !grown {
                warn!("unable to grow relocation slot storage past {} slots", self.len);
                return Err(ArenaError::RegistrationFailed { slots: self.len });
            }
            debug!("expanding relocation slot storage [{} -> {}]", capacity, self.capacity());
        }
        // storage blocks are aligned to `BLOCK_ALIGN`, which covers pointer alignment
        unsafe { self.slot_array().add(self.len).write(slot) };
        self.len += 1;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Moves every registered pointer from the block at `old_base` to the same
    /// position relative to `new_base`, in registration order.
    ///
    /// The written value equals the old value plus `new_base - old_base`
    /// (wrapping), but is derived from `new_base`.
    ///
    /// # Safety
    ///
    /// Every slot must be valid for reads and writes.
    pub unsafe fn rebase(&self, old_base: *const u8, new_base: *mut u8) {
        let old_base = old_base as usize;
        for index in 0..self.len {
            let slot = self.slot_array().add(index).read();
            let old_value = slot.read();
            let new_value = new_base.wrapping_add((old_value as usize).wrapping_sub(old_base));
            slot.write(new_value);
            trace!("rebased slot {} at {:p}: {:p} -> {:p}", index, slot, old_value, new_value);
        }
    }
}

#[cfg(test)]
mod relocation_tests {
    use super::RelocationSlots;
    use crate::backing::System;

    #[test]
    fn storage_doubles_when_full() {
        let mut slots = RelocationSlots::with_capacity(System, 4).expect("slots");
        let mut targets = [std::ptr::null_mut::<u8>(); 5];
        for target in targets.iter_mut() {
            slots.push(target as *mut *mut u8).expect("push");
        }
        assert_eq!(5, slots.len());
        assert_eq!(8, slots.capacity());
    }

    #[test]
    fn clear_forgets_slots_but_keeps_storage() {
        let mut slots = RelocationSlots::with_capacity(System, 2).expect("slots");
        let mut target = std::ptr::null_mut::<u8>();
        slots.push(&mut target).expect("push");
        slots.clear();
        assert_eq!(0, slots.len());
        assert_eq!(2, slots.capacity());
    }

    #[test]
    fn zero_capacity_storage_still_accepts_slots() {
        let mut slots = RelocationSlots::with_capacity(System, 0).expect("slots");
        let mut target = std::ptr::null_mut::<u8>();
        slots.push(&mut target).expect("push");
        assert_eq!(1, slots.len());
    }

    #[test]
    fn rebase_shifts_by_base_delta() {
        let old_block = [0u8; 32];
        let mut new_block = [0u8; 32];
        let old_base = old_block.as_ptr();
        let new_base = new_block.as_mut_ptr();

        let mut first = old_base.wrapping_add(3) as *mut u8;
        let mut second = old_base.wrapping_add(17) as *mut u8;

        let mut slots = RelocationSlots::with_capacity(System, 4).expect("slots");
        slots.push(&mut first).expect("push");
        slots.push(&mut second).expect("push");
        unsafe { slots.rebase(old_base, new_base) };

        assert_eq!(new_base.wrapping_add(3), first);
        assert_eq!(new_base.wrapping_add(17), second);
    }

    #[test]
    fn duplicate_slots_are_rebased_twice() {
        let old_block = [0u8; 8];
        let mut new_block = [0u8; 8];
        let mut ptr = old_block.as_ptr() as *mut u8;

        let mut slots = RelocationSlots::with_capacity(System, 2).expect("slots");
        slots.push(&mut ptr).expect("push");
        slots.push(&mut ptr).expect("push");
        let delta = (new_block.as_ptr() as usize).wrapping_sub(old_block.as_ptr() as usize);
        unsafe { slots.rebase(old_block.as_ptr(), new_block.as_mut_ptr()) };

        let expected = (old_block.as_ptr() as usize).wrapping_add(delta).wrapping_add(delta);
        assert_eq!(expected, ptr as usize);
    }
}
