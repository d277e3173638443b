use crate::backing::{Backing, System};
use crate::buffer::Buffer;
use crate::relocation::{RelocationSlots, SLOT_SIZE};
use crate::{ArenaError, Region, RegistryConfig};
use std::fmt;

/// Identity of an arena.
///
/// An id pairs the number of the `Registry` that created the arena with a
/// sequence number within that registry. Registries are numbered process-wide
/// and never reuse sequence numbers, so an id (or a region carrying it) can
/// not alias any other arena, not even one of another registry. Ids say
/// nothing about where the arena sits in the registry table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaId {
    registry: u64,
    sequence: u64,
}

impl ArenaId {
    #[inline(always)]
    pub(crate) fn new(registry: u64, sequence: u64) -> ArenaId {
        ArenaId { registry, sequence }
    }

    /// Number of the registry that created the arena.
    #[inline(always)]
    pub fn registry(&self) -> u64 {
        self.registry
    }

    /// Creation order within the registry; the number shown by `Display`.
    #[inline(always)]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ar_{:03}", self.sequence)
    }
}

/// Smallest power of two strictly greater than `needed`, or `None` on overflow.
#[inline]
pub fn next_capacity(needed: usize) -> Option<usize> {
    1usize.checked_shl(usize::BITS - needed.leading_zeros())
}

/// A single growable buffer with a bump cursor.
///
/// Allocation advances the cursor and returns a [`Region`]. When a request does
/// not fit and `auto_resize` is on, the buffer grows to the next power of two
/// above the bytes needed; the backing may move it while doing so. Regions are
/// offsets and survive the move as they are. Raw pointers into the buffer only
/// survive if their variables were registered with [`Arena::register_slot`].
///
/// Arenas are created and destroyed by a `Registry`. They are not thread safe.
pub struct Arena<B: Backing = System> {
    id: ArenaId,
    buffer: Buffer<B>,
    offset: usize,
    auto_resize: bool,
    slots: RelocationSlots<B>,
}

impl<B: Backing> Arena<B> {
    pub(crate) fn new(id: ArenaId, backing: B, capacity: usize, config: &RegistryConfig) -> Result<Arena<B>, ArenaError>
    where
        B: Clone,
    {
        let buffer = match Buffer::new(backing.clone(), capacity) {
            Some(buffer) => buffer,
            None => {
                warn!("failed to allocate {} bytes for arena '{}'", capacity, id);
                return Err(ArenaError::AllocationFailed { requested: capacity });
            }
        };
        let slot_capacity = config.slot_capacity();
        let slots = match RelocationSlots::with_capacity(backing, slot_capacity) {
            Some(slots) => slots,
            None => {
                let requested = slot_capacity.saturating_mul(SLOT_SIZE);
                warn!("failed to allocate {} bytes for relocation slots of arena '{}'", requested, id);
                return Err(ArenaError::AllocationFailed { requested });
            }
        };
        Ok(Arena {
            id,
            buffer,
            offset: 0,
            auto_resize: config.auto_resize,
            slots,
        })
    }

    #[inline(always)]
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Display name, `ar_000` style.
    pub fn name(&self) -> String {
        self.id.to_string()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Bump cursor: bytes handed out since creation or the last reset.
    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buffer.capacity() - self.offset
    }

    #[inline(always)]
    pub fn auto_resize(&self) -> bool {
        self.auto_resize
    }

    pub fn set_auto_resize(&mut self, auto_resize: bool) {
        debug!("arena '{}': auto_resize = {}", self.id, auto_resize);
        self.auto_resize = auto_resize;
    }

    /// Current base address of the buffer. Changes whenever growth moves it.
    #[inline(always)]
    pub fn as_ptr(&self) -> *const u8 {
        self.buffer.as_ptr()
    }

    #[inline(always)]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.buffer.as_ptr()
    }

    /// Number of registered relocation slots.
    #[inline(always)]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots that fit before the slot storage has to grow.
    #[inline(always)]
    pub fn slot_capacity(&self) -> usize {
        self.slots.capacity()
    }

    fn out_of_memory(&self, requested: usize) -> ArenaError {
        warn!(
            "arena '{}' has insufficient memory: {} bytes requested, {} bytes available",
            self.id, requested, self.remaining()
        );
        ArenaError::OutOfMemory { requested, available: self.remaining() }
    }

    /// Bump-allocates `size` bytes. The bytes are not initialized to anything
    /// in particular; they may hold data of allocations made before a reset.
    pub fn allocate(&mut self, size: usize) -> Result<Region, ArenaError> {
        let end = match self.offset.checked_add(size) {
            Some(end) => end,
            None => return Err(self.out_of_memory(size)),
        };

        if end > self.buffer.capacity() {
            if !self.auto_resize {
                return Err(self.out_of_memory(size));
            }
            let new_capacity = match next_capacity(end) {
                Some(new_capacity) => new_capacity,
                None => return Err(self.out_of_memory(size)),
            };
            if !self.resize(new_capacity) {
                return Err(self.out_of_memory(size));
            }
        }

        let region = Region::new(self.id, self.offset, size);
        self.offset = end;
        trace!(
            "arena '{}': {} bytes allocated at offset {} ({:p})",
            self.id, size, region.offset(), self.buffer.as_ptr().wrapping_add(region.offset())
        );
        Ok(region)
    }

    /// Like [`Arena::allocate`], with the returned bytes set to zero.
    pub fn allocate_zeroed(&mut self, size: usize) -> Result<Region, ArenaError> {
        let region = self.allocate(size)?;
        self.buffer.bytes_mut(region.offset(), region.len()).fill(0);
        Ok(region)
    }

    /// Resizes the buffer to exactly `new_capacity` bytes, keeping its contents.
    ///
    /// Capacities below the current offset are refused. If the buffer moves,
    /// every registered slot is rebased before this returns. On failure the
    /// arena is unchanged.
    pub fn grow(&mut self, new_capacity: usize) -> Result<(), ArenaError> {
        if new_capacity < self.offset || !self.resize(new_capacity) {
            return Err(self.out_of_memory(new_capacity));
        }
        Ok(())
    }

    fn resize(&mut self, new_capacity: usize) -> bool {
        debug!("arena '{}' resizing {} -> {}", self.id, self.buffer.capacity(), new_capacity);
        let old_base = self.buffer.as_ptr();
        if !self.buffer.resize(new_capacity) {
            warn!("arena '{}': unable to resize {} -> {}", self.id, self.buffer.capacity(), new_capacity);
            return false;
        }

        let new_base = self.buffer.as_ptr();
        if new_base != old_base {
            debug!(
                "arena '{}' has shifted: {:p} -> {:p}, rebasing {} slots",
                self.id, old_base, new_base, self.slots.len()
            );
            // slots were registered through `register_slot`, whose contract
            // keeps them readable and writable for as long as the arena grows
            unsafe { self.slots.rebase(old_base, new_base) };
        }
        true
    }

    /// Forgets every allocation. Capacity, contents and slots stay as they are.
    pub fn reset(&mut self) {
        debug!("arena '{}' reset ({} bytes were in use)", self.id, self.offset);
        self.offset = 0;
    }

    /// Registers the pointer variable at `slot` for rebasing.
    ///
    /// Whenever growth moves the buffer, the value stored at `slot` is shifted
    /// by the distance the buffer moved. Registering the same slot twice shifts
    /// it twice. Returns `slot` back on success; on failure no slot is added.
    ///
    /// # Safety
    ///
    /// Until the arena is dropped or [`Arena::clear_slots`] is called, `slot`
    /// must stay valid for reads and writes, and the pointer stored in it must
    /// point into this arena's buffer whenever the buffer may move.
    pub unsafe fn register_slot<T>(&mut self, slot: *mut *mut T) -> Result<*mut *mut T, ArenaError> {
        self.slots.push(slot.cast::<*mut u8>())?;
        trace!(
            "arena '{}': registered slot {} at {:p} (pointing to {:p})",
            self.id, self.slots.len() - 1, slot, slot.read()
        );
        Ok(slot)
    }

    /// Drops every slot registration.
    pub fn clear_slots(&mut self) {
        debug!("arena '{}': clearing {} slots", self.id, self.slots.len());
        self.slots.clear();
    }

    fn check(&self, region: &Region) -> Result<(), ArenaError> {
        if region.arena() != self.id {
            return Err(ArenaError::ForeignRegion { region_arena: region.arena(), arena: self.id });
        }
        if region.end() > self.buffer.capacity() {
            return Err(ArenaError::RegionOutOfBounds {
                offset: region.offset(),
                len: region.len(),
                capacity: self.buffer.capacity(),
            });
        }
        Ok(())
    }

    pub fn bytes(&self, region: &Region) -> Result<&[u8], ArenaError> {
        self.check(region)?;
        Ok(self.buffer.bytes(region.offset(), region.len()))
    }

    pub fn bytes_mut(&mut self, region: &Region) -> Result<&mut [u8], ArenaError> {
        self.check(region)?;
        Ok(self.buffer.bytes_mut(region.offset(), region.len()))
    }

    /// Raw address of the region at this moment. Invalidated by the next move
    /// unless stored in a registered slot.
    pub fn ptr(&mut self, region: &Region) -> Result<*mut u8, ArenaError> {
        self.check(region)?;
        Ok(self.buffer.as_ptr().wrapping_add(region.offset()))
    }
}

impl<B: Backing> fmt::Debug for Arena<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("base", &self.buffer.as_ptr())
            .field("capacity", &self.buffer.capacity())
            .field("offset", &self.offset)
            .field("auto_resize", &self.auto_resize)
            .field("slots", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod arena_tests {
    use super::{next_capacity, Arena, ArenaId};
    use crate::backing::{Relocating, System};
    use crate::{ArenaError, RegistryConfig};
    use proptest::prelude::*;

    fn arena(capacity: usize) -> Arena<System> {
        Arena::new(ArenaId::new(0, 0), System, capacity, &RegistryConfig::default()).expect("arena")
    }

    fn moving_arena(capacity: usize) -> Arena<Relocating> {
        Arena::new(ArenaId::new(0, 0), Relocating, capacity, &RegistryConfig::default()).expect("arena")
    }

    #[test]
    fn id_display_is_zero_padded() {
        assert_eq!("ar_000", ArenaId::new(0, 0).to_string());
        assert_eq!("ar_042", ArenaId::new(0, 42).to_string());
        assert_eq!("ar_1234", ArenaId::new(0, 1234).to_string());
    }

    #[test]
    fn next_capacity_is_strictly_greater_power_of_two() {
        assert_eq!(Some(1), next_capacity(0));
        assert_eq!(Some(2), next_capacity(1));
        assert_eq!(Some(32), next_capacity(16));
        assert_eq!(Some(32), next_capacity(20));
        assert_eq!(Some(64), next_capacity(32));
        assert_eq!(None, next_capacity(usize::MAX));
        assert_eq!(None, next_capacity(1 << (usize::BITS - 1)));
    }

    #[test]
    fn new_arena_is_empty() {
        let arena = arena(64);
        assert_eq!(64, arena.capacity());
        assert_eq!(0, arena.offset());
        assert!(arena.auto_resize());
        assert_eq!(0, arena.slot_count());
        assert_eq!(4, arena.slot_capacity());
    }

    #[test]
    fn allocations_are_consecutive() {
        let mut arena = arena(64);
        let first = arena.allocate(10).unwrap();
        let second = arena.allocate(6).unwrap();
        assert_eq!(0, first.offset());
        assert_eq!(10, second.offset());
        assert_eq!(16, arena.offset());
        assert_eq!(64, arena.capacity());
    }

    #[test]
    fn growth_picks_next_power_of_two_and_keeps_bytes() {
        let mut arena = arena(16);
        let first = arena.allocate(10).unwrap();
        arena.bytes_mut(&first).unwrap().copy_from_slice(b"0123456789");

        let second = arena.allocate(10).unwrap();
        assert_eq!(32, arena.capacity());
        assert_eq!(20, arena.offset());
        assert_eq!(10, second.offset());
        assert_eq!(b"0123456789", arena.bytes(&first).unwrap());
    }

    #[test]
    fn exact_fit_does_not_grow() {
        let mut arena = arena(16);
        arena.allocate(16).unwrap();
        assert_eq!(16, arena.capacity());
    }

    #[test]
    fn no_auto_resize_fails_without_changes() {
        let mut arena = arena(16);
        arena.set_auto_resize(false);
        arena.allocate(10).unwrap();
        assert_eq!(
            Err(ArenaError::OutOfMemory { requested: 10, available: 6 }),
            arena.allocate(10)
        );
        assert_eq!(10, arena.offset());
        assert_eq!(16, arena.capacity());
    }

    #[test]
    fn overflowing_request_is_out_of_memory() {
        let mut arena = arena(16);
        arena.allocate(1).unwrap();
        assert!(matches!(arena.allocate(usize::MAX), Err(ArenaError::OutOfMemory { .. })));
        assert_eq!(1, arena.offset());
    }

    #[test]
    fn zeroed_allocation_clears_old_bytes() {
        let mut arena = arena(8);
        let dirty = arena.allocate(8).unwrap();
        arena.bytes_mut(&dirty).unwrap().fill(0xAB);
        arena.reset();
        let clean = arena.allocate_zeroed(8).unwrap();
        assert!(arena.bytes(&clean).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn reset_keeps_capacity_and_rewinds() {
        let mut arena = arena(8);
        let first = arena.allocate(4).unwrap();
        arena.allocate(20).unwrap();
        let capacity = arena.capacity();
        arena.reset();
        assert_eq!(capacity, arena.capacity());
        assert_eq!(0, arena.offset());
        assert_eq!(first, arena.allocate(4).unwrap());
    }

    #[test]
    fn grow_below_offset_is_refused() {
        let mut arena = arena(32);
        arena.allocate(20).unwrap();
        assert!(matches!(arena.grow(10), Err(ArenaError::OutOfMemory { .. })));
        assert_eq!(32, arena.capacity());
        arena.grow(20).unwrap();
        assert_eq!(20, arena.capacity());
    }

    #[test]
    fn empty_arena_grows_on_first_allocation() {
        let mut arena = arena(0);
        let region = arena.allocate(3).unwrap();
        assert_eq!(4, arena.capacity());
        assert_eq!(0, region.offset());
    }

    #[test]
    fn registered_slot_follows_moved_buffer() {
        let mut arena = moving_arena(16);
        let region = arena.allocate(10).unwrap();
        arena.bytes_mut(&region).unwrap().copy_from_slice(b"abcdefghij");

        let mut ptr = arena.ptr(&region).unwrap().wrapping_add(4);
        unsafe { arena.register_slot(&mut ptr as *mut *mut u8).unwrap() };

        let old_base = arena.as_ptr() as usize;
        arena.allocate(10).unwrap();
        let new_base = arena.as_ptr() as usize;

        assert_ne!(old_base, new_base);
        assert_eq!(new_base + 4, ptr as usize);
        assert_eq!(b'e', unsafe { ptr.read() });
    }

    #[test]
    fn typed_slot_is_rebased() {
        let mut arena = moving_arena(8);
        let region = arena.allocate_zeroed(8).unwrap();
        let mut value = arena.ptr(&region).unwrap() as *mut u64;
        unsafe {
            value.write_unaligned(7);
            arena.register_slot(&mut value as *mut *mut u64).unwrap();
        }
        arena.grow(64).unwrap();
        assert_eq!(arena.as_ptr() as usize, value as usize);
        assert_eq!(7, unsafe { value.read_unaligned() });
    }

    #[test]
    fn cleared_slots_are_left_alone() {
        let mut arena = moving_arena(8);
        let region = arena.allocate(1).unwrap();
        let mut ptr = arena.ptr(&region).unwrap();
        let before = ptr;
        unsafe { arena.register_slot(&mut ptr as *mut *mut u8).unwrap() };
        arena.clear_slots();
        arena.grow(16).unwrap();
        assert_eq!(before, ptr);
        assert_eq!(0, arena.slot_count());
    }

    #[test]
    fn foreign_region_is_rejected() {
        let mut first = arena(8);
        let second = Arena::new(ArenaId::new(0, 1), System, 8, &RegistryConfig::default()).unwrap();
        let region = first.allocate(4).unwrap();
        assert_eq!(
            Err(ArenaError::ForeignRegion { region_arena: ArenaId::new(0, 0), arena: ArenaId::new(0, 1) }),
            second.bytes(&region).map(|_| ())
        );
    }

    #[test]
    fn region_beyond_shrunk_buffer_is_rejected() {
        let mut arena = arena(32);
        let region = arena.allocate(20).unwrap();
        arena.reset();
        arena.grow(8).unwrap();
        assert_eq!(
            Err(ArenaError::RegionOutOfBounds { offset: 0, len: 20, capacity: 8 }),
            arena.bytes(&region).map(|_| ())
        );
    }

    proptest! {
        #[test]
        fn next_capacity_matches_bit_length(needed in 1usize..(1 << 40)) {
            let capacity = next_capacity(needed).unwrap();
            prop_assert!(capacity.is_power_of_two());
            prop_assert!(capacity > needed);
            prop_assert!(capacity / 2 <= needed);
        }

        #[test]
        fn allocations_never_overlap(sizes in proptest::collection::vec(0usize..64, 1..32), initial in 0usize..64) {
            let mut arena = arena(initial);
            let mut expected_offset = 0;
            let mut regions = Vec::new();
            for size in sizes {
                let region = arena.allocate(size).unwrap();
                prop_assert_eq!(expected_offset, region.offset());
                expected_offset += size;
                regions.push(region);
            }
            prop_assert_eq!(expected_offset, arena.offset());
            prop_assert!(arena.offset() <= arena.capacity());
            for pair in regions.windows(2) {
                prop_assert!(pair[0].end() <= pair[1].offset());
            }
        }
    }
}
