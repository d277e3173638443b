use crate::ArenaId;
use std::fmt;

/// A byte range handed out by an arena.
///
/// The region is stored as an offset from the start of the arena buffer, so it
/// stays correct when the buffer grows and moves. Resolve it with
/// [`Arena::bytes`](crate::Arena::bytes), [`Arena::bytes_mut`](crate::Arena::bytes_mut)
/// or [`Arena::ptr`](crate::Arena::ptr).
///
/// A region does not keep its arena alive. After `reset` it still resolves,
/// but the bytes may already belong to a newer allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    arena: ArenaId,
    offset: usize,
    len: usize,
}

impl Region {
    pub(crate) fn new(arena: ArenaId, offset: usize, len: usize) -> Region {
        Region { arena, offset, len }
    }

    /// The arena that issued this region.
    #[inline(always)]
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    /// Byte offset from the start of the arena buffer.
    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset one past the last byte.
    #[inline(always)]
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Sub-range `start..start + len` of this region, if it fits.
    pub fn slice(&self, start: usize, len: usize) -> Option<Region> {
        let end = start.checked_add(len)?;
        if end > self.len {
            None
        } else {
            Some(Region::new(self.arena, self.offset + start, len))
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{}]", self.arena, self.offset, self.end())
    }
}
