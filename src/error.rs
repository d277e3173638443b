use crate::ArenaId;
use std::fmt::{self, Display};

/// Errors returned by registry and arena operations.
///
/// Every failing operation leaves the registry, the arena and its relocation
/// slots exactly as they were before the call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The registry already holds its maximum number of live arenas.
    RegistryFull {
        /// Configured maximum.
        max: usize,
    },
    /// The backing storage (or the registry table) refused to allocate.
    AllocationFailed {
        /// Number of bytes requested from the backing storage.
        requested: usize,
    },
    /// An allocation or resize request can not be satisfied, either because
    /// automatic resizing is off or because growing the buffer failed.
    OutOfMemory {
        /// Number of bytes requested.
        requested: usize,
        /// Bytes still free in the arena at the time of the request.
        available: usize,
    },
    /// The arena is not live in this registry (never created, destroyed or swept).
    NotFound {
        /// The arena that was looked up.
        id: ArenaId,
    },
    /// The relocation slot storage could not be grown.
    RegistrationFailed {
        /// Number of slots registered at the time of the failure.
        slots: usize,
    },
    /// A region handle was resolved against an arena that did not issue it.
    ForeignRegion {
        /// Arena that issued the region.
        region_arena: ArenaId,
        /// Arena it was resolved against.
        arena: ArenaId,
    },
    /// A region no longer fits in the arena buffer (the buffer was shrunk).
    RegionOutOfBounds {
        /// Region start.
        offset: usize,
        /// Region length.
        len: usize,
        /// Current arena capacity.
        capacity: usize,
    },
}

impl Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaError::RegistryFull { max } => write!(f, "arena limit reached ({} arenas)", max),
            ArenaError::AllocationFailed { requested } => write!(f, "failed to allocate {} bytes", requested),
            ArenaError::OutOfMemory { requested, available } => write!(
                f,
                "arena has insufficient memory: {} bytes requested, {} bytes available",
                requested, available
            ),
            ArenaError::NotFound { id } => write!(f, "arena {} not found or already freed", id),
            ArenaError::RegistrationFailed { slots } => {
                write!(f, "unable to grow relocation slot storage past {} slots", slots)
            }
            ArenaError::ForeignRegion { region_arena, arena } => {
                write!(f, "region of arena {} resolved against arena {}", region_arena, arena)
            }
            ArenaError::RegionOutOfBounds { offset, len, capacity } => write!(
                f,
                "region {}..{} exceeds arena capacity {}",
                offset,
                offset + len,
                capacity
            ),
        }
    }
}

impl std::error::Error for ArenaError {}
