use std::sync::atomic::{AtomicU64, Ordering};

use crate::backing::{Backing, System};
use crate::{Arena, ArenaError, ArenaId, Region, RegistryConfig};

/// Owner of a bounded set of live arenas.
///
/// A registry creates arenas, hands out their [`ArenaId`]s and destroys them
/// again. Everything still alive when the registry is dropped is destroyed by
/// the same sweep that [`Registry::shutdown_sweep`] runs, so a registry that
/// lives for the whole program releases every arena at normal exit.
///
/// Arenas are kept in a table without stable positions: destroying one moves
/// the last arena into the freed place. Always refer to arenas by id.
///
/// ```
/// use regrow::Registry;
///
/// let mut registry = Registry::new();
/// let id = registry.create(16).unwrap();
/// let region = registry.allocate(id, 10).unwrap();
/// registry.arena_mut(id).unwrap().bytes_mut(&region).unwrap().copy_from_slice(b"0123456789");
///
/// registry.allocate(id, 10).unwrap();
/// assert_eq!(32, registry.arena(id).unwrap().capacity());
///
/// registry.destroy(id).unwrap();
/// assert!(registry.destroy(id).is_err());
/// ```
/// Source of per-registry nonces, so ids from two registries never compare equal.
static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(0);

pub struct Registry<B: Backing + Clone = System> {
    nonce: u64,
    table: Vec<Arena<B>>,
    config: RegistryConfig,
    backing: B,
    next_id: u64,
}

impl Registry<System> {
    /// Registry with default limits, backed by the global allocator.
    pub fn new() -> Registry<System> {
        Registry::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Registry<System> {
        Registry::with_backing(config, System)
    }
}

impl Default for Registry<System> {
    fn default() -> Self {
        Registry::new()
    }
}

impl<B: Backing + Clone> Registry<B> {
    /// Registry whose arenas get their storage from `backing`.
    pub fn with_backing(config: RegistryConfig, backing: B) -> Registry<B> {
        let nonce = NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed);
        debug!("registry #{} created (max {} arenas)", nonce, config.max_arenas);
        Registry {
            nonce,
            table: Vec::new(),
            config,
            backing,
            next_id: 0,
        }
    }

    #[inline(always)]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    #[inline(always)]
    pub fn max_arenas(&self) -> usize {
        self.config.max_arenas
    }

    /// Number of live arenas.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn contains(&self, id: ArenaId) -> bool {
        self.position(id).is_some()
    }

    /// Ids of the live arenas, in table order.
    pub fn ids(&self) -> impl Iterator<Item = ArenaId> + '_ {
        self.table.iter().map(|arena| arena.id())
    }

    fn position(&self, id: ArenaId) -> Option<usize> {
        self.table.iter().position(|arena| arena.id() == id)
    }

    fn not_found(&self, id: ArenaId) -> ArenaError {
        warn!("arena '{}' not found or already freed", id);
        ArenaError::NotFound { id }
    }

    /// Creates an arena with a buffer of exactly `capacity` bytes.
    ///
    /// Fails with `RegistryFull` when the table is at its limit, and with
    /// `AllocationFailed` when the table or the buffer can not be allocated.
    /// A failed call changes nothing, including the next id to be assigned.
    pub fn create(&mut self, capacity: usize) -> Result<ArenaId, ArenaError> {
        if self.table.len() >= self.config.max_arenas {
            warn!("arena limit reached ({} arenas)", self.config.max_arenas);
            return Err(ArenaError::RegistryFull { max: self.config.max_arenas });
        }
        if self.table.try_reserve(1).is_err() {
            let requested = std::mem::size_of::<Arena<B>>();
            warn!("failed to allocate {} bytes for arena metadata", requested);
            return Err(ArenaError::AllocationFailed { requested });
        }

        let id = ArenaId::new(self.nonce, self.next_id);
        let arena = Arena::new(id, self.backing.clone(), capacity, &self.config)?;
        debug!("created arena '{}' ({} bytes) at {:p}", id, capacity, arena.as_ptr());
        self.next_id += 1;
        self.table.push(arena);
        Ok(id)
    }

    /// Releases the arena and its buffer.
    pub fn destroy(&mut self, id: ArenaId) -> Result<(), ArenaError> {
        let index = self.position(id).ok_or_else(|| self.not_found(id))?;
        let arena = self.table.swap_remove(index);
        debug!("freeing arena '{}' ({} bytes)", id, arena.capacity());
        drop(arena);
        Ok(())
    }

    /// Destroys every live arena and returns how many there were.
    ///
    /// Calling it again (or dropping the registry afterwards) does nothing.
    pub fn shutdown_sweep(&mut self) -> usize {
        let count = self.table.len();
        for arena in self.table.drain(..) {
            debug!("sweep: freeing arena '{}' ({} bytes)", arena.id(), arena.capacity());
            drop(arena);
        }
        if count > 0 {
            debug!("sweep released {} arenas", count);
        }
        count
    }

    pub fn arena(&self, id: ArenaId) -> Result<&Arena<B>, ArenaError> {
        match self.position(id) {
            Some(index) => Ok(&self.table[index]),
            None => Err(self.not_found(id)),
        }
    }

    pub fn arena_mut(&mut self, id: ArenaId) -> Result<&mut Arena<B>, ArenaError> {
        match self.position(id) {
            Some(index) => Ok(&mut self.table[index]),
            None => Err(self.not_found(id)),
        }
    }

    /// [`Arena::allocate`] on the arena with this id.
    pub fn allocate(&mut self, id: ArenaId, size: usize) -> Result<Region, ArenaError> {
        self.arena_mut(id)?.allocate(size)
    }

    /// [`Arena::allocate_zeroed`] on the arena with this id.
    pub fn allocate_zeroed(&mut self, id: ArenaId, size: usize) -> Result<Region, ArenaError> {
        self.arena_mut(id)?.allocate_zeroed(size)
    }

    /// [`Arena::reset`] on the arena with this id.
    pub fn reset(&mut self, id: ArenaId) -> Result<(), ArenaError> {
        self.arena_mut(id)?.reset();
        Ok(())
    }
}

impl<B: Backing + Clone> Drop for Registry<B> {
    fn drop(&mut self) {
        self.shutdown_sweep();
    }
}
