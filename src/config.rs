//! Registry configuration.

/// Limits and defaults applied by a `Registry` to the arenas it creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of arenas alive at the same time.
    ///
    /// Default: 100.
    pub max_arenas: usize,

    /// Number of relocation slots reserved for every new arena.
    ///
    /// The slot storage doubles whenever it is full. Default: 4; `0` is
    /// treated as `1`.
    pub initial_slot_capacity: usize,

    /// Initial `auto_resize` flag of new arenas. Default: `true`.
    pub auto_resize: bool,
}

impl RegistryConfig {
    /// Default maximum number of live arenas.
    pub const DEFAULT_MAX_ARENAS: usize = 100;

    /// Default number of relocation slots reserved per arena.
    pub const DEFAULT_INITIAL_SLOT_CAPACITY: usize = 4;

    /// Create a config with the given arena limit and defaults for everything else.
    pub fn new(max_arenas: usize) -> Self {
        Self {
            max_arenas,
            initial_slot_capacity: Self::DEFAULT_INITIAL_SLOT_CAPACITY,
            auto_resize: true,
        }
    }

    pub(crate) fn slot_capacity(&self) -> usize {
        self.initial_slot_capacity.max(1)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ARENAS)
    }
}

#[cfg(test)]
mod config_tests {
    use super::RegistryConfig;

    #[test]
    fn defaults() {
        let config = RegistryConfig::default();
        assert_eq!(100, config.max_arenas);
        assert_eq!(4, config.initial_slot_capacity);
        assert!(config.auto_resize);
    }

    #[test]
    fn zero_slot_capacity_reserves_one() {
        let config = RegistryConfig { initial_slot_capacity: 0, ..RegistryConfig::default() };
        assert_eq!(1, config.slot_capacity());
    }
}
