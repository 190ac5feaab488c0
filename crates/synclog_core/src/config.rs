//! Store configuration.

/// Configuration for opening a [`crate::JournalStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the journal on every committed batch.
    ///
    /// Turning this off trades durability of the last few batches across a
    /// power loss for throughput. Atomicity is unaffected.
    pub sync_on_commit: bool,

    /// Whether to truncate an unsealed or torn tail found at open.
    ///
    /// When false, a store with a damaged tail refuses to open instead.
    pub repair_tail: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            repair_tail: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether a damaged tail is truncated at open.
    #[must_use]
    pub const fn repair_tail(mut self, value: bool) -> Self {
        self.repair_tail = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert!(config.repair_tail);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .create_if_missing(false)
            .sync_on_commit(false)
            .repair_tail(false);

        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
        assert!(!config.repair_tail);
    }
}
