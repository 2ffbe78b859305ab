//! Database configuration.

/// Configuration for opening a [`Database`](crate::Database).
///
/// Built with chained setters:
///
/// ```
/// use silodb_core::Config;
///
/// let config = Config::new()
///     .create_if_missing(true)
///     .prefetch_percent(25)
///     .sync_on_commit(true);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Create the database directory if it does not exist.
    pub create_if_missing: bool,
    /// Fail `open` when the directory already holds a database.
    pub error_if_exists: bool,
    /// Tombstone undecodable records during loads instead of failing.
    pub repair_mode: bool,
    /// Percentage (0-100) of a type's file read ahead per bulk-load window.
    pub prefetch_percent: u8,
    /// Fsync the undo log before applying writes and data files after.
    pub sync_on_commit: bool,
    /// Compare text case-sensitively in criteria unless a clause overrides.
    pub string_compare_case_sensitive: bool,
}

impl Config {
    /// Creates a configuration with defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            repair_mode: false,
            prefetch_percent: 10,
            sync_on_commit: true,
            string_compare_case_sensitive: true,
        }
    }

    /// Sets whether to create the directory when missing.
    #[must_use]
    pub const fn create_if_missing(mut self, yes: bool) -> Self {
        self.create_if_missing = yes;
        self
    }

    /// Sets whether opening an existing database is an error.
    #[must_use]
    pub const fn error_if_exists(mut self, yes: bool) -> Self {
        self.error_if_exists = yes;
        self
    }

    /// Sets repair mode: undecodable records are tombstoned and skipped
    /// during loads instead of aborting the operation.
    #[must_use]
    pub const fn repair_mode(mut self, yes: bool) -> Self {
        self.repair_mode = yes;
        self
    }

    /// Sets the bulk-load prefetch window as a percentage of the type file.
    ///
    /// Values above 100 are clamped at open time.
    #[must_use]
    pub const fn prefetch_percent(mut self, percent: u8) -> Self {
        self.prefetch_percent = percent;
        self
    }

    /// Sets whether commits fsync the log and data files.
    #[must_use]
    pub const fn sync_on_commit(mut self, yes: bool) -> Self {
        self.sync_on_commit = yes;
        self
    }

    /// Sets the default case sensitivity for text comparisons.
    #[must_use]
    pub const fn string_compare_case_sensitive(mut self, yes: bool) -> Self {
        self.string_compare_case_sensitive = yes;
        self
    }

    /// Clamps out-of-range settings; called once at open.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.prefetch_percent > 100 {
            self.prefetch_percent = 100;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(!config.error_if_exists);
        assert!(!config.repair_mode);
        assert_eq!(config.prefetch_percent, 10);
        assert!(config.sync_on_commit);
        assert!(config.string_compare_case_sensitive);
    }

    #[test]
    fn builder_chains() {
        let config = Config::new()
            .repair_mode(true)
            .prefetch_percent(50)
            .string_compare_case_sensitive(false);
        assert!(config.repair_mode);
        assert_eq!(config.prefetch_percent, 50);
        assert!(!config.string_compare_case_sensitive);
    }

    #[test]
    fn normalized_clamps_prefetch() {
        let config = Config::new().prefetch_percent(250).normalized();
        assert_eq!(config.prefetch_percent, 100);
    }
}
