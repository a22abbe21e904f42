//! Datastore configuration.

use std::time::Duration;

/// Configuration for connecting to a datastore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Whether tables must be defined before records are created in them.
    pub strict: bool,

    /// Upper bound on the wall time of one submitted batch (None = unbounded).
    pub query_timeout: Option<Duration>,

    /// Upper bound on one write statement; a write that runs longer is
    /// rolled back (None = unbounded).
    pub transaction_timeout: Option<Duration>,

    /// Whether live queries may be opened.
    pub notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict: false,
            query_timeout: None,
            transaction_timeout: None,
            notifications: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets strict mode.
    #[must_use]
    pub const fn strict(mut self, value: bool) -> Self {
        self.strict = value;
        self
    }

    /// Sets the per-batch query timeout.
    #[must_use]
    pub const fn query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Sets the per-write transaction timeout.
    #[must_use]
    pub const fn transaction_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    /// Sets whether live queries are enabled.
    #[must_use]
    pub const fn notifications(mut self, value: bool) -> Self {
        self.notifications = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(!config.strict);
        assert!(config.query_timeout.is_none());
        assert!(config.transaction_timeout.is_none());
        assert!(config.notifications);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .strict(true)
            .notifications(false)
            .query_timeout(Some(Duration::from_secs(3)))
            .transaction_timeout(Some(Duration::from_secs(1)));

        assert!(config.strict);
        assert!(!config.notifications);
        assert_eq!(config.query_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.transaction_timeout, Some(Duration::from_secs(1)));
    }
}
