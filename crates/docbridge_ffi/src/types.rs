//! Type definitions for FFI.

use docbridge_core::Config;
use std::time::Duration;

/// An opaque connection handle.
///
/// Each handle owns a private error slot and shares the underlying
/// connection with its copies. A handle may be moved to another thread but
/// must not be used from two threads at once; copy it with
/// `dbr_handle_clone` first.
#[repr(C)]
pub struct DbrHandle {
    _private: [u8; 0],
}

/// An opaque live-query stream handle.
///
/// May be sent across threads, but must not be aliased. `dbr_stream_kill`
/// is the one call that may run concurrently with a blocked
/// `dbr_stream_next`.
#[repr(C)]
pub struct DbrStream {
    _private: [u8; 0],
}

/// An opaque RPC endpoint handle.
///
/// Unlike a connection handle, one RPC handle may be used from many
/// threads at once. Failures are reported through each call's `err_out`.
#[repr(C)]
pub struct DbrRpc {
    _private: [u8; 0],
}

/// Options for opening a connection.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbrOptions {
    /// Require tables to be defined before use.
    pub strict: bool,
    /// Per-batch query timeout in seconds (0 = no timeout).
    pub query_timeout_secs: u64,
    /// Per-write transaction timeout in seconds (0 = no timeout).
    pub transaction_timeout_secs: u64,
    /// Allow live queries.
    pub notifications: bool,
}

impl Default for DbrOptions {
    fn default() -> Self {
        Self {
            strict: false,
            query_timeout_secs: 0,
            transaction_timeout_secs: 0,
            notifications: true,
        }
    }
}

impl From<DbrOptions> for Config {
    fn from(options: DbrOptions) -> Self {
        let secs = |n: u64| (n > 0).then(|| Duration::from_secs(n));
        Config::new()
            .strict(options.strict)
            .query_timeout(secs(options.query_timeout_secs))
            .transaction_timeout(secs(options.transaction_timeout_secs))
            .notifications(options.notifications)
    }
}

/// Returns the default connection options.
#[no_mangle]
pub extern "C" fn dbr_options_default() -> DbrOptions {
    DbrOptions::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_core_defaults() {
        assert_eq!(Config::from(dbr_options_default()), Config::default());
    }

    #[test]
    fn zero_timeout_means_none() {
        let config = Config::from(DbrOptions {
            query_timeout_secs: 0,
            ..DbrOptions::default()
        });
        assert!(config.query_timeout.is_none());
        assert!(config.transaction_timeout.is_none());

        let config = Config::from(DbrOptions {
            strict: true,
            query_timeout_secs: 5,
            transaction_timeout_secs: 2,
            notifications: false,
        });
        assert!(config.strict);
        assert!(!config.notifications);
        assert_eq!(config.query_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.transaction_timeout, Some(Duration::from_secs(2)));
    }
}
