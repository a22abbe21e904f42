//! Diagnostic logging for host applications.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `docbridge_ffi=debug`.
pub const LOG_ENV: &str = "DOCBRIDGE_LOG";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Installs a stderr log subscriber filtered by `DOCBRIDGE_LOG`.
///
/// Defaults to `warn` when the variable is unset or invalid. Returns true
/// if this call installed the subscriber; later calls, or a host that
/// already installed its own, leave it in place and return false.
#[no_mangle]
pub extern "C" fn dbr_init_logging() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
