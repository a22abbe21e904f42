//! Error codes and the boundary error type.

use crate::string::DbrString;
use docbridge_core::CoreError;
use std::ffi::c_int;
use thiserror::Error;

/// Status for a recoverable error: the call failed, the connection is intact.
pub const DBR_ERROR: c_int = -1;

/// Status for a fatal error: the connection is no longer usable.
pub const DBR_FATAL: c_int = -2;

/// Status returned when there is no error to report.
pub const DBR_NONE: c_int = -3;

/// How bad a boundary error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The call failed; the connection is still usable.
    Recoverable,
    /// The connection must not be used again.
    Fatal,
}

impl Severity {
    /// Status code for this severity.
    pub fn code(self) -> c_int {
        match self {
            Severity::Recoverable => DBR_ERROR,
            Severity::Fatal => DBR_FATAL,
        }
    }
}

/// An error reported across the boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BoundaryError {
    /// Severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
}

/// Result type for boundary operations.
pub type BoundaryResult<T> = Result<T, BoundaryError>;

impl BoundaryError {
    /// Creates a recoverable error.
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Recoverable,
            message: message.into(),
        }
    }

    /// Creates a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            message: message.into(),
        }
    }

    /// Creates the error for a null pointer argument.
    pub fn null_argument(name: &str) -> Self {
        Self::recoverable(format!("null pointer argument: {name}"))
    }

    /// Returns true if the error is fatal.
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// Status code for this error.
    pub fn code(&self) -> c_int {
        self.severity.code()
    }
}

impl From<CoreError> for BoundaryError {
    fn from(err: CoreError) -> Self {
        if err.is_fatal() {
            Self::fatal(err.to_string())
        } else {
            Self::recoverable(err.to_string())
        }
    }
}

/// Error descriptor in a result envelope.
///
/// `code == 0` means there is no error and `msg` is null. Otherwise `code`
/// is `DBR_ERROR` or `DBR_FATAL` and `msg` is owned by the caller.
#[repr(C)]
#[derive(Debug, PartialEq)]
pub struct DbrError {
    /// 0, `DBR_ERROR` or `DBR_FATAL`.
    pub code: c_int,
    /// Error message, null when `code == 0`.
    pub msg: DbrString,
}

impl DbrError {
    /// The no-error descriptor.
    pub fn none() -> Self {
        Self {
            code: 0,
            msg: DbrString::null(),
        }
    }

    /// Returns true if this descriptor carries an error.
    pub fn is_err(&self) -> bool {
        self.code != 0
    }
}

impl From<BoundaryError> for DbrError {
    fn from(err: BoundaryError) -> Self {
        Self {
            code: err.code(),
            msg: DbrString::from(err.message),
        }
    }
}

impl From<BoundaryResult<()>> for DbrError {
    fn from(result: BoundaryResult<()>) -> Self {
        match result {
            Ok(()) => Self::none(),
            Err(err) => err.into(),
        }
    }
}

/// Frees an error descriptor.
///
/// # Safety
///
/// The descriptor must have been returned by DocBridge and not freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_error(err: DbrError) {
    drop(err);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(DBR_ERROR, -1);
        assert_eq!(DBR_FATAL, -2);
        assert_eq!(DBR_NONE, -3);
        assert_eq!(Severity::Recoverable.code(), DBR_ERROR);
        assert_eq!(Severity::Fatal.code(), DBR_FATAL);
    }

    #[test]
    fn core_error_severity() {
        let err = BoundaryError::from(CoreError::record_exists("foo:1"));
        assert!(!err.is_fatal());
        assert_eq!(err.message, "Database record `foo:1` already exists");

        let err = BoundaryError::from(CoreError::unsupported_endpoint("ws://x"));
        assert!(err.is_fatal());
    }

    #[test]
    fn descriptor_from_error() {
        let err = DbrError::from(BoundaryError::fatal("gone"));
        assert_eq!(err.code, DBR_FATAL);
        assert_eq!(unsafe { err.msg.as_str() }, Some("gone"));
        unsafe { dbr_free_error(err) };

        let none = DbrError::from(Ok(()));
        assert!(!none.is_err());
        assert!(none.msg.is_null());
    }
}
