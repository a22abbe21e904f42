//! Error types for DocBridge core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in DocBridge core operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    /// The endpoint scheme is not served by any engine.
    #[error("unsupported endpoint: {endpoint}")]
    UnsupportedEndpoint {
        /// The endpoint that was requested.
        endpoint: String,
    },

    /// The statement text could not be parsed.
    #[error("parse error: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },

    /// A record with the same id already exists.
    #[error("Database record `{thing}` already exists")]
    RecordExists {
        /// Rendered record id.
        thing: String,
    },

    /// No namespace selected for this session.
    #[error("Specify a namespace to use")]
    NoNamespace,

    /// No database selected for this session.
    #[error("Specify a database to use")]
    NoDatabase,

    /// The table has not been defined (strict mode only).
    #[error("The table '{table}' does not exist")]
    TableNotFound {
        /// Name of the table.
        table: String,
    },

    /// A value had the wrong type for the operation.
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// The statement was skipped because the batch ran out of time.
    #[error("The query was not executed because it exceeded the timeout")]
    QueryTimedOut,

    /// A write ran past the transaction timeout and was rolled back.
    #[error("The transaction was cancelled because it exceeded the timeout")]
    TransactionTimedOut,

    /// Live queries are switched off in the configuration.
    #[error("live queries are not enabled")]
    NotificationsDisabled,

    /// An RPC request was not a well-formed request.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// An RPC request named a method the engine does not serve.
    #[error("Method not found: {method}")]
    MethodNotFound {
        /// The requested method name.
        method: String,
    },

    /// An RPC request carried the wrong parameters for its method.
    #[error("Invalid params: {message}")]
    InvalidParams {
        /// Description of the expected parameters.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an unsupported endpoint error.
    pub fn unsupported_endpoint(endpoint: impl Into<String>) -> Self {
        Self::UnsupportedEndpoint {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a record exists error.
    pub fn record_exists(thing: impl Into<String>) -> Self {
        Self::RecordExists {
            thing: thing.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a method not found error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Creates an invalid params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the error leaves the connection unusable.
    ///
    /// Everything else is scoped to the statement or call that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnsupportedEndpoint { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_exists_message() {
        let err = CoreError::record_exists("foo:1");
        assert_eq!(err.to_string(), "Database record `foo:1` already exists");
    }

    #[test]
    fn fatal_classification() {
        assert!(CoreError::unsupported_endpoint("tcp://x").is_fatal());
        assert!(!CoreError::TransactionTimedOut.is_fatal());
        assert!(!CoreError::method_not_found("frob").is_fatal());
        assert!(!CoreError::parse("bad").is_fatal());
        assert!(!CoreError::record_exists("a:1").is_fatal());
        assert!(!CoreError::NoNamespace.is_fatal());
    }
}
