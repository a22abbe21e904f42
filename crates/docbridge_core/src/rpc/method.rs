//! RPC method names.

/// A method an RPC request may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Liveness check; returns `NONE`.
    Ping,
    /// Engine version string.
    Version,
    /// Switch namespace and database: `[ns, db]`.
    Use,
    /// Bind a connection parameter: `[name, value]`.
    Let,
    /// Remove a connection parameter: `[name]`.
    Unset,
    /// Run statement text: `[text, vars?]`.
    Query,
    /// Read a table or record: `[what]`.
    Select,
    /// Create a record: `[what, content?]`.
    Create,
    /// Anything else.
    Unknown,
}

impl Method {
    /// Parses a method name, case-insensitively.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "ping" => Self::Ping,
            "version" => Self::Version,
            "use" => Self::Use,
            "let" | "set" => Self::Let,
            "unset" => Self::Unset,
            "query" => Self::Query,
            "select" => Self::Select,
            "create" => Self::Create,
            _ => Self::Unknown,
        }
    }

    /// Returns true if the method leaves the session and parameters alone.
    pub fn can_be_immut(self) -> bool {
        matches!(
            self,
            Self::Ping | Self::Version | Self::Select | Self::Create | Self::Unknown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(Method::parse("PING"), Method::Ping);
        assert_eq!(Method::parse("set"), Method::Let);
        assert_eq!(Method::parse("live"), Method::Unknown);
        assert!(Method::Select.can_be_immut());
        assert!(!Method::Query.can_be_immut());
        assert!(!Method::Use.can_be_immut());
    }
}
