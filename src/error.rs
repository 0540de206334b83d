//! Error types for gale

use std::fmt;

/// Result type alias for gale operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for gale
///
/// The variants carry the semantic classes the HTTP layer maps to status
/// codes: authorization failures, schema-absence (which is deliberately not
/// a request failure), validation errors caught before any engine work,
/// not-found/conflict outcomes, and everything else as internal.
#[derive(Debug)]
pub enum Error {
    /// Principal missing or not permitted to perform the operation
    Unauthorized(String),
    /// Measurement does not exist in the database schema
    MeasurementNotFound(String),
    /// Tag key does not exist in the measurement schema
    TagNotFound(String),
    /// Field key does not exist in the measurement schema
    FieldNotFound(String),
    /// Query text failed to parse
    Parse(String),
    /// Bad input detected at the boundary, before any engine work
    Validation(String),
    /// Unknown database
    DatabaseNotFound(String),
    /// Unknown data node
    DataNodeNotFound(u64),
    /// Unknown shard
    ShardNotFound(u64),
    /// Data node already registered at this URL
    DataNodeExists(String),
    /// Operation timed out
    Timeout,
    /// IO errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
    /// Internal error
    Internal(String),
}

impl Error {
    /// True for authorization-denied errors.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }

    /// True for the schema-absence class: measurement, tag, or field not
    /// found. These classify as success with an empty result body.
    pub fn is_schema_not_found(&self) -> bool {
        matches!(
            self,
            Error::MeasurementNotFound(_) | Error::TagNotFound(_) | Error::FieldNotFound(_)
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unauthorized(msg) => write!(f, "{}", msg),
            Error::MeasurementNotFound(name) => write!(f, "measurement not found: {}", name),
            Error::TagNotFound(name) => write!(f, "unknown field or tag name: {}", name),
            Error::FieldNotFound(name) => write!(f, "field not found: {}", name),
            Error::Parse(msg) => write!(f, "error parsing query: {}", msg),
            Error::Validation(msg) => write!(f, "{}", msg),
            Error::DatabaseNotFound(db) => write!(f, "database not found: {:?}", db),
            Error::DataNodeNotFound(id) => write!(f, "data node not found: {}", id),
            Error::ShardNotFound(id) => write!(f, "shard not found: {}", id),
            Error::DataNodeExists(url) => write!(f, "data node already exists: {}", url),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Error::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Validation(format!("invalid url: {}", e))
    }
}
