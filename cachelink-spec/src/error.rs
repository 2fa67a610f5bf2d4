use thiserror::Error;

/// Result alias for connector operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Canonical connector error surface.
///
/// Every variant carries owned strings so a single backend failure can be
/// handed to each caller waiting on the same flushed batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid configuration: {field} {reason}")]
    Config { field: &'static str, reason: String },
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("table {table} already exists")]
    TableExists { table: String },
    #[error("table {table} does not exist")]
    TableNotFound { table: String },
    #[error("invalid table name {table:?}: {reason}")]
    InvalidTable { table: String, reason: String },
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("connector unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            field,
            reason: reason.into(),
        }
    }

    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised while validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Runtime(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
