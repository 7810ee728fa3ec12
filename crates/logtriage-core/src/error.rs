//! Error types for LogTriage

/// Result type alias using LogTriage's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for LogTriage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed log input
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid classifier rule definition
    #[error("rule error: {0}")]
    Rule(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// File/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new rule error
    pub fn rule(msg: impl Into<String>) -> Self {
        Self::Rule(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
