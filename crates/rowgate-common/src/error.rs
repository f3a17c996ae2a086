//! Error types for rowgate
//!
//! Provides a unified error type hierarchy for the hooks, the bridge and handler code.

use thiserror::Error;

/// Result type alias using rowgate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rowgate
#[derive(Error, Debug)]
pub enum Error {
    // Statement analysis errors
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    // Sync/async bridge errors
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    // Errors raised by authorization or post-commit handlers
    #[error("Handler error: {0}")]
    Handler(#[from] anyhow::Error),

    // Policy store errors
    #[error("Policy error: {0}")]
    Policy(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO Errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Statement analysis errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("No entity registry available for {0} statement")]
    MissingRegistry(String),

    #[error("Table is not mapped to an entity: {0}")]
    UnknownEntity(String),
}

/// Bridge errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Bridge loop is no longer accepting work")]
    Closed,

    #[error("Unit of work finished without a result")]
    Dropped,

    #[error("Cannot block on the bridge from its own loop thread")]
    Reentrant,

    #[error("Failed to start bridge thread: {0}")]
    Spawn(String),
}

impl Error {
    /// Wrap any handler-side failure
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Error::Handler(err.into())
    }

    /// True when the error came from handler code rather than rowgate itself
    #[must_use]
    pub fn is_handler(&self) -> bool {
        matches!(self, Error::Handler(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
