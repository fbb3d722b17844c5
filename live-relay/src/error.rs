//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Account already tracked: {handle}")]
    AlreadyTracked { handle: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Probe inconclusive: {0}")]
    ProbeInconclusive(String),

    #[error("Connection failed for {handle}: {reason}")]
    ConnectionFailed { handle: String, reason: String },

    #[error("Durable write failed: {0}")]
    DurableWriteFailed(String),

    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn already_tracked(handle: impl Into<String>) -> Self {
        Self::AlreadyTracked {
            handle: handle.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn connection_failed(handle: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            handle: handle.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Errors caused by the operator's request rather than by an upstream failure.
    ///
    /// These are surfaced to the caller as-is and never retried.
    pub fn is_operator_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyTracked { .. } | Self::NotFound { .. } | Self::InvalidHandle(_)
        )
    }
}
