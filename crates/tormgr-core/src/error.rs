use thiserror::Error;

/// Core error types for tormgr domain values
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid access level: {0:?}")]
    InvalidAccess(String),

    #[error("Invalid record ID: {0:?}")]
    InvalidId(String),

    #[error("Invalid torrent status: {0:?}")]
    InvalidStatus(String),

    #[error("Invalid magnet link: {0}")]
    InvalidMagnet(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidAccess error
    pub fn invalid_access(value: impl Into<String>) -> Self {
        Self::InvalidAccess(value.into())
    }

    /// Create a new InvalidId error
    pub fn invalid_id(value: impl Into<String>) -> Self {
        Self::InvalidId(value.into())
    }

    pub fn invalid_magnet(reason: impl Into<String>) -> Self {
        Self::InvalidMagnet(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
