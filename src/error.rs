/// Unified error types for the resource vault
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the storage engine
#[derive(Error, Debug)]
pub enum VaultError {
    /// Missing or malformed required fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation on an unknown resource id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Image decode/encode failure in the transformation pipeline
    #[error("Transform error: {0}")]
    Transform(String),

    /// Underlying SQLite failure (write, read or commit)
    #[error("Transaction error: {0}")]
    Transaction(#[from] sqlx::Error),

    /// Schema migration failure
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Derived-state hook failure. Only ever logged by the engine.
    #[error("Hook error: {0}")]
    Hook(String),

    /// Stored JSON columns that cannot be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification for callers that map failures to user guidance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Transform,
    Transaction,
    Hook,
    Internal,
}

impl VaultError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Validation(_) | VaultError::Config(_) => ErrorKind::Validation,
            VaultError::NotFound(_) => ErrorKind::NotFound,
            VaultError::Transform(_) => ErrorKind::Transform,
            VaultError::Transaction(_) | VaultError::Migration(_) | VaultError::Io(_) => {
                ErrorKind::Transaction
            }
            VaultError::Hook(_) => ErrorKind::Hook,
            VaultError::Serialization(_) | VaultError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<image::ImageError> for VaultError {
    fn from(e: image::ImageError) -> Self {
        VaultError::Transform(e.to_string())
    }
}

/// Result type alias for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinguishable() {
        assert_eq!(
            VaultError::Transform("bad png".into()).kind(),
            ErrorKind::Transform
        );
        assert_eq!(
            VaultError::Transaction(sqlx::Error::PoolTimedOut).kind(),
            ErrorKind::Transaction
        );
        assert_eq!(VaultError::NotFound("r1".into()).kind(), ErrorKind::NotFound);
        assert_ne!(
            VaultError::Transform("x".into()).kind(),
            VaultError::Validation("x".into()).kind()
        );
    }

    #[test]
    fn test_image_errors_become_transform_errors() {
        let err: VaultError = image::load_from_memory(b"not an image").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Transform);
    }

    #[test]
    fn test_error_display() {
        let err = VaultError::Validation("Resource id is required".to_string());
        assert_eq!(err.to_string(), "Validation error: Resource id is required");
    }
}
