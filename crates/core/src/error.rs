//! Error types for statekit
//!
//! Every fallible operation in the workspace returns [`StoreError`].
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! # Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Addressing | `KeyPathNotFound`, `InvalidKeyPath`, `ComputedKeyPath` |
//! | Wire format | `DecodeFailed`, `EncodeFailed`, `InvalidVersionFormat` |
//! | Validation | `ValidationFailed` |
//! | Persistence | `StorageUnavailable`, `Io` |
//! | Execution | `ConcurrencyError`, `TransactionFailed`, `RuntimeOnlyOperation` |
//! | Configuration | `LiveExpressionCycle`, `InvalidConfiguration` |

use std::io;
use thiserror::Error;

/// Result type alias for statekit operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors produced by the store, its backends and the action builder
#[derive(Debug, Error)]
pub enum StoreError {
    /// A key path that had to exist did not
    #[error("key path not found: {path}")]
    KeyPathNotFound {
        /// The raw key path
        path: String,
    },

    /// Malformed dot/bracket syntax
    #[error("invalid key path '{path}': {reason}")]
    InvalidKeyPath {
        /// The raw key path as supplied by the caller
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Wire payload could not be decoded
    #[error("decode failed for {raw}: {reason}")]
    DecodeFailed {
        /// The offending raw payload
        raw: String,
        /// What went wrong
        reason: String,
    },

    /// Value could not be encoded to the wire format
    #[error("encode failed: {0}")]
    EncodeFailed(String),

    /// Version string is not `major.minor.patch`
    #[error("invalid version format: '{0}'")]
    InvalidVersionFormat(String),

    /// A mutation violated a strict validation rule
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The storage backend cannot be reached
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Underlying I/O failure in a durable backend
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal ordering guarantee was violated
    #[error("concurrency error: {0}")]
    ConcurrencyError(String),

    /// A transaction closure failed and nothing was applied
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Write to a key path owned by a live expression
    #[error("key path '{0}' is computed by a live expression")]
    ComputedKeyPath(String),

    /// Live expression registration would create a dependency cycle
    #[error("live expression '{0}' creates a dependency cycle")]
    LiveExpressionCycle(String),

    /// Store or backend misconfiguration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation only available on a runtime store
    #[error("'{0}' is a runtime-only operation")]
    RuntimeOnlyOperation(&'static str),
}

impl StoreError {
    /// Create an InvalidKeyPath error
    pub fn invalid_key_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::InvalidKeyPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a DecodeFailed error
    pub fn decode_failed(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::DecodeFailed {
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    /// Create a KeyPathNotFound error
    pub fn key_path_not_found(path: impl Into<String>) -> Self {
        StoreError::KeyPathNotFound { path: path.into() }
    }

    /// Create a ValidationFailed error
    pub fn validation(reason: impl Into<String>) -> Self {
        StoreError::ValidationFailed(reason.into())
    }

    /// Create a StorageUnavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::StorageUnavailable(reason.into())
    }

    /// Check if this is a validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::ValidationFailed(_))
    }

    /// Check if this error came from the persistence layer
    ///
    /// Persistence errors are reported after the in-memory state has
    /// already advanced.
    pub fn is_storage(&self) -> bool {
        matches!(self, StoreError::StorageUnavailable(_) | StoreError::Io(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::decode_failed("<json>", e.to_string())
    }
}
