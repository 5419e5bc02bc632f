//! Error types for event construction and encoding.

use thiserror::Error;

/// Result type for event operations
pub type Result<T> = std::result::Result<T, EventError>;

/// Errors raised while building or encoding change events
#[derive(Error, Debug)]
pub enum EventError {
    /// An extra attribute tried to shadow a reserved output field.
    ///
    /// The event is left untouched when this is returned.
    #[error("extra attribute key '{0}' is a protected name; must not be any of: {reserved}", reserved = crate::fields::protected_names().join(", "))]
    ProtectedAttributeName(String),

    /// Configuration error (bad exclude pattern, missing secret key)
    #[error("configuration error: {0}")]
    Config(String),

    /// Encryption or key-derivation failure
    #[error("encryption error: {0}")]
    Crypto(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EventError {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new encryption error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create a new serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}
