//! Cluster error types
//!
//! Classification drives the propagation policy: only configuration,
//! connection-string and storage failures may terminate the process;
//! everything else is scoped to one leadership term and absorbed.

use thiserror::Error;

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Cluster errors
#[derive(Debug, Error)]
pub enum ClusterError {
    // ==================== Configuration Errors ====================
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("client id '{0}' is the reserved default; configure a unique client_id")]
    ReservedClientId(String),

    #[error("connection string syntax: {0}")]
    ConnectionString(String),

    // ==================== Coordination Errors ====================
    #[error("coordination service connection lost")]
    ConnectionLost,

    #[error("election error: {0}")]
    Election(String),

    #[error("not enrolled as a candidate")]
    NotEnrolled,

    // ==================== Engine Errors ====================
    #[error("engine failed: {0}")]
    Engine(String),

    #[error("engine rebuild failed: {0}")]
    EngineRebuild(String),

    // ==================== Storage Errors ====================
    #[error("storage error: {0}")]
    Storage(String),

    // ==================== Internal Errors ====================
    #[error("channel closed")]
    ChannelClosed,

    #[error("shutdown in progress")]
    ShuttingDown,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// Create a new invalid-configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new connection-string error
    pub fn connection_string(msg: impl Into<String>) -> Self {
        Self::ConnectionString(msg.into())
    }

    /// Create a new election error
    pub fn election(msg: impl Into<String>) -> Self {
        Self::Election(msg.into())
    }

    /// Create a new engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if this error may terminate the process at startup.
    ///
    /// Everything else is scoped to a leadership term or a single event and
    /// must leave the coordinator running.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            ClusterError::InvalidConfig(_)
                | ClusterError::ReservedClientId(_)
                | ClusterError::ConnectionString(_)
                | ClusterError::Storage(_)
        )
    }

    /// Check if this error warrants only a concise log line, without the
    /// full diagnostic detail (the operator can act on the message alone).
    pub fn concise_report(&self) -> bool {
        matches!(
            self,
            ClusterError::ConnectionString(_) | ClusterError::Storage(_)
        )
    }

    /// Check if this error is retriable within the same process.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ClusterError::ConnectionLost | ClusterError::Election(_) | ClusterError::Engine(_)
        )
    }
}

// Conversion from channel errors
impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ClusterError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ClusterError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ClusterError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        ClusterError::ChannelClosed
    }
}
