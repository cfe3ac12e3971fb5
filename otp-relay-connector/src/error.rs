use thiserror::Error;

/// Errors surfaced by the write path of an [`AuthStore`](crate::storage::AuthStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Storage is closed")]
    Closed,
}

impl StoreError {
    /// Wraps any backend-specific error (e.g. a database driver error).
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Errors reported by a transport implementation.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Transport session is closed")]
    SessionClosed,

    #[error("Transport failure: {0}")]
    Failed(String),
}

/// Errors raised while persisting auth material on behalf of the transport.
#[derive(Error, Debug)]
pub enum AuthStateError {
    #[error("Failed to serialize auth material: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to persist key material: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to persist credentials after {attempts} attempt(s): {source}")]
    CredentialWrite {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

/// Errors returned to callers of the [`ControllerHandle`](crate::controller::ControllerHandle).
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Messaging session is not connected")]
    NotConnected,

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Connection controller has stopped")]
    Stopped,
}
