//! Dispatcher error types

use contracts::ContractError;
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Storage creation error
    #[error("failed to create storage '{name}': {message}")]
    StorageCreation { name: String, message: String },

    /// Writing queue closed; storage has finished or shut down
    #[error("writing queue of storage '{name}' is closed")]
    StorageClosed { name: String },

    /// Storage worker did not finish within the join timeout
    #[error("storage '{name}' did not shut down within {timeout_ms} ms")]
    ShutdownTimeout { name: String, timeout_ms: u64 },

    /// Viewer notification thread could not be started or joined
    #[error("viewer thread error: {0}")]
    Viewer(String),

    /// Storage error (from contract)
    #[error("storage error: {0}")]
    Contract(#[from] ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a storage creation error
    pub fn storage_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn storage_closed(name: impl Into<String>) -> Self {
        Self::StorageClosed { name: name.into() }
    }
}

impl From<DispatcherError> for ContractError {
    fn from(err: DispatcherError) -> Self {
        match err {
            DispatcherError::StorageClosed { name } => ContractError::queue_closed(name),
            DispatcherError::Contract(inner) => inner,
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Dispatcher Result type alias
pub type Result<T> = std::result::Result<T, DispatcherError>;
