//! Construction error types

use contracts::ContractError;
use thiserror::Error;

/// Construction error
#[derive(Debug, Error)]
pub enum ConstructionError {
    /// Sub-rectangle does not fit the raw frame, or a dimension is zero
    #[error("invalid integration geometry: {message}")]
    InvalidGeometry {
        /// Error message
        message: String,
    },

    /// Integration contract violated (malformed frame, early construct, ...)
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// An integrator panicked while processing a batch
    #[error("integrator panicked: {message}")]
    IntegratorPanicked {
        /// Panic payload, if it was a string
        message: String,
    },

    /// Worker thread could not be spawned
    #[error("failed to spawn construction worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// Worker thread terminated by panic
    #[error("construction worker panicked")]
    WorkerPanicked,
}

impl ConstructionError {
    /// Create invalid geometry error
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            message: message.into(),
        }
    }

    /// Build from a `catch_unwind` payload
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::IntegratorPanicked { message }
    }
}

/// Construction Result type alias
pub type Result<T> = std::result::Result<T, ConstructionError>;
