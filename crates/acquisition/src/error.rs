//! Acquisition error types

use contracts::ContractError;
use thiserror::Error;

/// Acquisition error
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Unrecoverable setup problem; acquisition must not start
    #[error("configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Reading a sub-frame from the ring buffer failed
    #[error("failed to read frame {offset} before last: {source}")]
    FrameRead {
        /// Backward offset that was requested
        offset: usize,
        /// Underlying hardware error
        #[source]
        source: ContractError,
    },

    /// Construction queue closed (worker shut down)
    #[error("construction queue closed")]
    QueueClosed,

    /// Other contract error
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl AcquisitionError {
    /// Create configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error must abort the acquisition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::QueueClosed)
    }
}

/// Acquisition Result type alias
pub type Result<T> = std::result::Result<T, AcquisitionError>;
