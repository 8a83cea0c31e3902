//! Layered error definitions
//!
//! Categorized by source: config / hardware / integration / queue / storage

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Unsupported combination of construction parameters
    #[error("unsupported configuration: {message}")]
    Unsupported { message: String },

    // ===== Hardware Errors =====
    /// Read-only hardware query failed
    #[error("hardware query '{query}' failed: {message}")]
    HardwareQuery { query: String, message: String },

    // ===== Integration Errors =====
    /// A sub-frame does not fit the integrator it was fed to
    #[error("malformed frame: {message}")]
    MalformedFrame { message: String },

    /// construct_image() called before every sub-frame was added
    #[error("incomplete batch: expected {expected} sub-frames, received {received}")]
    IncompleteBatch { expected: u32, received: u32 },

    /// More sub-frames were added than the batch requires
    #[error("batch overflow: batch requires only {expected} sub-frames")]
    BatchOverflow { expected: u32 },

    // ===== Queue Errors =====
    /// Queue is closed (shutdown observed or consumer gone)
    #[error("queue '{queue}' is closed")]
    QueueClosed { queue: String },

    // ===== Storage Errors =====
    /// Storage write error
    #[error("storage '{storage}' write error: {message}")]
    StorageWrite { storage: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create unsupported configuration error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create hardware query error
    pub fn hardware_query(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HardwareQuery {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create malformed frame error
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Create queue closed error
    pub fn queue_closed(queue: impl Into<String>) -> Self {
        Self::QueueClosed {
            queue: queue.into(),
        }
    }

    /// Create storage write error
    pub fn storage_write(storage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageWrite {
            storage: storage.into(),
            message: message.into(),
        }
    }
}
