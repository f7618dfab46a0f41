//! Layered error definitions
//!
//! Categorized by source: config / validation / resource / io / connection

use thiserror::Error;

use crate::CloseReason;

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

    // ===== Stream Errors =====
    /// Malformed record, batch, subscription or message.
    ///
    /// Rejected locally; never fatal to the stream that carried it.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A bounded resource is full (oversized batch, mailbox, connection table)
    #[error("resource exhausted ({resource}): {message}")]
    ResourceExhausted { resource: String, message: String },

    /// Store or bus temporarily unavailable, safe to retry
    #[error("transient io error during {operation}: {message}")]
    TransientIo { operation: String, message: String },

    /// Peer went away or timed out
    #[error("connection lost: {reason}")]
    ConnectionLost { reason: CloseReason },

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

    /// Create validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create resource exhausted error
    pub fn resource_exhausted(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create transient IO error
    pub fn transient_io(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientIo {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether the failed operation may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo { .. } | Self::Io(_))
    }

    /// The close reason a stream should report when this error ends it
    pub fn close_reason(&self) -> CloseReason {
        match self {
            Self::Validation { message } => CloseReason::Rejected(message.clone()),
            Self::ResourceExhausted { message, .. } => CloseReason::Rejected(message.clone()),
            Self::ConnectionLost { reason } => reason.clone(),
            other => CloseReason::Error(other.to_string()),
        }
    }
}
