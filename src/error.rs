//! Error types for the LMS API service

use std::io;

use thiserror::Error;

/// Result type alias for the LMS API service
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value store cannot be reached or rejected a command
    #[error("Cache store unavailable: {0}")]
    StoreUnavailable(String),

    /// Outbound call to the remote API failed
    #[error("Fetch failed: {message}")]
    FetchFailed {
        /// Upstream HTTP status, when a response was received
        status: Option<u16>,
        /// Failure description
        message: String,
    },

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Request payload failed validation
    #[error("{0}")]
    Validation(String),

    /// Invalid cache call (empty key, zero TTL)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a fetch failure without an upstream status
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::FetchFailed {
            status: None,
            message: message.into(),
        }
    }

    /// Whether the error originates from the key-value store
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Map to the HTTP status rendered by the boundary layer
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::StoreUnavailable(_) => 502,
            Self::FetchFailed {
                status: Some(code), ..
            } if (400..600).contains(code) => *code,
            Self::NotFound(_) => 404,
            Self::Validation(_) | Self::InvalidArgument(_) | Self::Json(_) => 400,
            _ => 500,
        }
    }
}
