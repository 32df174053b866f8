//! Error types for UFM REST operations.

use thiserror::Error;

/// Result type alias for UFM client operations.
pub type Result<T> = std::result::Result<T, UfmError>;

/// Errors that can occur while talking to the fabric manager.
#[derive(Debug, Error)]
pub enum UfmError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("UFM transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// UFM answered a read request with a non-success status.
    #[error("UFM returned status {status} for {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The response body did not have the expected shape.
    #[error("Failed to decode UFM response from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder message.
        message: String,
    },

    /// UFM answered with an empty document.
    #[error("UFM returned an empty response for {0}")]
    Empty(String),

    /// Client-side endpoint configuration is unusable.
    #[error("Invalid UFM client configuration: {0}")]
    Config(String),
}

impl UfmError {
    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns true if the failure is expected to clear on a later cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UfmError::Transport(_) | UfmError::Status { .. } | UfmError::Empty(_)
        )
    }
}
