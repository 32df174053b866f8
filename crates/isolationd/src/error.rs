//! Error types for the isolation daemon

use pdr_ufm_client::UfmError;
use thiserror::Error;

/// Isolation daemon errors
#[derive(Debug, Error)]
pub enum IsolationError {
    /// Fabric manager call failed
    #[error("UFM error: {0}")]
    Ufm(#[from] UfmError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Reference data (BER matrix, FEC lookup) could not be loaded
    #[error("Reference data error in {path}: {message}")]
    ReferenceData { path: String, message: String },

    /// The control loop is no longer accepting admin commands
    #[error("Admin channel closed")]
    AdminChannelClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IsolationError {
    /// Creates a reference data error.
    pub fn reference(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReferenceData {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl IsolationError {
    /// Returns true for UFM failures a later cycle may clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Ufm(e) if e.is_transient())
    }
}

/// Result type for isolation daemon operations
pub type Result<T> = std::result::Result<T, IsolationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IsolationError::Configuration("t_isolate_secs must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: t_isolate_secs must be > 0"
        );
    }

    #[test]
    fn test_reference_error() {
        let err =
            IsolationError::reference("/etc/pdr/fec_lookup.json", "key 'x' is not an integer");
        assert_eq!(
            err.to_string(),
            "Reference data error in /etc/pdr/fec_lookup.json: key 'x' is not an integer"
        );
    }

    #[test]
    fn test_from_ufm_error() {
        let err: IsolationError = UfmError::Empty("/telemetry".to_string()).into();
        assert!(matches!(err, IsolationError::Ufm(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_non_ufm_errors_are_not_transient() {
        let decode: IsolationError = UfmError::decode("/isolated_ports", "not a list").into();
        assert!(!decode.is_transient());
        assert!(!IsolationError::AdminChannelClosed.is_transient());
        assert!(!IsolationError::Configuration("bad".to_string()).is_transient());
    }
}
