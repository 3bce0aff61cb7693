//! Error types for signing operations

use thiserror::Error;

/// Result type alias for signing operations
pub type Result<T> = std::result::Result<T, SigningError>;

/// Signing-related errors
#[derive(Debug, Error)]
pub enum SigningError {
    /// The signing backend reported a failure, timed out, or broke the output protocol
    #[error("Signing call failed: {0}")]
    FacadeCall(String),

    /// A temporary file name tried to leave its directory
    #[error("Temporary file name '{name}' escapes its directory; navigating to a parent is not allowed")]
    PathEscape { name: String },

    /// The signing request is incomplete or malformed
    #[error("Invalid signing request: {0}")]
    InvalidRequest(String),

    /// API configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error (temp allocation, process spawn)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SigningError {
    /// Whether this error came from the backend rather than the local machine
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::FacadeCall(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facade_call_message() {
        let err = SigningError::FacadeCall("signing request was denied".to_string());
        assert_eq!(
            err.to_string(),
            "Signing call failed: signing request was denied"
        );
        assert!(err.is_backend_failure());
    }

    #[test]
    fn test_io_is_not_backend_failure() {
        let err: SigningError = std::io::Error::new(std::io::ErrorKind::NotFound, "pwsh").into();
        assert!(!err.is_backend_failure());
    }
}
