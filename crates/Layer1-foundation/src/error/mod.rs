//! Error types for taskq
//!
//! Every failure a task, node or executor can surface goes through this enum.
//! It is `Clone` because a single terminal failure is handed to every
//! listener registered on a task.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// taskq error type
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Contract violations
    // ========================================================================
    #[error("Illegal state: {0}")]
    IllegalState(String),

    // ========================================================================
    // Execution
    // ========================================================================
    #[error("Execution failed: {0}")]
    Execution(Arc<anyhow::Error>),

    #[error("Canceled")]
    Canceled,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    // ========================================================================
    // Other
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a failure raised by user work.
    ///
    /// An `Error` that was only propagated through `anyhow` is unwrapped back
    /// into itself instead of being nested inside another `Execution`.
    pub fn execution(err: impl Into<anyhow::Error>) -> Self {
        let err = err.into();
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(other) => Error::Execution(Arc::new(other)),
        }
    }

    /// Build an execution failure from a caught panic payload
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Error::Execution(Arc::new(anyhow::anyhow!("work panicked: {}", message)))
    }

    /// Contract violation helper
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Error::IllegalState(message.into())
    }

    /// Check whether this error reports a cancellation
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    /// Check whether this error came from a blocking retrieval timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Check whether this error is a caller bug rather than a runtime failure
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::IllegalState(_))
    }

    /// Check whether retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Rejected(_))
    }
}

// ============================================================================
// From conversions
// ============================================================================

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::execution(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_unwraps_propagated_error() {
        let propagated = anyhow::Error::new(Error::Canceled);
        assert!(Error::execution(propagated).is_canceled());
    }

    #[test]
    fn test_execution_wraps_foreign_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::execution(io);
        assert!(matches!(err, Error::Execution(_)));
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn test_from_panic_keeps_message() {
        let err = Error::from_panic(Box::new("boom"));
        assert!(err.to_string().contains("boom"));

        let err = Error::from_panic(Box::new(String::from("owned boom")));
        assert!(err.to_string().contains("owned boom"));
    }

    #[test]
    fn test_predicates() {
        assert!(Error::illegal_state("pending").is_contract_violation());
        assert!(Error::Timeout("50ms".into()).is_timeout());
        assert!(Error::Rejected("shutdown".into()).is_retryable());
        assert!(!Error::Canceled.is_retryable());
    }
}
