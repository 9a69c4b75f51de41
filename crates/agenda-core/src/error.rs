//! Application error types with rich context

use thiserror::Error;

use crate::failure::Failure;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Lifecycle Errors (misuse of containers and machines)
    // ─────────────────────────────────────────────────────────────
    #[error("{kind} '{key}' has not been registered")]
    NotInitialized { kind: &'static str, key: String },

    #[error("{kind} '{key}' is registered with a different type (expected {expected})")]
    TypeMismatch {
        kind: &'static str,
        key: String,
        expected: &'static str,
    },

    #[error("{component} has been disposed")]
    Disposed { component: &'static str },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    // ─────────────────────────────────────────────────────────────
    // Domain Errors
    // ─────────────────────────────────────────────────────────────
    #[error("{0}")]
    Failure(Failure),
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn not_initialized(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotInitialized {
            kind,
            key: key.into(),
        }
    }

    pub fn type_mismatch(kind: &'static str, key: impl Into<String>, expected: &'static str) -> Self {
        Self::TypeMismatch {
            kind,
            key: key.into(),
            expected,
        }
    }

    pub fn disposed(component: &'static str) -> Self {
        Self::Disposed { component }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// The structured failure carried by this error, if it is a domain failure
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Error::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors are runtime conditions that are also surfaced in
    /// machine state; the operation can be retried.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Failure(failure) => failure.is_recoverable(),
            Error::Io(_) | Error::Json(_) | Error::Config { .. } => true,
            _ => false,
        }
    }

    /// Check if this error indicates misuse of the API
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::NotInitialized { .. }
            | Error::TypeMismatch { .. }
            | Error::Disposed { .. }
            | Error::InvalidArgument { .. }
            | Error::InvalidState { .. } => true,
            Error::Failure(failure) => failure.is_fatal(),
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::Severity;

    #[test]
    fn test_error_display_messages() {
        let err = Error::not_initialized("Signal", "session");
        assert_eq!(err.to_string(), "Signal 'session' has not been registered");

        let err = Error::disposed("SessionMachine");
        assert_eq!(err.to_string(), "SessionMachine has been disposed");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_failure() {
        let err: Error = Failure::invalid_credentials().into();
        assert_eq!(err.as_failure().map(|f| f.code.as_str()), Some("invalid_credentials"));
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_lifecycle_errors_are_fatal() {
        assert!(Error::disposed("StepEngine").is_fatal());
        assert!(Error::not_initialized("Module", "auth").is_fatal());
        assert!(Error::type_mismatch("Signal", "count", "i32").is_fatal());
        assert!(Error::invalid_argument("delay must be positive").is_fatal());
        assert!(Error::invalid_state("already running").is_fatal());
        assert!(!Error::disposed("StepEngine").is_recoverable());
    }

    #[test]
    fn test_fatal_failure_is_fatal() {
        let failure = Failure::new("Boom", "boom", "it broke").with_severity(Severity::Fatal);
        let err = Error::from(failure);
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_config_error_is_recoverable() {
        let err = Error::config("bad toml");
        assert!(err.to_string().contains("bad toml"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_result_ext_keeps_error() {
        let result: std::result::Result<(), Failure> = Err(Failure::unexpected("oops"));
        let err = result.context("loading session").unwrap_err();
        assert!(matches!(err, Error::Failure(_)));
    }
}
