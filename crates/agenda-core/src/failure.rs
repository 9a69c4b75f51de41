//! Structured failure values
//!
//! Collaborator errors (repository calls, step entry actions) never cross the
//! public API as panics or opaque errors. They are mapped into a [`Failure`]
//! that carries a stable machine-readable code alongside human text.

use serde::{Deserialize, Serialize};

/// How a failure should be treated operationally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    /// Surfaced in state; the operation can be retried
    #[default]
    Recoverable,
    /// Indicates misuse or an unrecoverable condition
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Recoverable => write!(f, "recoverable"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A structured error value
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    /// Short title suitable for a dialog header
    pub title: String,

    /// Stable code, safe to match on
    pub code: String,

    /// Human readable description
    pub description: String,

    /// Optional structured context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    #[serde(default)]
    pub severity: Severity,
}

impl Failure {
    pub fn new(
        title: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            code: code.into(),
            description: description.into(),
            metadata: None,
            severity: Severity::Recoverable,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Synthetic failure reported by read accessors of a torn-down instance
    pub fn disposed(component: &str) -> Self {
        Self::new(
            "Session closed",
            codes::DISPOSED,
            format!("{} has been disposed", component),
        )
        .with_severity(Severity::Fatal)
    }

    /// Catch-all for errors that have no better mapping
    pub fn unexpected(description: impl Into<String>) -> Self {
        Self::new("Unexpected error", codes::UNEXPECTED, description)
    }

    pub fn invalid_credentials() -> Self {
        Self::new(
            "Invalid credentials",
            codes::INVALID_CREDENTIALS,
            "The email or password is incorrect",
        )
    }

    pub fn network(description: impl Into<String>) -> Self {
        Self::new("Network error", codes::NETWORK, description)
    }

    pub fn no_session() -> Self {
        Self::new("Not signed in", codes::NO_SESSION, "There is no active session")
    }

    pub fn is_recoverable(&self) -> bool {
        self.severity != Severity::Fatal
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.title, self.code, self.description)
    }
}

impl std::error::Error for Failure {}

/// Stable failure codes
pub mod codes {
    pub const DISPOSED: &str = "disposed";
    pub const UNEXPECTED: &str = "unexpected";
    pub const INVALID_CREDENTIALS: &str = "invalid_credentials";
    pub const NETWORK: &str = "network";
    pub const NO_SESSION: &str = "no_session";
    pub const ENTRY_ACTION_PANICKED: &str = "entry_action_panicked";
}
