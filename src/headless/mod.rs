//! Headless mode - JSON event output for scripting and E2E testing
//!
//! The runner wires a session machine and an onboarding engine into a
//! container registry and reports every transition as an event. With
//! `--headless` events are printed as NDJSON (newline-delimited JSON), one
//! event per line, each with an "event" field naming its type.
//!
//! # Example Output
//!
//! ```json
//! {"event":"started","project":"/work/app","timestamp":1704700001000}
//! {"event":"session_changed","session":{"state":"authenticating"},"timestamp":1704700001300}
//! {"event":"onboarding_changed","onboarding":{"status":"running","stepIndex":0,"totalSteps":3},"timestamp":1704700001400}
//! ```

pub mod runner;

use std::io::{self, Write};

use agenda_app::{OnboardingState, SessionState};
use agenda_core::{Error, User};
use chrono::Utc;
use serde::Serialize;
use tracing::error;

pub use runner::{run, Output, RunOptions, RunSummary, DEMO_EMAIL, DEMO_PASSWORD};

/// Events emitted by the runner
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Runner started for a project directory
    Started { project: String, timestamp: i64 },

    /// The session machine published a new state
    SessionChanged {
        session: SessionState,
        timestamp: i64,
    },

    /// The signed-in user changed
    UserChanged {
        user_id: Option<String>,
        email: Option<String>,
        timestamp: i64,
    },

    /// The onboarding engine published a new state
    OnboardingChanged {
        onboarding: OnboardingState,
        timestamp: i64,
    },

    /// Error occurred
    Error {
        message: String,
        code: Option<String>,
        fatal: bool,
        timestamp: i64,
    },

    /// Every registered resource was disposed
    Shutdown { disposed: usize, timestamp: i64 },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        // Flush so scripts see each line as it happens
        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// One human readable line for interactive use
    pub fn describe(&self) -> String {
        match self {
            HeadlessEvent::Started { project, .. } => format!("started in {}", project),
            HeadlessEvent::SessionChanged { session, .. } => format!("session: {}", session),
            HeadlessEvent::UserChanged { email, .. } => match email {
                Some(email) => format!("user: {}", email),
                None => "user: (signed out)".to_string(),
            },
            HeadlessEvent::OnboardingChanged { onboarding, .. } => {
                let mut line = format!(
                    "onboarding: {:?} step {}/{}",
                    onboarding.status,
                    onboarding.step_index + 1,
                    onboarding.total_steps
                );
                if let Some(error) = &onboarding.error {
                    line.push_str(&format!(" ({})", error.code));
                }
                line
            }
            HeadlessEvent::Error { message, fatal, .. } => {
                let kind = if *fatal { "fatal" } else { "error" };
                format!("{}: {}", kind, message)
            }
            HeadlessEvent::Shutdown { disposed, .. } => {
                format!("shutdown: disposed {} resource(s)", disposed)
            }
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn started(project: &str) -> Self {
        Self::Started {
            project: project.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn session_changed(session: SessionState) -> Self {
        Self::SessionChanged {
            session,
            timestamp: Self::now(),
        }
    }

    pub fn user_changed(user: &User) -> Self {
        let (user_id, email) = if user.is_empty() {
            (None, None)
        } else {
            (Some(user.id.clone()), Some(user.email.clone()))
        };
        Self::UserChanged {
            user_id,
            email,
            timestamp: Self::now(),
        }
    }

    pub fn onboarding_changed(onboarding: OnboardingState) -> Self {
        Self::OnboardingChanged {
            onboarding,
            timestamp: Self::now(),
        }
    }

    pub fn error(err: &Error, fatal: bool) -> Self {
        Self::Error {
            message: err.to_string(),
            code: err.as_failure().map(|f| f.code.clone()),
            fatal,
            timestamp: Self::now(),
        }
    }

    pub fn shutdown(disposed: usize) -> Self {
        Self::Shutdown {
            disposed,
            timestamp: Self::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenda_app::OnboardingStatus;
    use agenda_core::Failure;

    #[test]
    fn test_session_changed_serialization() {
        let event = HeadlessEvent::session_changed(SessionState::Authenticated {
            user: User::new("u1", "a@b.c"),
        });
        let json = serde_json::to_string(&event).expect("serialization failed");

        let value: serde_json::Value = serde_json::from_str(&json).expect("invalid JSON");

        assert_eq!(value["event"], "session_changed");
        assert_eq!(value["session"]["state"], "authenticated");
        assert_eq!(value["session"]["user"]["email"], "a@b.c");
        assert!(value["timestamp"].is_number());
    }

    #[test]
    fn test_user_changed_for_empty_user() {
        let event = HeadlessEvent::user_changed(&User::default());
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event"], "user_changed");
        assert!(value["user_id"].is_null());
        assert_eq!(event.describe(), "user: (signed out)");
    }

    #[test]
    fn test_onboarding_changed_serialization() {
        let event = HeadlessEvent::onboarding_changed(OnboardingState {
            status: OnboardingStatus::Running,
            step_index: 0,
            total_steps: 2,
            error: Some(Failure::network("offline")),
        });
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["onboarding"]["status"], "running");
        assert_eq!(value["onboarding"]["error"]["code"], "network");
        assert_eq!(event.describe(), "onboarding: Running step 1/2 (network)");
    }

    #[test]
    fn test_error_carries_failure_code() {
        let err = Error::from(Failure::invalid_credentials());
        let value = serde_json::to_value(HeadlessEvent::error(&err, false)).unwrap();

        assert_eq!(value["event"], "error");
        assert_eq!(value["code"], "invalid_credentials");
        assert_eq!(value["fatal"], false);
    }

    #[test]
    fn test_shutdown_serialization() {
        let value = serde_json::to_value(HeadlessEvent::shutdown(3)).unwrap();
        assert_eq!(value["event"], "shutdown");
        assert_eq!(value["disposed"], 3);
    }
}
