//! Session states and post-dispose read policy

use agenda_core::{Failure, User};
use serde::{Deserialize, Serialize};

/// Authentication state; exactly one variant is current at a time
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated {
        user: User,
    },
    Refreshing {
        user: User,
    },
    SessionError {
        error: Failure,
    },
}

impl SessionState {
    /// The user carried by `Authenticated` and `Refreshing`
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated { user } | SessionState::Refreshing { user } => Some(user),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Failure> {
        match self {
            SessionState::SessionError { error } => Some(error),
            _ => None,
        }
    }

    /// A refresh in flight still counts as signed in
    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated { .. } => "authenticated",
            SessionState::Refreshing { .. } => "refreshing",
            SessionState::SessionError { .. } => "session_error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Authenticated { user } | SessionState::Refreshing { user } => {
                write!(f, "{}({})", self.name(), user.id)
            }
            SessionState::SessionError { error } => write!(f, "{}({})", self.name(), error.code),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// What snapshot accessors return once the machine has been disposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostDisposePolicy {
    /// Keep returning the last live state and user
    ReturnLastSnapshot,
    /// Report a synthetic `SessionError`, not authenticated, empty user
    #[default]
    ReturnSessionError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unauthenticated() {
        assert_eq!(SessionState::default(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_user_accessor() {
        let user = User::new("u1", "a@b.c");
        let authenticated = SessionState::Authenticated { user: user.clone() };
        let refreshing = SessionState::Refreshing { user: user.clone() };

        assert_eq!(authenticated.user(), Some(&user));
        assert!(refreshing.is_authenticated());
        assert!(!SessionState::Authenticating.is_authenticated());
        assert!(SessionState::Unauthenticated.user().is_none());
    }

    #[test]
    fn test_error_accessor() {
        let state = SessionState::SessionError {
            error: Failure::network("offline"),
        };
        assert_eq!(state.error().map(|e| e.code.as_str()), Some("network"));
        assert!(!state.is_authenticated());
    }

    #[test]
    fn test_json_is_tagged() {
        let state = SessionState::Authenticated {
            user: User::new("u1", "a@b.c"),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "authenticated");
        assert_eq!(json["user"]["id"], "u1");

        let back: SessionState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_display() {
        let state = SessionState::Refreshing {
            user: User::new("u9", "a@b.c"),
        };
        assert_eq!(state.to_string(), "refreshing(u9)");
        assert_eq!(SessionState::Authenticating.to_string(), "authenticating");
    }

    #[test]
    fn test_policy_parses_from_snake_case() {
        #[derive(Deserialize)]
        struct Holder {
            policy: PostDisposePolicy,
        }
        let holder: Holder = toml::from_str(r#"policy = "return_last_snapshot""#).unwrap();
        assert_eq!(holder.policy, PostDisposePolicy::ReturnLastSnapshot);
        assert_eq!(PostDisposePolicy::default(), PostDisposePolicy::ReturnSessionError);
    }
}
