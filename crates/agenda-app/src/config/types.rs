//! Configuration types for Agenda
//!
//! Defines:
//! - `Settings` - Root of `.agenda/config.toml`
//! - `SessionSettings` - Debounce windows and post-dispose policy
//! - `OnboardingSettings` / `StepSettings` - Onboarding steps for the runner

use serde::{Deserialize, Serialize};

use crate::session::PostDisposePolicy;

/// Application settings (.agenda/config.toml)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub onboarding: OnboardingSettings,
}

/// Session machine settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Quiet period for log-in and sign-in calls, in milliseconds
    #[serde(default = "default_auth_debounce_ms")]
    pub auth_debounce_ms: u64,

    /// Quiet period for session refreshes, in milliseconds
    #[serde(default = "default_refresh_debounce_ms")]
    pub refresh_debounce_ms: u64,

    /// What snapshot reads return after the session is torn down
    #[serde(default)]
    pub post_dispose_policy: PostDisposePolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auth_debounce_ms: default_auth_debounce_ms(),
            refresh_debounce_ms: default_refresh_debounce_ms(),
            post_dispose_policy: PostDisposePolicy::default(),
        }
    }
}

fn default_auth_debounce_ms() -> u64 {
    300
}

fn default_refresh_debounce_ms() -> u64 {
    1000
}

/// Onboarding flow settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OnboardingSettings {
    /// Steps in display order (`[[onboarding.steps]]`)
    #[serde(default)]
    pub steps: Vec<StepSettings>,
}

/// A single configured onboarding step
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StepSettings {
    pub title: String,

    /// Advance automatically this long after the step is entered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_advance_ms: Option<u64>,
}
