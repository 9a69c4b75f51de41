//! Onboarding progress snapshot

use agenda_core::Failure;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Skipped,
}

impl OnboardingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OnboardingStatus::Completed | OnboardingStatus::Skipped)
    }
}

/// Published on every engine transition
///
/// `step_index` is only meaningful while `Running`. `error` survives
/// `skip` and `complete`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingState {
    pub status: OnboardingStatus,
    pub step_index: usize,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

impl OnboardingState {
    pub fn is_running(&self) -> bool {
        self.status == OnboardingStatus::Running
    }
}
