//! Onboarding step sequencing
//!
//! - [`Step`] - title, optional async entry action, optional auto-advance delay
//! - [`StepEngine`] - runs steps in order, guarding against stale completions
//! - [`OnboardingState`] - snapshot published on every transition

pub mod engine;
pub mod state;
pub mod step;

pub use engine::StepEngine;
pub use state::{OnboardingState, OnboardingStatus};
pub use step::{EntryAction, Step};
