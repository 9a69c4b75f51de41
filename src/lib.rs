//! Agenda Library
//!
//! Thin runner over `agenda-app`: wires the session machine and onboarding
//! engine into a registry and reports their transitions.

pub mod headless;

// Re-export main entry points
pub use headless::{run, HeadlessEvent, Output, RunOptions, RunSummary};
