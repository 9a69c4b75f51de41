//! Configuration file parsing for Agenda
//!
//! Supports:
//! - `.agenda/config.toml` - Session tuning and onboarding steps

pub mod settings;
pub mod types;

pub use settings::{config_path, init_config_dir, load_settings, save_settings};
pub use types::*;
