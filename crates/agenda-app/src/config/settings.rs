//! Settings parser for .agenda/config.toml

use std::path::{Path, PathBuf};

use agenda_core::prelude::*;

use super::types::Settings;

const CONFIG_FILENAME: &str = "config.toml";
const AGENDA_DIR: &str = ".agenda";

/// Path of the config file under `project_path`
pub fn config_path(project_path: &Path) -> PathBuf {
    project_path.join(AGENDA_DIR).join(CONFIG_FILENAME)
}

/// Load settings from .agenda/config.toml
///
/// A missing file yields defaults; an unreadable or invalid one yields
/// defaults with a warning.
pub fn load_settings(project_path: &Path) -> Settings {
    let config_path = config_path(project_path);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create .agenda/ with a commented default config.toml
///
/// An existing config file is left untouched.
pub fn init_config_dir(project_path: &Path) -> Result<()> {
    let agenda_dir = ensure_agenda_dir(project_path)?;

    let config_path = agenda_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# Agenda Configuration

[session]
auth_debounce_ms = 300        # Log-in / sign-in calls inside this window share one request
refresh_debounce_ms = 1000    # Same for session refreshes
# What reads return after shutdown: "return_session_error" or "return_last_snapshot"
post_dispose_policy = "return_session_error"

# Onboarding steps, in order. auto_advance_ms is optional.
[[onboarding.steps]]
title = "Welcome"
auto_advance_ms = 1500

[[onboarding.steps]]
title = "Notifications"
auto_advance_ms = 1500

[[onboarding.steps]]
title = "Finish"
"#;
        std::fs::write(&config_path, default_content)
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(())
}

/// Save settings to .agenda/config.toml
///
/// Writes to a temp file and renames it over the target.
pub fn save_settings(project_path: &Path, settings: &Settings) -> Result<()> {
    let agenda_dir = ensure_agenda_dir(project_path)?;

    let config_path = agenda_dir.join(CONFIG_FILENAME);
    let temp_path = agenda_dir.join(".config.toml.tmp");

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;
    let full_content = format!("# Agenda Configuration\n\n{}", content);

    std::fs::write(&temp_path, &full_content)
        .map_err(|e| Error::config(format!("Failed to write temp file: {}", e)))?;

    std::fs::rename(&temp_path, &config_path)
        .map_err(|e| Error::config(format!("Failed to rename temp file: {}", e)))?;

    info!("Saved settings to {:?}", config_path);
    Ok(())
}

fn ensure_agenda_dir(project_path: &Path) -> Result<PathBuf> {
    let agenda_dir = project_path.join(AGENDA_DIR);
    if !agenda_dir.exists() {
        std::fs::create_dir_all(&agenda_dir)
            .map_err(|e| Error::config(format!("Failed to create .agenda dir: {}", e)))?;
    }
    Ok(agenda_dir)
}
