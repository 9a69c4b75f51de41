//! Logging configuration using tracing
//!
//! Everything goes to a daily rolling file. In text mode warnings and errors
//! are mirrored to stderr as well; headless mode leaves stderr alone so the
//! NDJSON on stdout stays the only console output.

use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// Environment variable controlling the log filter
pub const LOG_ENV_VAR: &str = "AGENDA_LOG";

const LOG_FILE_NAME: &str = "agenda.log";

const DEFAULT_FILTER: &str = "agenda=info,agenda_app=info,agenda_core=info,warn";

/// Where and how logs are written
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Directory for the rolling log file; the platform data dir if unset
    pub log_dir: Option<PathBuf>,
    /// Mirror warnings and errors to stderr
    pub stderr: bool,
}

impl LogOptions {
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_stderr(mut self, stderr: bool) -> Self {
        self.stderr = stderr;
        self
    }

    /// Directory the log file ends up in
    pub fn resolved_log_dir(&self) -> PathBuf {
        match &self.log_dir {
            Some(dir) => dir.clone(),
            None => default_log_directory(),
        }
    }
}

/// Initialize the logging subsystem and return the log directory
///
/// Log level is controlled by the `AGENDA_LOG` environment variable.
///
/// # Examples
/// ```bash
/// AGENDA_LOG=debug agenda --headless --demo
/// AGENDA_LOG=agenda_app::session=trace agenda --log-in ana@example.com --password secret
/// ```
pub fn init(options: &LogOptions) -> Result<PathBuf> {
    let log_dir = prepare_log_dir(&options.resolved_log_dir())?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    let stderr_layer = options.stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .with_filter(LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .with(stderr_layer)
        .try_init()
        .map_err(|e| Error::config(format!("Logging already initialized: {}", e)))?;

    tracing::info!("Agenda logging to {}", log_dir.display());
    Ok(log_dir)
}

/// Filter from `AGENDA_LOG`, falling back to info for our crates
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Create `dir` if needed; refuse a path that is an existing file
fn prepare_log_dir(dir: &Path) -> Result<PathBuf> {
    if dir.is_file() {
        return Err(Error::config(format!(
            "Log directory {} is a file",
            dir.display()
        )));
    }
    std::fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}

fn default_log_directory() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("agenda").join("logs")
}

/// Path of the log file inside `options`' directory
pub fn current_log_file(options: &LogOptions) -> PathBuf {
    options.resolved_log_dir().join(LOG_FILE_NAME)
}
