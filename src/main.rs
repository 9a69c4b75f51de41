//! Agenda - reactive session and onboarding runner
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;

use agenda::headless::{DEMO_EMAIL, DEMO_PASSWORD};
use agenda::{Output, RunOptions};
use agenda_app::config::init_config_dir;
use agenda_core::logging::{self, LogOptions};

/// Agenda - drive a session and onboarding flow from the command line
#[derive(Parser, Debug)]
#[command(name = "agenda")]
#[command(about = "Reactive session and onboarding runner", long_about = None)]
struct Args {
    /// Project directory holding .agenda/config.toml
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Run in headless mode (NDJSON output)
    #[arg(long)]
    headless: bool,

    /// Log in with this email
    #[arg(long = "log-in", value_name = "EMAIL")]
    log_in: Option<String>,

    /// Password for --log-in
    #[arg(long, value_name = "PASSWORD", requires = "log_in")]
    password: Option<String>,

    /// Log in with the built-in demo account
    #[arg(long, conflicts_with = "log_in")]
    demo: bool,

    /// Simulated backend latency in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 0)]
    latency_ms: u64,

    /// Write a default .agenda/config.toml if none exists, then exit
    #[arg(long)]
    init: bool,

    /// Directory for log files (defaults to the platform data dir)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    // Get base path from args or use current directory
    let base_path = args
        .path
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if args.init {
        init_config_dir(&base_path)?;
        eprintln!("Wrote {}", agenda_app::config::config_path(&base_path).display());
        return Ok(());
    }

    // Warnings go to stderr in text mode only; headless stdout/stderr stay clean
    let log_options = LogOptions {
        log_dir: args.log_dir,
        stderr: !args.headless,
    };
    logging::init(&log_options)?;

    let credentials = if args.demo {
        Some((DEMO_EMAIL.to_string(), DEMO_PASSWORD.to_string()))
    } else {
        args.log_in
            .map(|email| (email, args.password.unwrap_or_default()))
    };

    let options = RunOptions {
        output: if args.headless {
            Output::Json
        } else {
            Output::Text
        },
        credentials,
        latency: Duration::from_millis(args.latency_ms),
    };

    agenda::run(&base_path, options).await?;
    Ok(())
}
