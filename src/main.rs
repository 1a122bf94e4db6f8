//! API spine service binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!         │
//!         ▼
//!   request id → trace span → panic capture → deadline → CORS
//!         │
//!         ▼
//!   security headers → body limit → admission gate → routes / 404
//!         │                                              │
//!         │                 Failure ◀────────────────────┘
//!         ▼                    │
//!   Client Response ◀──── dispatch (classify, log once, render)
//!
//!   Cross-cutting: config (env), observability (console or prod sinks),
//!   lifecycle (startup, signals, graceful shutdown)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use axum::Router;
use clap::Parser;

use api_spine::config::{load_with_env_file, ConfigError};
use api_spine::lifecycle;

#[derive(Parser)]
#[command(name = "api-spine")]
#[command(about = "JSON API service with uniform errors, admission control and structured logging", long_about = None)]
struct Cli {
    /// Load variables from this file before reading the environment
    #[arg(short, long)]
    env_file: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_with_env_file(cli.env_file.as_deref()) {
        Ok(settings) => settings,
        Err(ConfigError::Invalid(errors)) => {
            eprintln!("Invalid environment variables:");
            for error in errors {
                eprintln!("  - {error}");
            }
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        println!("Configuration OK ({} environment)", settings.environment);
        return ExitCode::SUCCESS;
    }

    match lifecycle::run(settings, Router::new()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
