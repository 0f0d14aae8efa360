//! Waypoint - unified CLI entrypoint.
//!
//! Usage:
//!   waypoint config validate --config config/waypoint.toml
//!   waypoint config show --config config/waypoint.toml [--format json]
//!   waypoint config generate [--output FILE]

use anyhow::Result;
use clap::Parser;
use waypoint::cli::commands::run_config;
use waypoint::cli::{Cli, Commands};
use waypoint::core::config::TelemetryConfig;
use waypoint::ops::telemetry::init_tracing;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let telemetry = TelemetryConfig {
        log_level: cli.log_level.clone().unwrap_or_else(|| "warn".to_string()),
        ..Default::default()
    };
    init_tracing(&telemetry)?;

    let overrides = cli.overrides();
    match cli.command {
        Commands::Config(args) => run_config(args, &overrides),
    }
}
