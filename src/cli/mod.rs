//! Command-line interface.

pub mod commands;

use crate::core::config::ConfigOverrides;
use clap::{Parser, Subcommand};

/// Waypoint - address discovery migration control for RPC consumers.
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Override the default migration step.
    #[arg(long, global = true)]
    pub default_step: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Config overrides carried by global flags.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            default_step: self.default_step.clone(),
            reporter_enabled: None,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configuration operations.
    Config(commands::ConfigArgs),
}
