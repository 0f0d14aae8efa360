//! Config command implementation.

use crate::core::config::{Config, ConfigOverrides};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate configuration file.
    Validate {
        /// Config file path.
        #[arg(short, long, default_value = "config/waypoint.toml")]
        config: PathBuf,
    },
    /// Print configuration with defaults filled in.
    Show {
        /// Config file path.
        #[arg(short, long, default_value = "config/waypoint.toml")]
        config: PathBuf,
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Generate a configuration template.
    Generate {
        /// Output file path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs, overrides: &ConfigOverrides) -> Result<()> {
    match args.command {
        ConfigCommand::Validate { config } => validate_config(&config, overrides),
        ConfigCommand::Show { config, format } => show_config(&config, &format, overrides),
        ConfigCommand::Generate { output } => generate_config(output.as_deref()),
    }
}

fn load(path: &Path, overrides: &ConfigOverrides) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }
    let mut config = Config::from_file(path)?;
    config.apply_overrides(overrides);
    config.validate().context("invalid configuration after overrides")?;
    Ok(config)
}

fn validate_config(path: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config = load(path, overrides)?;
    let defaults = config.migration_defaults()?;

    println!("✓ Config file is valid");
    println!(
        "  default step: {} (threshold {})",
        defaults.step, defaults.threshold
    );
    println!("  takeover mode: {}", config.takeover_mode()?);
    if !config.reporter.enabled {
        println!("  ⚠ Warning: status reporting disabled");
    }
    Ok(())
}

fn show_config(path: &Path, format: &str, overrides: &ConfigOverrides) -> Result<()> {
    let config = load(path, overrides)?;
    let rendered = match format {
        "json" => serde_json::to_string_pretty(&config)?,
        _ => toml::to_string_pretty(&config)?,
    };
    println!("{}", rendered);
    Ok(())
}

fn generate_config(output: Option<&Path>) -> Result<()> {
    let template = generate_template();
    match output {
        Some(path) => {
            std::fs::write(path, &template)?;
            println!("Generated config template: {:?}", path);
        }
        None => println!("{}", template),
    }
    Ok(())
}

fn generate_template() -> String {
    r#"# Waypoint Configuration

[migration]
# FORCE_INTERFACE | APPLICATION_FIRST | FORCE_APPLICATION
default_step = "APPLICATION_FIRST"
# Negative means no threshold constraint.
default_threshold = -1.0

[reporter]
enabled = true
queue_capacity = 1024

[lifecycle]
# manual | externally_managed
takeover_mode = "externally_managed"

[telemetry]
log_level = "info"
json_output = false
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_and_validates() {
        let config = Config::from_toml(&generate_template()).unwrap();
        assert_eq!(config.migration.default_step, "APPLICATION_FIRST");
        assert_eq!(config.reporter.queue_capacity, 1024);
    }

    #[test]
    fn overrides_are_revalidated() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), generate_template()).unwrap();

        let overrides = ConfigOverrides {
            default_step: Some("SOMETIMES".into()),
            ..Default::default()
        };
        assert!(load(file.path(), &overrides).is_err());

        let overrides = ConfigOverrides {
            default_step: Some("FORCE_INTERFACE".into()),
            ..Default::default()
        };
        let config = load(file.path(), &overrides).unwrap();
        assert_eq!(config.migration.default_step, "FORCE_INTERFACE");
    }
}
