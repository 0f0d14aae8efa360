//! Configuration parsing and validation.
//!
//! Waypoint configuration is loaded from TOML files with CLI overrides. Every
//! section is optional; an empty file yields the defaults.

use crate::control::rule::{MigrationDefaults, NO_THRESHOLD};
use crate::control::step::MigrationStep;
use crate::core::lifecycle::TakeoverMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level Waypoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Migration defaults.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Status reporting.
    #[serde(default)]
    pub reporter: ReporterConfig,

    /// Lifecycle ownership.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Telemetry and logging.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Migration defaults applied when a rule does not resolve a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Step used when no rule tier sets one:
    /// "FORCE_INTERFACE", "APPLICATION_FIRST" or "FORCE_APPLICATION".
    #[serde(default = "default_step")]
    pub default_step: String,

    /// Threshold used when no rule tier sets one. Negative means unconstrained.
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            default_step: default_step(),
            default_threshold: default_threshold(),
        }
    }
}

/// Status reporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Emit migration step reports.
    #[serde(default = "default_reporter_enabled")]
    pub enabled: bool,

    /// Reports buffered before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            enabled: default_reporter_enabled(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Lifecycle ownership configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// "manual" or "externally_managed".
    #[serde(default = "default_takeover_mode")]
    pub takeover_mode: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            takeover_mode: default_takeover_mode(),
        }
    }
}

/// Telemetry and logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines.
    #[serde(default)]
    pub json_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_output: false,
        }
    }
}

// Default value functions

fn default_step() -> String {
    MigrationStep::ApplicationFirst.to_string()
}

fn default_threshold() -> f32 {
    NO_THRESHOLD
}

fn default_reporter_enabled() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_takeover_mode() -> String {
    TakeoverMode::ExternallyManaged.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref step) = overrides.default_step {
            self.migration.default_step = step.clone();
        }
        if let Some(enabled) = overrides.reporter_enabled {
            self.reporter.enabled = enabled;
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_migration()?;
        self.validate_reporter()?;
        self.validate_lifecycle()?;
        self.validate_telemetry()?;
        Ok(())
    }

    /// Defaults handed to rule handlers and invokers.
    pub fn migration_defaults(&self) -> Result<MigrationDefaults> {
        let step = self
            .migration
            .default_step
            .parse::<MigrationStep>()
            .context("migration.default_step")?;
        Ok(MigrationDefaults {
            step,
            threshold: self.migration.default_threshold,
        })
    }

    /// Configured lifecycle owner.
    pub fn takeover_mode(&self) -> Result<TakeoverMode> {
        self.lifecycle
            .takeover_mode
            .parse::<TakeoverMode>()
            .context("lifecycle.takeover_mode")
    }

    fn validate_migration(&self) -> Result<()> {
        if self.migration.default_step.parse::<MigrationStep>().is_err() {
            anyhow::bail!(
                "migration.default_step must be one of FORCE_INTERFACE, APPLICATION_FIRST, FORCE_APPLICATION, got: {}",
                self.migration.default_step
            );
        }

        if !self.migration.default_threshold.is_finite() {
            anyhow::bail!(
                "migration.default_threshold must be a finite number, got: {}",
                self.migration.default_threshold
            );
        }

        Ok(())
    }

    fn validate_reporter(&self) -> Result<()> {
        if self.reporter.queue_capacity == 0 {
            anyhow::bail!("reporter.queue_capacity must be > 0");
        }
        Ok(())
    }

    fn validate_lifecycle(&self) -> Result<()> {
        if self.lifecycle.takeover_mode.parse::<TakeoverMode>().is_err() {
            anyhow::bail!(
                "lifecycle.takeover_mode must be 'manual' or 'externally_managed', got: {}",
                self.lifecycle.takeover_mode
            );
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override the default migration step.
    pub default_step: Option<String>,
    /// Override reporter enablement.
    pub reporter_enabled: Option<bool>,
}
