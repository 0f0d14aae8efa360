//! Tracing subscriber setup.
//!
//! Logging goes through `tracing` macros everywhere in the crate. Binaries call
//! [`init_tracing`] once; libraries embedding Waypoint install their own
//! subscriber instead.

use crate::core::config::TelemetryConfig;
use anyhow::Result;

/// Install a global subscriber honouring `RUST_LOG`, falling back to the
/// configured level.
#[cfg(feature = "telemetry")]
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    use anyhow::Context;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_output {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .context("tracing subscriber already installed")
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()
            .context("tracing subscriber already installed")
    }
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_config: &TelemetryConfig) -> Result<()> {
    Ok(())
}
