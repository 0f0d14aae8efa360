//! CLI command implementations.

mod config;

pub use config::{run_config, ConfigArgs, ConfigCommand};
