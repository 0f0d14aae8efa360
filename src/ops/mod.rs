//! Operations and observability.
//!
//! - [`report`] - migration status reports and the async report pump
//! - [`telemetry`] - tracing subscriber setup

pub mod report;
pub mod telemetry;
