//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error types
//! - [`lifecycle`] - Host lifecycle coupling
//! - [`runtime`] - Client runtime orchestration

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod runtime;
