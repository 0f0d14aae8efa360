//! Waypoint - address discovery migration control for RPC consumers.
//!
//! An RPC consumer can discover provider addresses two ways: per-interface
//! registrations or per-application registrations. Waypoint moves each
//! consumer between those two models at runtime, driven by rule snapshots
//! pushed from a configuration channel, without dropping in-flight calls.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Rule distribution channel                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │ MigrationRule snapshots
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     MigrationRuleListener                       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │ one per consumer
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   MigrationRuleHandler  →  MigrationInvoker  →  StatusReporter  │
//! │   (resolve, dedupe)        (swap sources)       (fire & forget) │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │         Interface-level source  │  Application-level source     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types
//! - [`core::lifecycle`] - Host lifecycle coupling
//! - [`core::runtime`] - Client runtime orchestration
//!
//! ## Control
//! - [`control::step`] - Migration steps
//! - [`control::identity`] - Consumer identity
//! - [`control::rule`] - Rule snapshots and resolution
//! - [`control::source`] - Address sources and comparators
//! - [`control::invoker`] - Source-swapping invoker
//! - [`control::handler`] - Per-consumer migration handler
//! - [`control::listener`] - Rule fan-out
//!
//! ## Operations
//! - [`ops::report`] - Migration status reports
//! - [`ops::telemetry`] - Tracing initialization
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - A handler never reports success for a transition the invoker rejected.
//! - Committed state changes only after the invoker accepted the transition.
//! - Transitions for one consumer never overlap.
//! - A retired address source is destroyed only after its last in-flight
//!   request released it.

// Core infrastructure
pub mod core;

// Migration control loop
pub mod control;

// Operations and observability
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, lifecycle, runtime};
pub use control::{handler, identity, invoker, listener, rule, source, step};
pub use ops::{report, telemetry};
