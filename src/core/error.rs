//! Error types for the migration control loop.
//!
//! Two families live here:
//! - [`RuleError`] - anomalies raised while resolving a rule for one consumer.
//!   These never escape the handler; it substitutes the hard default instead.
//! - [`MigrationError`] - failures inside the invoker's address-source plumbing.
//!
//! Configuration and CLI code uses `anyhow` instead.

use thiserror::Error;

/// Rule resolution anomalies.
///
/// Returned by [`crate::control::rule::MigrationRule::step`] and
/// [`crate::control::rule::MigrationRule::threshold`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    /// The consumer identity lacks a field needed for matching.
    #[error("consumer identity is missing {field}")]
    MissingIdentity { field: &'static str },

    /// The matching tier carries a threshold that is not a finite number.
    #[error("malformed threshold {value} in {scope} rule")]
    MalformedThreshold { scope: RuleScope, value: f32 },

    /// More than one exact entry targets the same service and they disagree.
    #[error("conflicting migration entries for {service_key}")]
    ConflictingEntries { service_key: String },
}

/// Which tier of a rule a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    /// Fully qualified interface entry (interface, group and version pinned).
    Service,
    /// Interface entry with wildcard group and/or version.
    Interface,
    /// Application-wide entry.
    Application,
    /// Rule-level default.
    Global,
}

impl std::fmt::Display for RuleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Interface => write!(f, "interface"),
            Self::Application => write!(f, "application"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Result type for rule resolution.
pub type RuleResult<T> = Result<T, RuleError>;

/// Address-source and invoker failures.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// No delegate has been installed yet, or every source in the active
    /// delegate is unusable.
    #[error("no active address source for {service}")]
    NoActiveDelegate { service: String },

    /// The factory could not construct an address source.
    #[error("failed to build {kind} address source for {service}: {message}")]
    SourceConstruction {
        kind: crate::control::source::SourceKind,
        service: String,
        message: String,
    },

    /// The requested transition has no meaning for the invoker's capability.
    #[error("{capability} invoker cannot migrate to {step}")]
    UnsupportedTransition {
        capability: crate::control::invoker::InvokerCapability,
        step: crate::control::step::MigrationStep,
    },

    /// The invoker has been destroyed.
    #[error("invoker for {service} has been destroyed")]
    Destroyed { service: String },

    /// Rule resolution failed inside the invoker.
    #[error(transparent)]
    Rule(#[from] RuleError),
}

impl MigrationError {
    /// Create a SourceConstruction error.
    pub fn source_construction(
        kind: crate::control::source::SourceKind,
        service: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SourceConstruction {
            kind,
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether retrying after the next address notification could help.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::NoActiveDelegate { .. } | Self::SourceConstruction { .. }
        )
    }
}

/// Result type using MigrationError.
pub type MigrationResult<T> = Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::source::SourceKind;

    #[test]
    fn rule_error_messages_name_the_scope() {
        let err = RuleError::MalformedThreshold {
            scope: RuleScope::Application,
            value: f32::NAN,
        };
        assert!(err.to_string().contains("application"));

        let err = RuleError::MissingIdentity {
            field: "service interface",
        };
        assert_eq!(
            err.to_string(),
            "consumer identity is missing service interface"
        );
    }

    #[test]
    fn retriable_classification() {
        let err = MigrationError::source_construction(
            SourceKind::Application,
            "demo.Greeter",
            "registry offline",
        );
        assert!(err.is_retriable());

        let err = MigrationError::Destroyed {
            service: "demo.Greeter".into(),
        };
        assert!(!err.is_retriable());
    }
}
