//! Address sources the migration invoker swaps between.
//!
//! An [`AddressDelegate`] wraps one discovery mechanism's live address set.
//! Polling, watching and load balancing over that set belong to the delegate;
//! the invoker only asks how many addresses it has and whether it is usable.
//!
//! The invoker publishes an [`ActiveDelegate`] snapshot behind an `Arc`. A
//! request clones the `Arc` once and routes against that snapshot until it
//! completes, so a swap never changes the source under an in-flight call.

use crate::control::identity::ConsumerIdentity;
use crate::core::error::MigrationResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which discovery mechanism a delegate is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Interface-level registry subscription.
    Interface,
    /// Application-level service discovery.
    Application,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interface => write!(f, "interface"),
            Self::Application => write!(f, "application"),
        }
    }
}

/// A live address source for one consumer.
pub trait AddressDelegate: Send + Sync {
    /// The mechanism backing this source.
    fn kind(&self) -> SourceKind;

    /// Number of addresses currently known.
    fn address_count(&self) -> usize;

    /// Whether at least one address is usable right now.
    fn is_available(&self) -> bool;

    /// Release the subscription. Called once no request holds the source.
    fn destroy(&self);
}

/// Builds address sources on demand.
pub trait DelegateFactory: Send + Sync {
    /// Subscribe to the interface-level registry for `consumer`.
    fn interface_delegate(
        &self,
        consumer: &ConsumerIdentity,
    ) -> MigrationResult<Arc<dyn AddressDelegate>>;

    /// Subscribe to application-level service discovery for `consumer`.
    fn application_delegate(
        &self,
        consumer: &ConsumerIdentity,
    ) -> MigrationResult<Arc<dyn AddressDelegate>>;
}

/// Decides whether a candidate source is good enough to replace another.
pub trait AddressComparator: Send + Sync {
    /// `candidate` is the source being switched to, `current` the one it would
    /// replace (if any).
    fn should_migrate(
        &self,
        candidate: &dyn AddressDelegate,
        current: Option<&dyn AddressDelegate>,
        threshold: f32,
    ) -> bool;
}

/// Ratio comparator: the candidate must hold at least `threshold` times the
/// current source's address count.
///
/// - candidate empty or unavailable: reject
/// - no current source, or current source empty: accept
/// - negative threshold: accept
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAddressComparator;

impl AddressComparator for DefaultAddressComparator {
    fn should_migrate(
        &self,
        candidate: &dyn AddressDelegate,
        current: Option<&dyn AddressDelegate>,
        threshold: f32,
    ) -> bool {
        let candidate_count = candidate.address_count();
        if candidate_count == 0 || !candidate.is_available() {
            return false;
        }

        let current_count = match current {
            Some(current) => current.address_count(),
            None => return true,
        };
        if current_count == 0 || threshold < 0.0 {
            return true;
        }

        (candidate_count as f64 / current_count as f64) >= f64::from(threshold)
    }
}

/// The delegate a migration invoker currently routes through.
#[derive(Clone)]
pub enum ActiveDelegate {
    /// Nothing installed yet.
    Empty,
    /// Interface-level source only.
    Interface(Arc<dyn AddressDelegate>),
    /// Application-level source only.
    Application(Arc<dyn AddressDelegate>),
    /// Both sources; each request picks one through the comparator.
    Dual {
        interface: Option<Arc<dyn AddressDelegate>>,
        application: Option<Arc<dyn AddressDelegate>>,
        threshold: f32,
        comparator: Arc<dyn AddressComparator>,
    },
}

impl ActiveDelegate {
    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Interface(_) => "interface",
            Self::Application(_) => "application",
            Self::Dual { .. } => "dual",
        }
    }

    /// Pick the source a single request should use.
    ///
    /// In dual mode the application source is preferred when the comparator
    /// accepts it against the interface source; otherwise the interface source
    /// is used if available, falling back to any usable source.
    pub fn select(&self) -> Option<&Arc<dyn AddressDelegate>> {
        match self {
            Self::Empty => None,
            Self::Interface(delegate) | Self::Application(delegate) => Some(delegate),
            Self::Dual {
                interface,
                application,
                threshold,
                comparator,
            } => {
                if let Some(app) = application {
                    if comparator.should_migrate(app.as_ref(), interface.as_deref(), *threshold) {
                        return Some(app);
                    }
                }
                match interface {
                    Some(iface) if iface.is_available() => Some(iface),
                    _ => application
                        .as_ref()
                        .filter(|app| app.is_available())
                        .or(interface.as_ref()),
                }
            }
        }
    }

    /// Threshold used for per-request arbitration, if in dual mode.
    pub fn threshold(&self) -> Option<f32> {
        match self {
            Self::Dual { threshold, .. } => Some(*threshold),
            _ => None,
        }
    }
}

impl Default for ActiveDelegate {
    fn default() -> Self {
        Self::Empty
    }
}

impl std::fmt::Debug for ActiveDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dual { threshold, .. } => f
                .debug_struct("Dual")
                .field("threshold", threshold)
                .finish_non_exhaustive(),
            other => f.write_str(other.label()),
        }
    }
}
