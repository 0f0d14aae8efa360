//! Migration invoker: the request-routing facade that hot-swaps address sources.
//!
//! # Swap Discipline
//!
//! The active delegate lives behind `RwLock<Arc<ActiveDelegate>>`. A swap builds
//! the replacement completely, then replaces the `Arc` in one write. Requests
//! take the read lock only long enough to clone the `Arc` and pick a source,
//! so they never observe a half-built delegate and keep routing through the
//! source they picked even if a swap lands mid-request.
//!
//! Every source handed out by the [`DelegateFactory`] is wrapped so that its
//! subscription is released when the last holder drops it: the invoker's own
//! slot, a published snapshot, or an in-flight request. An abandoned source is
//! therefore torn down asynchronously with respect to the swap.

use crate::control::identity::ConsumerIdentity;
use crate::control::rule::{MigrationDefaults, MigrationRule};
use crate::control::source::{
    ActiveDelegate, AddressComparator, AddressDelegate, DefaultAddressComparator, DelegateFactory,
    SourceKind,
};
use crate::control::step::MigrationStep;
use crate::core::error::{MigrationError, MigrationResult};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which address sources an invoker can ever use.
///
/// Set at construction and queried directly by the rule handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvokerCapability {
    /// Both interface-level and application-level discovery.
    Dual,
    /// Application-level discovery only; no interface fallback exists.
    ApplicationOnly,
    /// Interface-level registry only.
    InterfaceOnly,
}

impl std::fmt::Display for InvokerCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dual => write!(f, "dual"),
            Self::ApplicationOnly => write!(f, "application-only"),
            Self::InterfaceOnly => write!(f, "interface-only"),
        }
    }
}

/// The operations a rule handler drives on an invoker.
pub trait MigrationClusterInvoker: Send + Sync {
    /// Capability tag fixed at construction.
    fn capability(&self) -> InvokerCapability;

    /// Subscribe to both sources and arbitrate per request. Never fails.
    fn migrate_to_application_first_invoker(&self, rule: &Arc<MigrationRule>);

    /// Route only through application-level discovery.
    ///
    /// Returns false, leaving the active delegate untouched, when the
    /// application source does not meet the rule's threshold.
    fn migrate_to_force_application_invoker(&self, rule: &Arc<MigrationRule>) -> bool;

    /// Route only through the interface-level registry. Same contract as
    /// [`Self::migrate_to_force_application_invoker`].
    fn migrate_to_force_interface_invoker(&self, rule: &Arc<MigrationRule>) -> bool;

    /// Remember the latest rule for later threshold checks.
    fn set_migration_rule(&self, rule: &Arc<MigrationRule>);

    /// Remember the committed step.
    fn set_migration_step(&self, step: MigrationStep);
}

/// Releases the wrapped source's subscription when dropped.
struct ManagedSource {
    inner: Arc<dyn AddressDelegate>,
    released: AtomicBool,
}

impl ManagedSource {
    fn wrap(inner: Arc<dyn AddressDelegate>) -> Arc<dyn AddressDelegate> {
        Arc::new(Self {
            inner,
            released: AtomicBool::new(false),
        })
    }
}

impl AddressDelegate for ManagedSource {
    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    fn address_count(&self) -> usize {
        self.inner.address_count()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn destroy(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.inner.destroy();
        }
    }
}

impl Drop for ManagedSource {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[derive(Default)]
struct InvokerState {
    interface: Option<Arc<dyn AddressDelegate>>,
    application: Option<Arc<dyn AddressDelegate>>,
    rule: Option<Arc<MigrationRule>>,
    step: Option<MigrationStep>,
    destroyed: bool,
}

impl InvokerState {
    fn slot(&mut self, kind: SourceKind) -> &mut Option<Arc<dyn AddressDelegate>> {
        match kind {
            SourceKind::Interface => &mut self.interface,
            SourceKind::Application => &mut self.application,
        }
    }
}

/// Concrete migration invoker for one consumer.
pub struct MigrationInvoker {
    consumer: ConsumerIdentity,
    capability: InvokerCapability,
    factory: Arc<dyn DelegateFactory>,
    comparator: Arc<dyn AddressComparator>,
    defaults: MigrationDefaults,
    /// Serializes transitions and guards the source slots.
    state: Mutex<InvokerState>,
    /// Published routing snapshot.
    active: RwLock<Arc<ActiveDelegate>>,
}

impl MigrationInvoker {
    /// Create an invoker with the default ratio comparator.
    pub fn new(
        consumer: ConsumerIdentity,
        capability: InvokerCapability,
        factory: Arc<dyn DelegateFactory>,
    ) -> Self {
        Self {
            consumer,
            capability,
            factory,
            comparator: Arc::new(DefaultAddressComparator),
            defaults: MigrationDefaults::default(),
            state: Mutex::new(InvokerState::default()),
            active: RwLock::new(Arc::new(ActiveDelegate::Empty)),
        }
    }

    /// Replace the address comparator.
    pub fn with_comparator(mut self, comparator: Arc<dyn AddressComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Defaults used when a rule sets no threshold for this consumer.
    pub fn with_defaults(mut self, defaults: MigrationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn consumer(&self) -> &ConsumerIdentity {
        &self.consumer
    }

    /// The last rule given through [`MigrationClusterInvoker::set_migration_rule`].
    pub fn migration_rule(&self) -> Option<Arc<MigrationRule>> {
        self.state.lock().rule.clone()
    }

    /// The last committed step.
    pub fn migration_step(&self) -> Option<MigrationStep> {
        self.state.lock().step
    }

    /// Current routing snapshot.
    pub fn active(&self) -> Arc<ActiveDelegate> {
        self.active.read().clone()
    }

    /// Pick the source for one request.
    ///
    /// The returned handle keeps the source alive for as long as the caller
    /// holds it, regardless of concurrent swaps.
    pub fn route(&self) -> MigrationResult<Arc<dyn AddressDelegate>> {
        let snapshot = self.active();
        if let Some(delegate) = snapshot.select() {
            return Ok(delegate.clone());
        }

        let service = self.consumer.service_key();
        if self.is_destroyed() {
            Err(MigrationError::Destroyed { service })
        } else {
            Err(MigrationError::NoActiveDelegate { service })
        }
    }

    /// Run `call` against the source picked for this request.
    pub fn invoke<R>(&self, call: impl FnOnce(&dyn AddressDelegate) -> R) -> MigrationResult<R> {
        let delegate = self.route()?;
        Ok(call(delegate.as_ref()))
    }

    /// Drop every source and stop routing.
    ///
    /// Sources still held by in-flight requests are released when those
    /// requests finish.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        state.interface = None;
        state.application = None;
        self.publish(ActiveDelegate::Empty);
        tracing::info!(service = %self.consumer.service_key(), "migration invoker destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Threshold `rule` sets for this consumer.
    pub fn resolved_threshold(&self, rule: &MigrationRule) -> MigrationResult<f32> {
        Ok(rule.threshold(&self.consumer, &self.defaults)?)
    }

    fn threshold_for(&self, rule: &MigrationRule) -> f32 {
        self.resolved_threshold(rule)
            .unwrap_or_else(|err| {
                tracing::warn!(
                    service = %self.consumer.service_key(),
                    error = %err,
                    "falling back to default migration threshold"
                );
                self.defaults.threshold
            })
    }

    /// Return the source of `kind`, building it if it does not exist yet.
    fn ensure_source(
        &self,
        state: &mut InvokerState,
        kind: SourceKind,
    ) -> Option<Arc<dyn AddressDelegate>> {
        if let Some(existing) = state.slot(kind) {
            return Some(existing.clone());
        }

        let built = match kind {
            SourceKind::Interface => self.factory.interface_delegate(&self.consumer),
            SourceKind::Application => self.factory.application_delegate(&self.consumer),
        };
        match built {
            Ok(delegate) => {
                tracing::debug!(
                    service = %self.consumer.service_key(),
                    source = %kind,
                    addresses = delegate.address_count(),
                    "address source subscribed"
                );
                let delegate = ManagedSource::wrap(delegate);
                *state.slot(kind) = Some(delegate.clone());
                Some(delegate)
            }
            Err(err) => {
                tracing::warn!(
                    service = %self.consumer.service_key(),
                    source = %kind,
                    error = %err,
                    retriable = err.is_retriable(),
                    "address source unavailable"
                );
                None
            }
        }
    }

    /// Atomically replace the routing snapshot.
    fn publish(&self, next: ActiveDelegate) {
        let next = Arc::new(next);
        let previous = std::mem::replace(&mut *self.active.write(), next.clone());
        if previous.label() != next.label() {
            tracing::info!(
                service = %self.consumer.service_key(),
                from = previous.label(),
                to = next.label(),
                "address source swapped"
            );
        }
    }

    fn dual(
        &self,
        interface: Option<Arc<dyn AddressDelegate>>,
        application: Option<Arc<dyn AddressDelegate>>,
        threshold: f32,
    ) -> ActiveDelegate {
        ActiveDelegate::Dual {
            interface,
            application,
            threshold,
            comparator: self.comparator.clone(),
        }
    }

    fn unsupported(&self, step: MigrationStep) -> bool {
        let err = MigrationError::UnsupportedTransition {
            capability: self.capability,
            step,
        };
        tracing::warn!(service = %self.consumer.service_key(), error = %err, "migration refused");
        false
    }

    /// Shared body of the two forced transitions.
    fn force(&self, target: SourceKind, rule: &MigrationRule) -> bool {
        let mut state = self.state.lock();
        if state.destroyed {
            return false;
        }

        let Some(candidate) = self.ensure_source(&mut state, target) else {
            return false;
        };

        let other = match target {
            SourceKind::Interface => SourceKind::Application,
            SourceKind::Application => SourceKind::Interface,
        };
        let threshold = self.threshold_for(rule);
        let accepted = match self.capability {
            InvokerCapability::Dual => {
                let current = state.slot(other).clone();
                self.comparator
                    .should_migrate(candidate.as_ref(), current.as_deref(), threshold)
            }
            // Single-source invokers have nothing to compare against.
            InvokerCapability::ApplicationOnly | InvokerCapability::InterfaceOnly => true,
        };

        if !accepted {
            // The candidate stays subscribed so it keeps filling in for the
            // next attempt; it is simply not routed to.
            tracing::warn!(
                service = %self.consumer.service_key(),
                source = %target,
                threshold,
                addresses = candidate.address_count(),
                "address source below migration threshold"
            );
            return false;
        }

        let next = match target {
            SourceKind::Interface => ActiveDelegate::Interface(candidate),
            SourceKind::Application => ActiveDelegate::Application(candidate),
        };
        self.publish(next);
        *state.slot(other) = None;
        true
    }
}

impl MigrationClusterInvoker for MigrationInvoker {
    fn capability(&self) -> InvokerCapability {
        self.capability
    }

    fn migrate_to_application_first_invoker(&self, rule: &Arc<MigrationRule>) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        let threshold = self.threshold_for(rule);

        let next = match self.capability {
            InvokerCapability::Dual => {
                let interface = self.ensure_source(&mut state, SourceKind::Interface);
                let application = self.ensure_source(&mut state, SourceKind::Application);
                self.dual(interface, application, threshold)
            }
            InvokerCapability::ApplicationOnly => {
                match self.ensure_source(&mut state, SourceKind::Application) {
                    Some(app) => ActiveDelegate::Application(app),
                    None => return,
                }
            }
            InvokerCapability::InterfaceOnly => {
                match self.ensure_source(&mut state, SourceKind::Interface) {
                    Some(iface) => ActiveDelegate::Interface(iface),
                    None => return,
                }
            }
        };
        self.publish(next);
    }

    fn migrate_to_force_application_invoker(&self, rule: &Arc<MigrationRule>) -> bool {
        if self.capability == InvokerCapability::InterfaceOnly {
            return self.unsupported(MigrationStep::ForceApplication);
        }
        self.force(SourceKind::Application, rule)
    }

    fn migrate_to_force_interface_invoker(&self, rule: &Arc<MigrationRule>) -> bool {
        if self.capability == InvokerCapability::ApplicationOnly {
            return self.unsupported(MigrationStep::ForceInterface);
        }
        self.force(SourceKind::Interface, rule)
    }

    fn set_migration_rule(&self, rule: &Arc<MigrationRule>) {
        let mut state = self.state.lock();
        state.rule = Some(rule.clone());
        if state.destroyed {
            return;
        }

        // Keep dual-mode arbitration in step with the latest threshold.
        let refreshed = match &*self.active() {
            ActiveDelegate::Dual {
                interface,
                application,
                threshold,
                ..
            } => {
                let latest = self.threshold_for(rule);
                (latest != *threshold)
                    .then(|| self.dual(interface.clone(), application.clone(), latest))
            }
            _ => None,
        };
        if let Some(next) = refreshed {
            self.publish(next);
        }
    }

    fn set_migration_step(&self, step: MigrationStep) {
        self.state.lock().step = Some(step);
    }
}

impl std::fmt::Debug for MigrationInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationInvoker")
            .field("consumer", &self.consumer)
            .field("capability", &self.capability)
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}
