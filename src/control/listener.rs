//! Fan-out of rule snapshots to every bound consumer.
//!
//! The rule distribution channel hands each new snapshot to
//! [`MigrationRuleListener::on_rule`]. The listener remembers the latest rule so
//! a consumer registered afterwards starts from it instead of waiting for the
//! next push.
//!
//! Recording a rule and applying it, and registering a subscriber and
//! replaying to it, run under one apply lock. A subscriber therefore sees
//! rules in the order the listener recorded them and never ends on an older
//! rule than [`MigrationRuleListener::latest_rule`].

use crate::control::handler::{MigrationOutcome, MigrationRuleHandler};
use crate::control::identity::ConsumerIdentity;
use crate::control::invoker::MigrationClusterInvoker;
use crate::control::rule::MigrationRule;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Anything that can apply a rule for one consumer.
pub trait RuleSubscriber: Send + Sync {
    fn consumer(&self) -> &ConsumerIdentity;

    fn do_migrate(&self, rule: &Arc<MigrationRule>) -> MigrationOutcome;
}

impl<I: MigrationClusterInvoker + ?Sized> RuleSubscriber for MigrationRuleHandler<I> {
    fn consumer(&self) -> &ConsumerIdentity {
        MigrationRuleHandler::consumer(self)
    }

    fn do_migrate(&self, rule: &Arc<MigrationRule>) -> MigrationOutcome {
        MigrationRuleHandler::do_migrate(self, rule)
    }
}

/// Registry of rule subscribers keyed by consumer service key.
#[derive(Default)]
pub struct MigrationRuleListener {
    subscribers: RwLock<BTreeMap<String, Arc<dyn RuleSubscriber>>>,
    latest: RwLock<Option<Arc<MigrationRule>>>,
    /// Orders record-and-apply against register-and-replay.
    apply: Mutex<()>,
}

impl MigrationRuleListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and replay the latest rule to it, if any.
    ///
    /// A subscriber already registered for the same service key is replaced.
    pub fn register(&self, subscriber: Arc<dyn RuleSubscriber>) -> Option<MigrationOutcome> {
        let _apply = self.apply.lock();
        let key = subscriber.consumer().service_key();
        let replaced = self
            .subscribers
            .write()
            .insert(key.clone(), subscriber.clone());
        if replaced.is_some() {
            tracing::debug!(service = %key, "replaced migration rule subscriber");
        }

        let latest = self.latest.read().clone();
        latest.map(|rule| subscriber.do_migrate(&rule))
    }

    pub fn unregister(&self, service_key: &str) -> Option<Arc<dyn RuleSubscriber>> {
        self.subscribers.write().remove(service_key)
    }

    /// Record a new rule and apply it to every subscriber.
    ///
    /// Subscribers run one after another on the calling thread. The registry
    /// lock is not held while they run; overlapping calls queue on the apply
    /// lock.
    pub fn on_rule(&self, rule: MigrationRule) -> Vec<(String, MigrationOutcome)> {
        let _apply = self.apply.lock();
        let rule = Arc::new(rule);
        *self.latest.write() = Some(rule.clone());

        let subscribers: Vec<(String, Arc<dyn RuleSubscriber>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(key, sub)| (key.clone(), sub.clone()))
            .collect();

        tracing::info!(
            rule = ?rule.key,
            subscribers = subscribers.len(),
            "applying migration rule"
        );

        subscribers
            .into_iter()
            .map(|(key, sub)| {
                let outcome = sub.do_migrate(&rule);
                (key, outcome)
            })
            .collect()
    }

    pub fn latest_rule(&self) -> Option<Arc<MigrationRule>> {
        self.latest.read().clone()
    }

    pub fn service_keys(&self) -> Vec<String> {
        self.subscribers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Remove every subscriber, returning them.
    pub fn clear(&self) -> Vec<Arc<dyn RuleSubscriber>> {
        std::mem::take(&mut *self.subscribers.write())
            .into_values()
            .collect()
    }
}
