//! Per-consumer migration rule handler.
//!
//! One [`MigrationRuleHandler`] is bound to one consumer and its invoker. Each
//! pushed rule runs through [`MigrationRuleHandler::do_migrate`]:
//!
//! 1. An application-only invoker always gets `(FORCE_APPLICATION, 1.0)`.
//! 2. Otherwise step and threshold are resolved from the rule; a resolution
//!    anomaly is logged and replaced by the configured default for that field.
//! 3. The matching invoker transition runs unless the resolved pair equals the
//!    committed pair.
//! 4. On success the rule is handed to the invoker, even when no transition
//!    was needed.
//!
//! The whole sequence holds the handler's lock. Concurrent pushes for the same
//! consumer queue up and each evaluates against whatever the previous one
//! committed.

use crate::control::identity::ConsumerIdentity;
use crate::control::invoker::{InvokerCapability, MigrationClusterInvoker};
use crate::control::rule::{MigrationDefaults, MigrationRule};
use crate::control::step::MigrationStep;
use crate::ops::report::{MigrationStepReport, NoopReporter, StatusReporter};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Threshold forced on application-only invokers.
pub const APPLICATION_ONLY_THRESHOLD: f32 = 1.0;

/// The last successfully applied transition for a consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumerMigrationState {
    pub consumer: ConsumerIdentity,
    /// `None` until the first successful migration.
    pub current_step: Option<MigrationStep>,
    pub current_threshold: f32,
}

impl ConsumerMigrationState {
    /// State of a consumer that has not migrated yet.
    pub fn new(consumer: ConsumerIdentity) -> Self {
        Self {
            consumer,
            current_step: None,
            current_threshold: 0.0,
        }
    }

    fn matches(&self, step: MigrationStep, threshold: f32) -> bool {
        self.current_step == Some(step) && self.current_threshold == threshold
    }
}

/// What a single `do_migrate` call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MigrationOutcome {
    /// Resolved pair already committed; no transition ran.
    Unchanged { step: MigrationStep, threshold: f32 },
    /// Transition ran and was committed.
    Migrated {
        from: Option<MigrationStep>,
        to: MigrationStep,
        threshold: f32,
    },
    /// Transition ran and the invoker refused it; nothing was committed.
    Rejected { step: MigrationStep, threshold: f32 },
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Applies migration rules to one consumer's invoker.
pub struct MigrationRuleHandler<I: MigrationClusterInvoker + ?Sized> {
    invoker: Arc<I>,
    consumer: ConsumerIdentity,
    reporter: Arc<dyn StatusReporter>,
    defaults: MigrationDefaults,
    state: Mutex<ConsumerMigrationState>,
}

impl<I: MigrationClusterInvoker + ?Sized> MigrationRuleHandler<I> {
    pub fn new(invoker: Arc<I>, consumer: ConsumerIdentity) -> Self {
        let state = ConsumerMigrationState::new(consumer.clone());
        Self {
            invoker,
            consumer,
            reporter: Arc::new(NoopReporter),
            defaults: MigrationDefaults::default(),
            state: Mutex::new(state),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Values substituted when a rule does not resolve a field.
    pub fn with_defaults(mut self, defaults: MigrationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn consumer(&self) -> &ConsumerIdentity {
        &self.consumer
    }

    pub fn invoker(&self) -> &Arc<I> {
        &self.invoker
    }

    /// Snapshot of the committed state.
    pub fn state(&self) -> ConsumerMigrationState {
        self.state.lock().clone()
    }

    /// Apply a rule snapshot.
    pub fn do_migrate(&self, rule: &Arc<MigrationRule>) -> MigrationOutcome {
        let mut state = self.state.lock();

        let (step, threshold) = if self.invoker.capability() == InvokerCapability::ApplicationOnly
        {
            (MigrationStep::ForceApplication, APPLICATION_ONLY_THRESHOLD)
        } else {
            self.resolve(rule)
        };

        let outcome = self.refresh_invoker(&mut state, step, threshold, rule);
        if outcome.is_success() {
            self.invoker.set_migration_rule(rule);
        }
        outcome
    }

    fn resolve(&self, rule: &MigrationRule) -> (MigrationStep, f32) {
        let step = rule
            .step(&self.consumer, &self.defaults)
            .unwrap_or_else(|err| {
                tracing::error!(
                    service = %self.consumer.display_service_key(),
                    rule = ?rule.key,
                    error = %err,
                    "failed to resolve migration step"
                );
                self.defaults.step
            });
        let threshold = rule
            .threshold(&self.consumer, &self.defaults)
            .unwrap_or_else(|err| {
                tracing::error!(
                    service = %self.consumer.display_service_key(),
                    rule = ?rule.key,
                    error = %err,
                    "failed to resolve migration threshold"
                );
                self.defaults.threshold
            });
        (step, threshold)
    }

    fn refresh_invoker(
        &self,
        state: &mut ConsumerMigrationState,
        step: MigrationStep,
        threshold: f32,
        rule: &Arc<MigrationRule>,
    ) -> MigrationOutcome {
        // Resolution never yields NaN; reaching here with one is a bug in the
        // resolution layer, and NaN would also defeat the equality check below.
        assert!(
            !threshold.is_nan(),
            "migration threshold for {} must be a number",
            self.consumer.service_key()
        );

        if state.matches(step, threshold) {
            tracing::debug!(
                service = %self.consumer.display_service_key(),
                %step,
                threshold,
                "migration rule unchanged"
            );
            return MigrationOutcome::Unchanged { step, threshold };
        }

        let origin = state.current_step;
        let success = match step {
            MigrationStep::ApplicationFirst => {
                self.invoker.migrate_to_application_first_invoker(rule);
                true
            }
            MigrationStep::ForceApplication => {
                self.invoker.migrate_to_force_application_invoker(rule)
            }
            MigrationStep::ForceInterface => self.invoker.migrate_to_force_interface_invoker(rule),
        };

        if success {
            state.current_step = Some(step);
            state.current_threshold = threshold;
            self.invoker.set_migration_step(step);
            tracing::info!(
                service = %self.consumer.display_service_key(),
                %step,
                threshold,
                "migrated to {} mode",
                step
            );
            self.report(origin, step, true);
            MigrationOutcome::Migrated {
                from: origin,
                to: step,
                threshold,
            }
        } else {
            tracing::warn!(
                service = %self.consumer.display_service_key(),
                %step,
                threshold,
                "migration to {} mode failed; threshold {} not satisfied, re-publish the rule after checking address sources",
                step,
                threshold
            );
            self.report(origin, step, false);
            MigrationOutcome::Rejected { step, threshold }
        }
    }

    fn report(&self, origin: Option<MigrationStep>, step: MigrationStep, success: bool) {
        if self.reporter.has_reporter() {
            self.reporter.report(MigrationStepReport::new(
                &self.consumer,
                origin,
                step,
                success,
            ));
        }
    }
}

impl<I: MigrationClusterInvoker + ?Sized> std::fmt::Debug for MigrationRuleHandler<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRuleHandler")
            .field("consumer", &self.consumer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
