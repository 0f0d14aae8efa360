//! Migration rules and per-consumer resolution.
//!
//! A [`MigrationRule`] is an immutable snapshot pushed by operators. For a given
//! [`ConsumerIdentity`] the step and threshold are resolved independently, each
//! walking the tiers below and taking the first one that sets the field:
//!
//! 1. exact service entry (interface, group and version all pinned and equal)
//! 2. interface entry whose group/version are equal or left as wildcards;
//!    more pinned fields win, then declaration order
//! 3. application entry for the consumer's application
//! 4. rule-level step/threshold
//! 5. [`MigrationDefaults`]
//!
//! Resolution is pure. Anomalies are returned as [`RuleError`] and the caller
//! decides what to substitute.

use crate::control::identity::ConsumerIdentity;
use crate::control::step::MigrationStep;
use crate::core::error::{RuleError, RuleResult, RuleScope};
use serde::{Deserialize, Serialize};

/// Threshold value meaning "no constraint".
pub const NO_THRESHOLD: f32 = -1.0;

/// Values used when no tier of a rule sets a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MigrationDefaults {
    pub step: MigrationStep,
    pub threshold: f32,
}

impl Default for MigrationDefaults {
    fn default() -> Self {
        Self {
            step: MigrationStep::ApplicationFirst,
            threshold: NO_THRESHOLD,
        }
    }
}

/// Per-interface override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceRule {
    pub interface: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub step: Option<MigrationStep>,
    #[serde(default)]
    pub threshold: Option<f32>,
}

impl InterfaceRule {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ..Default::default()
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_step(mut self, step: MigrationStep) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    fn is_exact_for(&self, consumer: &ConsumerIdentity) -> bool {
        self.interface == consumer.interface
            && self.group.is_some()
            && self.version.is_some()
            && self.group == consumer.group
            && self.version == consumer.version
    }

    fn qualifies_for(&self, consumer: &ConsumerIdentity) -> bool {
        self.interface == consumer.interface
            && self.group.as_ref().map_or(true, |g| Some(g) == consumer.group.as_ref())
            && self
                .version
                .as_ref()
                .map_or(true, |v| Some(v) == consumer.version.as_ref())
    }

    fn specificity(&self) -> usize {
        usize::from(self.group.is_some()) + usize::from(self.version.is_some())
    }

    fn service_key(&self) -> String {
        ConsumerIdentity {
            interface: self.interface.clone(),
            group: self.group.clone(),
            version: self.version.clone(),
            application: String::new(),
        }
        .service_key()
    }
}

/// Application-wide override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRule {
    pub application: String,
    #[serde(default)]
    pub step: Option<MigrationStep>,
    #[serde(default)]
    pub threshold: Option<f32>,
}

impl ApplicationRule {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            ..Default::default()
        }
    }

    pub fn with_step(mut self, step: MigrationStep) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// An operator-published migration rule snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationRule {
    /// Rule key, usually the consuming application name.
    #[serde(default)]
    pub key: Option<String>,
    /// Rule-level default step.
    #[serde(default)]
    pub step: Option<MigrationStep>,
    /// Rule-level default threshold.
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceRule>,
    #[serde(default)]
    pub applications: Vec<ApplicationRule>,
}

impl MigrationRule {
    /// A rule that sets nothing; every field resolves to the defaults.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_step(mut self, step: MigrationStep) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_interface(mut self, rule: InterfaceRule) -> Self {
        self.interfaces.push(rule);
        self
    }

    pub fn with_application(mut self, rule: ApplicationRule) -> Self {
        self.applications.push(rule);
        self
    }

    /// Resolve the step for a consumer.
    pub fn step(
        &self,
        consumer: &ConsumerIdentity,
        defaults: &MigrationDefaults,
    ) -> RuleResult<MigrationStep> {
        let resolved = self.resolve_field(consumer, |i| i.step, |a| a.step, self.step)?;
        Ok(resolved.map_or(defaults.step, |(step, _)| step))
    }

    /// Resolve the threshold for a consumer.
    pub fn threshold(
        &self,
        consumer: &ConsumerIdentity,
        defaults: &MigrationDefaults,
    ) -> RuleResult<f32> {
        let resolved =
            self.resolve_field(consumer, |i| i.threshold, |a| a.threshold, self.threshold)?;
        match resolved {
            Some((value, scope)) if !value.is_finite() => {
                Err(RuleError::MalformedThreshold { scope, value })
            }
            Some((value, _)) => Ok(value),
            None => Ok(defaults.threshold),
        }
    }

    fn resolve_field<T: Copy + PartialEq>(
        &self,
        consumer: &ConsumerIdentity,
        from_interface: impl Fn(&InterfaceRule) -> Option<T>,
        from_application: impl Fn(&ApplicationRule) -> Option<T>,
        global: Option<T>,
    ) -> RuleResult<Option<(T, RuleScope)>> {
        if consumer.interface.is_empty() {
            return Err(RuleError::MissingIdentity {
                field: "service interface",
            });
        }

        let mut exact = self
            .interfaces
            .iter()
            .filter(|entry| entry.is_exact_for(consumer))
            .filter_map(|entry| from_interface(entry).map(|value| (entry, value)));
        if let Some((entry, value)) = exact.next() {
            if exact.any(|(_, other)| other != value) {
                return Err(RuleError::ConflictingEntries {
                    service_key: entry.service_key(),
                });
            }
            return Ok(Some((value, RuleScope::Service)));
        }

        // max_by_key keeps the last maximum, so walk in reverse to favour
        // declaration order among equally specific entries.
        let qualified = self
            .interfaces
            .iter()
            .rev()
            .filter(|entry| entry.qualifies_for(consumer))
            .filter_map(|entry| from_interface(entry).map(|value| (entry.specificity(), value)))
            .max_by_key(|(specificity, _)| *specificity);
        if let Some((_, value)) = qualified {
            return Ok(Some((value, RuleScope::Interface)));
        }

        if !consumer.application.is_empty() {
            let application = self
                .applications
                .iter()
                .filter(|entry| entry.application == consumer.application)
                .find_map(from_application);
            if let Some(value) = application {
                return Ok(Some((value, RuleScope::Application)));
            }
        }

        Ok(global.map(|value| (value, RuleScope::Global)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer() -> ConsumerIdentity {
        ConsumerIdentity::new("demo.Greeter", "shop")
            .with_group("blue")
            .with_version("1.0.0")
    }

    #[test]
    fn empty_rule_yields_defaults() {
        let rule = MigrationRule::empty();
        let defaults = MigrationDefaults::default();
        assert_eq!(
            rule.step(&consumer(), &defaults).unwrap(),
            MigrationStep::ApplicationFirst
        );
        assert_eq!(rule.threshold(&consumer(), &defaults).unwrap(), NO_THRESHOLD);
    }

    #[test]
    fn configured_default_step_applies_when_nothing_matches() {
        let rule = MigrationRule::empty();
        let defaults = MigrationDefaults {
            step: MigrationStep::ForceInterface,
            threshold: NO_THRESHOLD,
        };
        assert_eq!(
            rule.step(&consumer(), &defaults).unwrap(),
            MigrationStep::ForceInterface
        );
    }

    #[test]
    fn exact_entry_beats_wildcard_entry() {
        let rule = MigrationRule::empty()
            .with_interface(
                InterfaceRule::new("demo.Greeter").with_step(MigrationStep::ForceInterface),
            )
            .with_interface(
                InterfaceRule::new("demo.Greeter")
                    .with_group("blue")
                    .with_version("1.0.0")
                    .with_step(MigrationStep::ForceApplication),
            );
        let step = rule.step(&consumer(), &MigrationDefaults::default()).unwrap();
        assert_eq!(step, MigrationStep::ForceApplication);
    }

    #[test]
    fn more_pinned_wildcard_entry_wins() {
        let rule = MigrationRule::empty()
            .with_interface(InterfaceRule::new("demo.Greeter").with_threshold(0.1))
            .with_interface(
                InterfaceRule::new("demo.Greeter")
                    .with_group("blue")
                    .with_threshold(0.7),
            );
        let threshold = rule
            .threshold(&consumer(), &MigrationDefaults::default())
            .unwrap();
        assert_eq!(threshold, 0.7);
    }

    #[test]
    fn equally_specific_entries_use_declaration_order() {
        let rule = MigrationRule::empty()
            .with_interface(InterfaceRule::new("demo.Greeter").with_threshold(0.2))
            .with_interface(InterfaceRule::new("demo.Greeter").with_threshold(0.9));
        let threshold = rule
            .threshold(&consumer(), &MigrationDefaults::default())
            .unwrap();
        assert_eq!(threshold, 0.2);
    }

    #[test]
    fn mismatched_group_is_not_a_match() {
        let rule = MigrationRule::empty()
            .with_step(MigrationStep::ForceInterface)
            .with_interface(
                InterfaceRule::new("demo.Greeter")
                    .with_group("green")
                    .with_step(MigrationStep::ForceApplication),
            );
        let step = rule.step(&consumer(), &MigrationDefaults::default()).unwrap();
        assert_eq!(step, MigrationStep::ForceInterface);
    }

    #[test]
    fn fields_resolve_independently_across_tiers() {
        let rule = MigrationRule::empty()
            .with_threshold(0.4)
            .with_interface(
                InterfaceRule::new("demo.Greeter").with_step(MigrationStep::ForceApplication),
            )
            .with_application(ApplicationRule::new("shop").with_threshold(0.8));
        let defaults = MigrationDefaults::default();
        assert_eq!(
            rule.step(&consumer(), &defaults).unwrap(),
            MigrationStep::ForceApplication
        );
        assert_eq!(rule.threshold(&consumer(), &defaults).unwrap(), 0.8);
    }

    #[test]
    fn application_entry_only_for_same_application() {
        let rule = MigrationRule::empty()
            .with_application(ApplicationRule::new("billing").with_threshold(0.8));
        let threshold = rule
            .threshold(&consumer(), &MigrationDefaults::default())
            .unwrap();
        assert_eq!(threshold, NO_THRESHOLD);
    }

    #[test]
    fn malformed_threshold_is_an_error() {
        let rule = MigrationRule::empty()
            .with_application(ApplicationRule::new("shop").with_threshold(f32::INFINITY));
        let err = rule
            .threshold(&consumer(), &MigrationDefaults::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RuleError::MalformedThreshold {
                scope: RuleScope::Application,
                ..
            }
        ));
    }

    #[test]
    fn conflicting_exact_entries_are_an_error() {
        let exact = |step| {
            InterfaceRule::new("demo.Greeter")
                .with_group("blue")
                .with_version("1.0.0")
                .with_step(step)
        };
        let rule = MigrationRule::empty()
            .with_interface(exact(MigrationStep::ForceApplication))
            .with_interface(exact(MigrationStep::ForceInterface));
        let err = rule
            .step(&consumer(), &MigrationDefaults::default())
            .unwrap_err();
        assert_eq!(
            err,
            RuleError::ConflictingEntries {
                service_key: "blue/demo.Greeter:1.0.0".into()
            }
        );
    }

    #[test]
    fn missing_interface_is_an_error() {
        let rule = MigrationRule::empty().with_step(MigrationStep::ForceApplication);
        let anonymous = ConsumerIdentity::new("", "shop");
        assert!(matches!(
            rule.step(&anonymous, &MigrationDefaults::default()),
            Err(RuleError::MissingIdentity { .. })
        ));
    }
}
