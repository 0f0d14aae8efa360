//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use waypoint::control::identity::ConsumerIdentity;
use waypoint::control::invoker::{InvokerCapability, MigrationClusterInvoker};
use waypoint::control::rule::MigrationRule;
use waypoint::control::source::{AddressDelegate, DelegateFactory, SourceKind};
use waypoint::control::step::MigrationStep;
use waypoint::core::config::Config;
use waypoint::core::error::{MigrationError, MigrationResult};
use waypoint::ops::report::{MigrationStepReport, ReportSink, StatusReporter};

// ============================================================================
// Config helpers
// ============================================================================

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    write_config("")
}

/// Create a configuration with custom settings.
pub fn create_config_with_settings(
    default_step: &str,
    default_threshold: f32,
    log_level: &str,
) -> NamedTempFile {
    let config_content = format!(
        r#"
[migration]
default_step = "{}"
default_threshold = {:?}

[telemetry]
log_level = "{}"
"#,
        default_step, default_threshold, log_level
    );
    write_config(&config_content)
}

/// Write arbitrary TOML to a temp file.
pub fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

// ============================================================================
// Consumers and rules
// ============================================================================

pub fn greeter() -> ConsumerIdentity {
    ConsumerIdentity::new("demo.Greeter", "shop")
        .with_group("blue")
        .with_version("1.0.0")
}

pub fn rule(step: MigrationStep, threshold: f32) -> Arc<MigrationRule> {
    Arc::new(
        MigrationRule::empty()
            .with_key("shop")
            .with_step(step)
            .with_threshold(threshold),
    )
}

// ============================================================================
// Address sources
// ============================================================================

/// Address source whose size is driven by a shared counter.
pub struct FakeDelegate {
    pub kind: SourceKind,
    addresses: Arc<AtomicUsize>,
    destroy_calls: AtomicUsize,
}

impl FakeDelegate {
    pub fn is_destroyed(&self) -> bool {
        self.destroy_calls.load(Ordering::SeqCst) > 0
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }
}

impl AddressDelegate for FakeDelegate {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn address_count(&self) -> usize {
        self.addresses.load(Ordering::SeqCst)
    }

    fn is_available(&self) -> bool {
        self.address_count() > 0
    }

    fn destroy(&self) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out [`FakeDelegate`]s and remembering every one it built.
#[derive(Default)]
pub struct FakeFactory {
    pub interface_addresses: Arc<AtomicUsize>,
    pub application_addresses: Arc<AtomicUsize>,
    pub fail_application: AtomicBool,
    created: Mutex<Vec<Arc<FakeDelegate>>>,
}

impl FakeFactory {
    pub fn with_addresses(interface: usize, application: usize) -> Arc<Self> {
        let factory = Self::default();
        factory.interface_addresses.store(interface, Ordering::SeqCst);
        factory
            .application_addresses
            .store(application, Ordering::SeqCst);
        Arc::new(factory)
    }

    pub fn set_application_addresses(&self, count: usize) {
        self.application_addresses.store(count, Ordering::SeqCst);
    }

    /// Every delegate of `kind` built so far, oldest first.
    pub fn created(&self, kind: SourceKind) -> Vec<Arc<FakeDelegate>> {
        self.created
            .lock()
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }

    fn build(&self, kind: SourceKind, addresses: &Arc<AtomicUsize>) -> Arc<dyn AddressDelegate> {
        let delegate = Arc::new(FakeDelegate {
            kind,
            addresses: addresses.clone(),
            destroy_calls: AtomicUsize::new(0),
        });
        self.created.lock().push(delegate.clone());
        delegate
    }
}

impl DelegateFactory for FakeFactory {
    fn interface_delegate(
        &self,
        _consumer: &ConsumerIdentity,
    ) -> MigrationResult<Arc<dyn AddressDelegate>> {
        Ok(self.build(SourceKind::Interface, &self.interface_addresses))
    }

    fn application_delegate(
        &self,
        consumer: &ConsumerIdentity,
    ) -> MigrationResult<Arc<dyn AddressDelegate>> {
        if self.fail_application.load(Ordering::SeqCst) {
            return Err(MigrationError::source_construction(
                SourceKind::Application,
                consumer.service_key(),
                "discovery unreachable",
            ));
        }
        Ok(self.build(SourceKind::Application, &self.application_addresses))
    }
}

// ============================================================================
// Invokers
// ============================================================================

/// Invoker that records calls and detects overlapping transitions.
pub struct RecordingInvoker {
    capability: InvokerCapability,
    pub force_application_ok: AtomicBool,
    pub force_interface_ok: AtomicBool,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_transition: AtomicBool,
    pub overlapped: AtomicBool,
}

impl RecordingInvoker {
    pub fn new(capability: InvokerCapability) -> Self {
        Self {
            capability,
            force_application_ok: AtomicBool::new(true),
            force_interface_ok: AtomicBool::new(true),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_transition: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
        }
    }

    /// Make every transition take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    fn transition(&self, name: &str, result: bool) -> bool {
        if self.in_transition.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.calls.lock().push(name.to_string());
        self.in_transition.store(false, Ordering::SeqCst);
        result
    }
}

impl MigrationClusterInvoker for RecordingInvoker {
    fn capability(&self) -> InvokerCapability {
        self.capability
    }

    fn migrate_to_application_first_invoker(&self, _rule: &Arc<MigrationRule>) {
        self.transition("application_first", true);
    }

    fn migrate_to_force_application_invoker(&self, _rule: &Arc<MigrationRule>) -> bool {
        let ok = self.force_application_ok.load(Ordering::SeqCst);
        self.transition("force_application", ok)
    }

    fn migrate_to_force_interface_invoker(&self, _rule: &Arc<MigrationRule>) -> bool {
        let ok = self.force_interface_ok.load(Ordering::SeqCst);
        self.transition("force_interface", ok)
    }

    fn set_migration_rule(&self, _rule: &Arc<MigrationRule>) {
        self.calls.lock().push("set_rule".to_string());
    }

    fn set_migration_step(&self, step: MigrationStep) {
        self.calls.lock().push(format!("set_step:{}", step));
    }
}

// ============================================================================
// Reporting
// ============================================================================

/// Reporter that keeps every report in memory.
#[derive(Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<MigrationStepReport>>,
}

impl CollectingReporter {
    pub fn reports(&self) -> Vec<MigrationStepReport> {
        self.reports.lock().clone()
    }
}

impl StatusReporter for CollectingReporter {
    fn has_reporter(&self) -> bool {
        true
    }

    fn report(&self, report: MigrationStepReport) {
        self.reports.lock().push(report);
    }
}

/// Sink that keeps every drained report in memory.
#[derive(Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<MigrationStepReport>>,
}

impl CollectingSink {
    pub fn reports(&self) -> Vec<MigrationStepReport> {
        self.reports.lock().clone()
    }
}

impl ReportSink for CollectingSink {
    fn publish(&self, report: &MigrationStepReport) -> anyhow::Result<()> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}
