//! Client runtime orchestration.
//!
//! [`ClientRuntime`] is the explicit process-level handle for the migration
//! control loop. It binds consumers (invoker + rule handler), routes rule
//! snapshots to them, and owns the status-report pump.
//!
//! - Start order: initialize → spawn report pump
//! - Shutdown order: signal pump → tear down invokers → drop subscribers

use crate::control::handler::MigrationRuleHandler;
use crate::control::identity::ConsumerIdentity;
use crate::control::invoker::{InvokerCapability, MigrationInvoker};
use crate::control::listener::{MigrationRuleListener, RuleSubscriber};
use crate::control::rule::{MigrationDefaults, MigrationRule};
use crate::control::source::DelegateFactory;
use crate::core::config::Config;
use crate::core::lifecycle::{Bootstrap, TakeoverMode};
use crate::ops::report::{
    report_channel, LogSink, NoopReporter, ReportPump, ReportSink, StatusReporter,
};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Runtime phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimePhase {
    /// Constructed, nothing initialized.
    Created,
    /// Initialized; consumers may bind, reports queue up.
    Initialized,
    /// Report pump running.
    Running,
    /// Stopped; no further binding.
    Stopped,
}

/// A consumer bound to the runtime.
pub type BoundHandler = MigrationRuleHandler<MigrationInvoker>;

/// Process-level handle for the migration control loop.
pub struct ClientRuntime {
    config: Arc<Config>,
    defaults: MigrationDefaults,
    takeover: Mutex<TakeoverMode>,
    phase: Mutex<RuntimePhase>,
    listener: Arc<MigrationRuleListener>,
    reporter: Arc<dyn StatusReporter>,
    sink: Arc<dyn ReportSink>,
    pump: Mutex<Option<ReportPump>>,
    pump_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    handlers: Mutex<Vec<Arc<BoundHandler>>>,
}

impl ClientRuntime {
    /// Create a runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let defaults = config.migration_defaults()?;
        let takeover = config.takeover_mode()?;

        let (reporter, pump): (Arc<dyn StatusReporter>, Option<ReportPump>) =
            if config.reporter.enabled {
                let (reporter, pump) = report_channel(config.reporter.queue_capacity);
                (Arc::new(reporter), Some(pump))
            } else {
                (Arc::new(NoopReporter), None)
            };
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            defaults,
            takeover: Mutex::new(takeover),
            phase: Mutex::new(RuntimePhase::Created),
            listener: Arc::new(MigrationRuleListener::new()),
            reporter,
            sink: Arc::new(LogSink),
            pump: Mutex::new(pump),
            pump_handle: Mutex::new(None),
            shutdown_tx,
            handlers: Mutex::new(Vec::new()),
        })
    }

    /// Replace the sink reports are drained into. Takes effect at start.
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn defaults(&self) -> MigrationDefaults {
        self.defaults
    }

    pub fn phase(&self) -> RuntimePhase {
        *self.phase.lock()
    }

    pub fn is_running(&self) -> bool {
        self.phase() == RuntimePhase::Running
    }

    pub fn listener(&self) -> &Arc<MigrationRuleListener> {
        &self.listener
    }

    pub fn reporter(&self) -> Arc<dyn StatusReporter> {
        self.reporter.clone()
    }

    /// Create an invoker and rule handler for a consumer and subscribe it to
    /// rule updates. The latest known rule, if any, is applied immediately.
    ///
    /// Binding a service key that is already bound replaces the earlier
    /// consumer and destroys its invoker.
    pub fn bind_consumer(
        &self,
        consumer: ConsumerIdentity,
        capability: InvokerCapability,
        factory: Arc<dyn DelegateFactory>,
    ) -> Result<Arc<BoundHandler>> {
        // Held until the handler is registered so stop() cannot miss it.
        let phase = self.phase.lock();
        if *phase == RuntimePhase::Stopped {
            anyhow::bail!("cannot bind {} after the runtime stopped", consumer);
        }

        let invoker = Arc::new(
            MigrationInvoker::new(consumer.clone(), capability, factory)
                .with_defaults(self.defaults),
        );
        let handler = Arc::new(
            MigrationRuleHandler::new(invoker, consumer)
                .with_reporter(self.reporter.clone())
                .with_defaults(self.defaults),
        );

        let service_key = handler.consumer().service_key();
        let previous = {
            let mut handlers = self.handlers.lock();
            let previous = take_bound(&mut handlers, &service_key);
            handlers.push(handler.clone());
            previous
        };
        let replayed = self
            .listener
            .register(handler.clone() as Arc<dyn RuleSubscriber>);
        if let Some(previous) = previous {
            previous.invoker().destroy();
            tracing::info!(service = %service_key, "replaced bound consumer");
        }
        drop(phase);

        tracing::info!(
            consumer = %handler.consumer(),
            %capability,
            replayed = ?replayed,
            "consumer bound"
        );
        Ok(handler)
    }

    /// Unsubscribe a consumer and destroy its invoker.
    ///
    /// Returns false when nothing is bound under `service_key`.
    pub fn unbind_consumer(&self, service_key: &str) -> bool {
        let _phase = self.phase.lock();
        let removed = take_bound(&mut self.handlers.lock(), service_key);
        let Some(handler) = removed else {
            return false;
        };
        self.listener.unregister(service_key);
        handler.invoker().destroy();
        tracing::info!(service = %service_key, "consumer unbound");
        true
    }

    /// Number of consumers currently bound.
    pub fn bound_consumers(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Forward a rule snapshot to every bound consumer.
    pub fn on_rule(&self, rule: MigrationRule) {
        self.listener.on_rule(rule);
    }

    /// Wait for the report pump to flush and exit after [`Bootstrap::stop`].
    pub async fn join_reporter(&self) {
        let handle = self.pump_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "report pump task failed");
            }
        }
    }
}

impl Bootstrap for ClientRuntime {
    fn initialize(&self) -> Result<()> {
        let mut phase = self.phase.lock();
        if *phase != RuntimePhase::Created {
            return Ok(());
        }
        *phase = RuntimePhase::Initialized;
        tracing::info!(
            default_step = %self.defaults.step,
            default_threshold = self.defaults.threshold,
            reporter = self.config.reporter.enabled,
            "waypoint runtime initialized"
        );
        Ok(())
    }

    /// Requires a tokio runtime in the calling context.
    fn start(&self) -> Result<()> {
        self.initialize()?;

        let mut phase = self.phase.lock();
        match *phase {
            RuntimePhase::Running => return Ok(()),
            RuntimePhase::Stopped => anyhow::bail!("runtime already stopped"),
            RuntimePhase::Created | RuntimePhase::Initialized => {}
        }

        let mut pump = self.pump.lock();
        if pump.is_some() {
            let handle = tokio::runtime::Handle::try_current()
                .context("starting the report pump requires a tokio runtime")?;
            if let Some(pump) = pump.take() {
                let task = handle.spawn(pump.run(self.sink.clone(), self.shutdown_tx.subscribe()));
                *self.pump_handle.lock() = Some(task);
            }
        }

        *phase = RuntimePhase::Running;
        tracing::info!("waypoint runtime started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut phase = self.phase.lock();
        if *phase == RuntimePhase::Stopped {
            return Ok(());
        }
        *phase = RuntimePhase::Stopped;

        self.shutdown_tx.send_replace(true);
        self.listener.clear();
        let handlers = std::mem::take(&mut *self.handlers.lock());
        for handler in &handlers {
            handler.invoker().destroy();
        }

        tracing::info!(consumers = handlers.len(), "waypoint runtime stopped");
        Ok(())
    }

    fn takeover_mode(&self) -> TakeoverMode {
        *self.takeover.lock()
    }

    fn set_takeover_mode(&self, mode: TakeoverMode) {
        *self.takeover.lock() = mode;
    }
}

fn take_bound(
    handlers: &mut Vec<Arc<BoundHandler>>,
    service_key: &str,
) -> Option<Arc<BoundHandler>> {
    let index = handlers
        .iter()
        .position(|h| h.consumer().service_key() == service_key)?;
    Some(handlers.swap_remove(index))
}
