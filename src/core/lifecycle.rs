//! Lifecycle coupling with a hosting framework.
//!
//! A host that owns the process lifecycle forwards its signals to a
//! [`LifecycleListener`]. When the client is externally managed, "ready" starts
//! it and "shutdown" runs the [`ShutdownHook`], which stops it exactly once.
//! The migration control loop never calls into this module.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Who starts and stops the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TakeoverMode {
    /// The application calls start/stop itself.
    Manual,
    /// The hosting framework drives start/stop through lifecycle events.
    ExternallyManaged,
}

impl std::fmt::Display for TakeoverMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::ExternallyManaged => write!(f, "externally_managed"),
        }
    }
}

impl FromStr for TakeoverMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(Self::Manual),
            "externally_managed" => Ok(Self::ExternallyManaged),
            other => anyhow::bail!("unknown takeover mode: {}", other),
        }
    }
}

/// Process-level client handle driven by lifecycle events.
pub trait Bootstrap: Send + Sync {
    fn initialize(&self) -> Result<()>;
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn takeover_mode(&self) -> TakeoverMode;
    fn set_takeover_mode(&self, mode: TakeoverMode);
}

/// Signals forwarded by the hosting framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Configuration is loaded; the client may initialize.
    Initialized,
    /// The host finished starting.
    Ready,
    /// The host is shutting down.
    Shutdown,
}

/// Stops a bootstrap once, no matter how many shutdown paths fire.
pub struct ShutdownHook<B: Bootstrap + ?Sized> {
    bootstrap: Arc<B>,
    ran: AtomicBool,
}

impl<B: Bootstrap + ?Sized> ShutdownHook<B> {
    pub fn new(bootstrap: Arc<B>) -> Self {
        Self {
            bootstrap,
            ran: AtomicBool::new(false),
        }
    }

    /// Stop the bootstrap unless a previous call already did.
    pub fn run(&self) -> Result<()> {
        if self.ran.swap(true, Ordering::AcqRel) {
            tracing::debug!("shutdown hook already ran");
            return Ok(());
        }
        tracing::info!("running shutdown hook");
        self.bootstrap.stop()
    }

    pub fn has_run(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }
}

/// Translates host lifecycle events into bootstrap calls.
pub struct LifecycleListener<B: Bootstrap + ?Sized> {
    bootstrap: Arc<B>,
    hook: Arc<ShutdownHook<B>>,
}

impl<B: Bootstrap + ?Sized> LifecycleListener<B> {
    /// Attach to a bootstrap. Unless it is in manual mode, the host takes over
    /// its lifecycle.
    pub fn new(bootstrap: Arc<B>) -> Self {
        let hook = Arc::new(ShutdownHook::new(bootstrap.clone()));
        Self::with_hook(bootstrap, hook)
    }

    /// Attach with a shutdown hook shared with other shutdown paths.
    pub fn with_hook(bootstrap: Arc<B>, hook: Arc<ShutdownHook<B>>) -> Self {
        if bootstrap.takeover_mode() != TakeoverMode::Manual {
            bootstrap.set_takeover_mode(TakeoverMode::ExternallyManaged);
        }
        Self { bootstrap, hook }
    }

    pub fn hook(&self) -> &Arc<ShutdownHook<B>> {
        &self.hook
    }

    pub fn on_event(&self, event: LifecycleEvent) -> Result<()> {
        let managed = self.bootstrap.takeover_mode() == TakeoverMode::ExternallyManaged;
        tracing::debug!(?event, managed, "lifecycle event");

        match event {
            LifecycleEvent::Initialized => self.bootstrap.initialize(),
            LifecycleEvent::Ready if managed => self.bootstrap.start(),
            LifecycleEvent::Shutdown if managed => self.hook.run(),
            LifecycleEvent::Ready | LifecycleEvent::Shutdown => Ok(()),
        }
    }
}
