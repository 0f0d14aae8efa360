//! Migration status reporting.
//!
//! The rule handler emits one [`MigrationStepReport`] per attempted transition.
//! Reporting is fire-and-forget: [`StatusReporter::report`] must return
//! immediately and must never fail the caller. [`ChannelReporter`] queues onto
//! a bounded channel and a [`ReportPump`] task drains it into a [`ReportSink`].

use crate::control::identity::ConsumerIdentity;
use crate::control::step::MigrationStep;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Report type tag.
pub const MIGRATION_STEP_STATUS: &str = "migrationStepStatus";

/// Outcome of one migration attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStepReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub application: String,
    pub service: String,
    pub version: Option<String>,
    pub group: Option<String>,
    pub origin_step: Option<MigrationStep>,
    pub new_step: MigrationStep,
    pub success: bool,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

impl MigrationStepReport {
    pub fn new(
        consumer: &ConsumerIdentity,
        origin_step: Option<MigrationStep>,
        new_step: MigrationStep,
        success: bool,
    ) -> Self {
        Self {
            kind: MIGRATION_STEP_STATUS.to_string(),
            application: consumer.application.clone(),
            service: consumer.interface.clone(),
            version: consumer.version.clone(),
            group: consumer.group.clone(),
            origin_step,
            new_step,
            success,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// JSON form handed to sinks.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"type\":\"{}\",\"service\":\"{}\"}}",
                self.kind, self.service
            )
        })
    }
}

/// Best-effort sink for migration outcomes.
pub trait StatusReporter: Send + Sync {
    /// Whether anything is listening. The handler skips building reports
    /// when this is false.
    fn has_reporter(&self) -> bool;

    /// Hand off a report. Must not block and must not panic.
    fn report(&self, report: MigrationStepReport);
}

/// Reporter that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl StatusReporter for NoopReporter {
    fn has_reporter(&self) -> bool {
        false
    }

    fn report(&self, _report: MigrationStepReport) {}
}

/// Reporting counters.
#[derive(Debug, Default)]
pub struct ReportStats {
    queued: AtomicU64,
    dropped: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`ReportStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportStatsSnapshot {
    pub queued: u64,
    pub dropped: u64,
    pub published: u64,
    pub failed: u64,
}

impl ReportStats {
    pub fn snapshot(&self) -> ReportStatsSnapshot {
        ReportStatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Where drained reports end up.
pub trait ReportSink: Send + Sync {
    fn publish(&self, report: &MigrationStepReport) -> anyhow::Result<()>;
}

/// Sink that writes each report as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn publish(&self, report: &MigrationStepReport) -> anyhow::Result<()> {
        tracing::info!(target: "waypoint::report", report = %report.to_json(), "migration step status");
        Ok(())
    }
}

/// Queues reports onto a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::Sender<MigrationStepReport>,
    stats: Arc<ReportStats>,
}

impl ChannelReporter {
    pub fn stats(&self) -> ReportStatsSnapshot {
        self.stats.snapshot()
    }
}

impl StatusReporter for ChannelReporter {
    fn has_reporter(&self) -> bool {
        !self.tx.is_closed()
    }

    fn report(&self, report: MigrationStepReport) {
        match self.tx.try_send(report) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                let reason = match err {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "pump stopped",
                };
                tracing::debug!(reason, "migration report dropped");
            }
        }
    }
}

/// Drains a [`ChannelReporter`]'s queue.
#[derive(Debug)]
pub struct ReportPump {
    rx: mpsc::Receiver<MigrationStepReport>,
    stats: Arc<ReportStats>,
}

/// Create a reporter and the pump that drains it.
pub fn report_channel(capacity: usize) -> (ChannelReporter, ReportPump) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(ReportStats::default());
    (
        ChannelReporter {
            tx,
            stats: stats.clone(),
        },
        ReportPump { rx, stats },
    )
}

impl ReportPump {
    /// Forward reports to `sink` until every reporter is dropped or
    /// `shutdown` flips to true. Queued reports are flushed before returning.
    pub async fn run(mut self, sink: Arc<dyn ReportSink>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                next = self.rx.recv() => match next {
                    Some(report) => self.forward(sink.as_ref(), &report),
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.rx.close();
        while let Ok(report) = self.rx.try_recv() {
            self.forward(sink.as_ref(), &report);
        }
        tracing::debug!(stats = ?self.stats.snapshot(), "report pump stopped");
    }

    fn forward(&self, sink: &dyn ReportSink, report: &MigrationStepReport) {
        match sink.publish(report) {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %err, service = %report.service, "migration report sink failed");
            }
        }
    }
}
