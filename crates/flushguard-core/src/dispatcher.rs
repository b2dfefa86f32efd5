//! Lifecycle Event Dispatcher
//!
//! Receives host lifecycle transitions on the host's main thread and runs
//! whatever the configured `FlushPolicy` says:
//!
//! - `DirectSync`: file sync engine only. Used where the managed runtime may
//!   already be tearing down (legacy terminate/background).
//! - `Tiered`: cross-runtime flush first; on any outcome other than success
//!   the file sync engine runs exactly once.
//! - `None`: log and return.
//!
//! Every fallback run that managed to list the store directory overwrites
//! the last-sync slot, whatever the per-file results were.
//!
//! No locking: the host delivers one transition at a time.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::diagnostics::{describe_directory, DirectoryReport};
use crate::file_sync::{DirectoryStatus, FileSyncEngine, SyncSummary};
use crate::lifecycle::{FlushAction, LifecycleEvent};
use crate::recorder::SyncStateRecorder;
use crate::requester::{CrossRuntimeFlusher, EngineSlot, FlushResponse, MethodChannel};
use crate::settings::SettingsStore;

/// Tier that performed an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMethod {
    CrossRuntime,
    FallbackFileSync,
}

impl fmt::Display for FlushMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushMethod::CrossRuntime => f.write_str("cross-runtime"),
            FlushMethod::FallbackFileSync => f.write_str("fallback-file-sync"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Timeout,
    /// Some store files synced, some failed
    Partial,
    Failure,
}

impl AttemptOutcome {
    fn from_response(response: &FlushResponse) -> Self {
        match response {
            FlushResponse::Success => AttemptOutcome::Success,
            FlushResponse::TimedOut => AttemptOutcome::Timeout,
            FlushResponse::Failed(_) => AttemptOutcome::Failure,
        }
    }

    /// A missing directory means nothing was at risk.
    fn from_summary(summary: &SyncSummary) -> Self {
        match &summary.status {
            DirectoryStatus::Missing => AttemptOutcome::Success,
            DirectoryStatus::Unreadable { .. } => AttemptOutcome::Failure,
            DirectoryStatus::Scanned => match (summary.synced, summary.failed) {
                (_, 0) => AttemptOutcome::Success,
                (0, _) => AttemptOutcome::Failure,
                _ => AttemptOutcome::Partial,
            },
        }
    }
}

/// One tier's attempt within a flush. Logged and reported, never persisted.
#[derive(Debug, Clone)]
pub struct FlushAttempt {
    pub trigger: LifecycleEvent,
    pub started_at: DateTime<Utc>,
    pub method: FlushMethod,
    pub duration: Duration,
    pub outcome: AttemptOutcome,
}

/// Everything a single dispatch did.
#[derive(Debug, Clone)]
pub struct FlushReport {
    pub trigger: LifecycleEvent,
    pub action: FlushAction,
    /// In execution order: at most one cross-runtime, then at most one fallback
    pub attempts: Vec<FlushAttempt>,
    /// First-tier response, when the tiered path ran
    pub cross_runtime: Option<FlushResponse>,
    /// Fallback summary, when the file sync engine ran
    pub fallback: Option<SyncSummary>,
    /// Time written to the last-sync slot, when it was written
    pub recorded_at: Option<DateTime<Utc>>,
    pub duration: Duration,
}

impl FlushReport {
    fn new(trigger: LifecycleEvent, action: FlushAction) -> Self {
        Self {
            trigger,
            action,
            attempts: Vec::new(),
            cross_runtime: None,
            fallback: None,
            recorded_at: None,
            duration: Duration::ZERO,
        }
    }

    /// Outcome of the last tier that ran.
    pub fn final_outcome(&self) -> Option<AttemptOutcome> {
        self.attempts.last().map(|a| a.outcome)
    }

    pub fn fallback_ran(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Routes lifecycle transitions to the flush tiers.
pub struct LifecycleDispatcher {
    config: Config,
    requester: CrossRuntimeFlusher,
    engine: FileSyncEngine,
    recorder: SyncStateRecorder,
}

impl LifecycleDispatcher {
    /// Build a dispatcher from configuration, the engine slot the host
    /// attaches the managed runtime to, and the settings store.
    pub fn new(config: Config, slot: Arc<EngineSlot>, settings: Arc<dyn SettingsStore>) -> Self {
        let requester = CrossRuntimeFlusher::new(slot, config.flush_method.clone(), config.success_reply.clone());
        let engine = FileSyncEngine::new(config.layout.clone());
        let recorder = SyncStateRecorder::new(settings, config.settings_key.clone());
        Self { config, requester, engine, recorder }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn requester(&self) -> &CrossRuntimeFlusher {
        &self.requester
    }

    pub fn engine(&self) -> &FileSyncEngine {
        &self.engine
    }

    pub fn recorder(&self) -> &SyncStateRecorder {
        &self.recorder
    }

    /// Attach the managed runtime's channel to the engine slot.
    pub fn attach_engine(&self, channel: Arc<dyn MethodChannel>) {
        if channel.name() != self.config.channel_name {
            warn!(
                expected = %self.config.channel_name,
                actual = channel.name(),
                "attaching engine on an unexpected channel"
            );
        }
        self.requester.slot().attach(channel);
    }

    /// Drop the managed runtime handle; tiered flushes fall back immediately.
    pub fn detach_engine(&self) {
        self.requester.slot().detach();
    }

    /// Handle one lifecycle transition. `None` when the policy says no action.
    pub fn handle(&self, event: LifecycleEvent) -> Option<FlushReport> {
        let action = self.config.policy.action_for(event, self.config.host);
        info!(event = %event, host = ?self.config.host, action = ?action, "lifecycle transition");

        match action {
            FlushAction::None => None,
            FlushAction::DirectSync => Some(self.flush_direct(event)),
            FlushAction::Tiered => Some(self.flush_tiered(event)),
        }
    }

    /// Fallback tier only. Never touches the managed runtime.
    pub fn flush_direct(&self, trigger: LifecycleEvent) -> FlushReport {
        let start = Instant::now();
        let mut report = FlushReport::new(trigger, FlushAction::DirectSync);
        info!(trigger = %trigger, "direct file sync start");

        self.run_fallback(trigger, &mut report);

        report.duration = start.elapsed();
        info!(
            trigger = %trigger,
            duration_ms = report.duration.as_millis() as u64,
            "direct file sync complete"
        );
        report
    }

    /// Cross-runtime flush, then the fallback tier unless it succeeded.
    pub fn flush_tiered(&self, trigger: LifecycleEvent) -> FlushReport {
        let start = Instant::now();
        let mut report = FlushReport::new(trigger, FlushAction::Tiered);
        info!(trigger = %trigger, "tiered flush start");

        let started_at = Utc::now();
        let tier_start = Instant::now();
        let response = self.requester.request_flush(self.config.flush_timeout);
        record_attempt(
            &mut report,
            FlushAttempt {
                trigger,
                started_at,
                method: FlushMethod::CrossRuntime,
                duration: tier_start.elapsed(),
                outcome: AttemptOutcome::from_response(&response),
            },
        );

        let succeeded = response.is_success();
        report.cross_runtime = Some(response);

        if !succeeded {
            warn!(trigger = %trigger, "cross-runtime flush did not succeed, falling back to direct file sync");
            self.run_fallback(trigger, &mut report);
        }

        report.duration = start.elapsed();
        info!(
            trigger = %trigger,
            attempts = report.attempts.len(),
            outcome = ?report.final_outcome(),
            duration_ms = report.duration.as_millis() as u64,
            "tiered flush complete"
        );
        report
    }

    /// Debug listing of the store directory with the last recorded sync.
    pub fn describe_store(&self) -> DirectoryReport {
        describe_directory(&self.config.store_dir, &self.config.layout, self.recorder.last_sync_time())
    }

    fn run_fallback(&self, trigger: LifecycleEvent, report: &mut FlushReport) {
        let started_at = Utc::now();
        let summary = self.engine.sync_all(&self.config.store_dir);

        if summary.scanned() {
            report.recorded_at = Some(self.recorder.record_sync_now());
        }

        record_attempt(
            report,
            FlushAttempt {
                trigger,
                started_at,
                method: FlushMethod::FallbackFileSync,
                duration: summary.duration,
                outcome: AttemptOutcome::from_summary(&summary),
            },
        );
        report.fallback = Some(summary);
    }
}

fn record_attempt(report: &mut FlushReport, attempt: FlushAttempt) {
    info!(
        trigger = %attempt.trigger,
        method = %attempt.method,
        started_at = %attempt.started_at,
        duration_ms = attempt.duration.as_millis() as u64,
        outcome = ?attempt.outcome,
        "flush attempt"
    );
    report.attempts.push(attempt);
}

impl fmt::Debug for LifecycleDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleDispatcher")
            .field("config", &self.config)
            .field("requester", &self.requester)
            .field("recorder", &self.recorder)
            .finish()
    }
}
