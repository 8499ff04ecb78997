//! Event vocabulary: stages, event names and the per-run correlation context.
//!
//! Events are plain `tracing` macros with `target: event_names::*` and a
//! `stage` field; `LogContext::span` supplies `run_id`, `host_id` and `actor`.

use serde::{Deserialize, Serialize};

/// Lifecycle stages an event can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Escalation creation, deletion and close.
    Escalation,
    /// Report create / in-progress / resolve.
    Report,
    /// RCA capture and report closure.
    Rca,
    /// MTTR breach scanning.
    Alert,
    /// Store commits and change events.
    Store,
    /// Photo uploads.
    Media,
    /// Roll-ups and site directory.
    Analytics,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Escalation => "escalation",
            Stage::Report => "report",
            Stage::Rca => "rca",
            Stage::Alert => "alert",
            Stage::Store => "store",
            Stage::Media => "media",
            Stage::Analytics => "analytics",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Escalations
    pub const ESCALATION_CREATED: &str = "escalation.created";
    pub const ESCALATION_TICKET_CONFLICT: &str = "escalation.ticket_conflict";
    pub const ESCALATION_CLOSED: &str = "escalation.closed";
    pub const ESCALATION_DELETED: &str = "escalation.deleted";

    // Reports
    pub const REPORT_CREATED: &str = "report.created";
    pub const REPORT_PROGRESS_UPDATED: &str = "report.progress_updated";
    pub const REPORT_RESOLVED: &str = "report.resolved";

    // RCA
    pub const RCA_SUBMITTED: &str = "rca.submitted";
    pub const RCA_UPSERT_CONFLICT: &str = "rca.upsert_conflict";
    pub const RCA_NEGATIVE_WINDOW: &str = "rca.negative_window";

    // Breach alerting
    pub const BREACH_SCAN_FINISHED: &str = "breach.scan_finished";
    pub const BREACH_DETECTED: &str = "breach.detected";
    pub const BREACH_NOTIFY_FAILED: &str = "breach.notify_failed";

    // Storage
    pub const MEDIA_UPLOADED: &str = "media.uploaded";
    pub const STORE_COMMITTED: &str = "store.committed";
    pub const STORE_OPENED: &str = "store.opened";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";

    // Authorization
    pub const ACCESS_DENIED: &str = "access.denied";

    // Error events
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Correlation ids shared by every event of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
    pub actor: Option<String>,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
            actor: None,
        }
    }

    /// Fresh run id on this host, acting as `actor` when one was given.
    pub fn for_run(actor: Option<&str>) -> Self {
        let ctx = LogContext::new(super::generate_run_id(), super::get_host_id());
        match actor {
            Some(actor) => ctx.with_actor(actor),
            None => ctx,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Root span of the run. Events inside it inherit the ids.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            host_id = %self.host_id,
            actor = self.actor.as_deref().unwrap_or("-"),
        )
    }
}
