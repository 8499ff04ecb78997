//! Persistent table store.
//!
//! The engine talks to storage only through the [`Store`] trait:
//! equality-filtered reads plus atomic [`WriteBatch`] commits. Unique
//! constraints are enforced by the store, not by callers:
//! - `escalations.ticket_id`
//! - `rca_forms.escalation_id`
//! - `notification_log (escalation_id, kind)` for once-per-escalation kinds
//!
//! Two backends share the same [`Tables`] apply logic:
//! - [`MemoryStore`] for tests and embedding
//! - [`FileStore`] persisting `tables.json` under the data dir

pub mod file;
pub mod memory;
pub mod tables;

pub use file::{media_root, resolve_data_dir, FileStore};
pub use memory::MemoryStore;
pub use tables::Tables;

use chrono::{DateTime, Utc};
use lf_common::{
    Escalation, EscalationId, EscalationStatus, NotificationEntry, NotificationId, Profile,
    Provider, RcaRecord, Report, ReportId, Site, UserId,
};
use std::path::PathBuf;
use thiserror::Error;

use crate::events::{ChangeEvent, Table};

const ENV_DATA_DIR: &str = "LINK_FAULT_DATA";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to resolve XDG data dir (set {ENV_DATA_DIR} or XDG_DATA_HOME)")]
    DataDirUnavailable,

    #[error("unique constraint violated on {table}.{key}: {value}")]
    UniqueViolation {
        table: Table,
        key: &'static str,
        value: String,
    },

    #[error("{table} row not found: {id}")]
    NotFound { table: Table, id: String },

    #[error("table file {path} has incompatible schema version {version}")]
    IncompatibleSchema { path: PathBuf, version: String },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

impl From<StoreError> for lf_common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { table, key, value } => lf_common::Error::Conflict {
                table: table.to_string(),
                key: key.to_string(),
                value,
            },
            StoreError::NotFound { table, id } => lf_common::Error::NotFound {
                entity: entity_name(table).to_string(),
                id,
            },
            StoreError::DataDirUnavailable => lf_common::Error::Config(err.to_string()),
            other => lf_common::Error::Persistence(other.to_string()),
        }
    }
}

fn entity_name(table: Table) -> &'static str {
    match table {
        Table::Escalations => "escalation",
        Table::Reports => "report",
        Table::RcaForms => "rca",
        Table::NotificationLog => "notification",
        Table::Sites => "site",
        Table::Profiles => "profile",
    }
}

/// Equality filter for escalation listings.
#[derive(Debug, Clone, Default)]
pub struct EscalationFilter {
    pub provider: Option<Provider>,
    pub status: Option<EscalationStatus>,
    pub created_by: Option<UserId>,
    /// Only pending / in-progress rows.
    pub open_only: bool,
}

impl EscalationFilter {
    pub fn matches(&self, e: &Escalation) -> bool {
        self.provider.is_none_or(|p| e.provider == p)
            && self.status.is_none_or(|s| e.status == s)
            && self.created_by.as_ref().is_none_or(|u| &e.created_by == u)
            && (!self.open_only || e.status.is_open())
    }
}

/// Equality filter for notification listings.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub recipient: Option<UserId>,
    pub escalation_id: Option<EscalationId>,
    pub unread_only: bool,
}

impl NotificationFilter {
    pub fn matches(&self, n: &NotificationEntry) -> bool {
        self.recipient
            .as_ref()
            .is_none_or(|r| n.recipient.as_ref() == Some(r))
            && self
                .escalation_id
                .as_ref()
                .is_none_or(|id| &n.escalation_id == id)
            && (!self.unread_only || !n.is_read)
    }
}

/// One row mutation inside a batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    InsertEscalation(Escalation),
    UpdateEscalation(Escalation),
    /// Cascades to reports, the RCA form and notification entries.
    DeleteEscalation(EscalationId),
    InsertReport(Report),
    UpdateReport(Report),
    /// Close every resolved report of the escalation.
    CloseReports {
        escalation_id: EscalationId,
        at: DateTime<Utc>,
    },
    InsertRca(RcaRecord),
    UpdateRca(RcaRecord),
    InsertNotification(NotificationEntry),
    MarkNotificationRead {
        id: NotificationId,
        at: DateTime<Utc>,
    },
    /// Replace all sites of one provider.
    ReplaceSites {
        provider: Provider,
        sites: Vec<Site>,
    },
    PutProfile(Profile),
}

/// An ordered set of writes applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn with(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Table store contract.
///
/// Calls are blocking round trips. `commit` either applies every op of the
/// batch or none of them, and publishes change events only after success.
pub trait Store: Send + Sync {
    fn get_escalation(&self, id: &EscalationId) -> Result<Option<Escalation>, StoreError>;

    /// Matching escalations, newest first.
    fn list_escalations(&self, filter: &EscalationFilter) -> Result<Vec<Escalation>, StoreError>;

    fn get_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError>;

    /// Reports of one escalation, oldest first.
    fn reports_for(&self, escalation_id: &EscalationId) -> Result<Vec<Report>, StoreError>;

    fn list_reports(&self) -> Result<Vec<Report>, StoreError>;

    fn find_rca(&self, escalation_id: &EscalationId) -> Result<Option<RcaRecord>, StoreError>;

    fn list_rcas(&self) -> Result<Vec<RcaRecord>, StoreError>;

    /// Matching notification entries, newest first.
    fn notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<NotificationEntry>, StoreError>;

    fn sites(&self, provider: Option<Provider>) -> Result<Vec<Site>, StoreError>;

    fn profile(&self, id: &UserId) -> Result<Option<Profile>, StoreError>;

    fn commit(&self, batch: WriteBatch) -> Result<Vec<ChangeEvent>, StoreError>;
}
