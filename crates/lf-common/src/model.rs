//! Domain records for the escalation lifecycle.
//!
//! These are the row shapes of the persistent tables (`escalations`,
//! `reports`, `rca_forms`, `notification_log`, `sites`, `profiles`).
//! The escalation is the root aggregate: reports, the RCA form and
//! notification entries are owned by it and deleted with it.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::id::{EscalationId, NotificationId, RcaId, ReportId, TicketId, UserId};

// ============================================================================
// Enumerations
// ============================================================================

/// Telecom provider owning the faulted link.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// MTN links are addressed by a single segment rather than a site pair.
    Mtn,
    Airtel,
    Glo,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Mtn, Provider::Airtel, Provider::Glo];

    /// Whether this provider identifies links by segment instead of site pair.
    pub fn uses_segment(self) -> bool {
        matches!(self, Provider::Mtn)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Mtn => "mtn",
            Provider::Airtel => "airtel",
            Provider::Glo => "glo",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mtn" => Ok(Provider::Mtn),
            "airtel" => Ok(Provider::Airtel),
            "glo" => Ok(Provider::Glo),
            _ => Err(format!("unknown provider: {}", s)),
        }
    }
}

/// Role supplied by the identity provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Staff,
    #[value(name = "fibre_network")]
    FibreNetwork,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Staff, Role::FibreNetwork];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::FibreNetwork => "fibre_network",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "fibre_network" | "fibre-network" | "fibrenetwork" => Ok(Role::FibreNetwork),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// Escalation status.
///
/// Derived from the report set on every report mutation; `Closed` is only
/// reached through an explicit close once the RCA is on file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    #[value(name = "in_progress")]
    InProgress,
    Resolved,
    Closed,
}

impl EscalationStatus {
    /// Open escalations are still on the MTTR clock.
    pub fn is_open(self) -> bool {
        matches!(self, EscalationStatus::Pending | EscalationStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EscalationStatus::Pending => "pending",
            EscalationStatus::InProgress => "in_progress",
            EscalationStatus::Resolved => "resolved",
            EscalationStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-report stage.
///
/// Reports are created directly as `InProgress`; `Pending` only appears on
/// rows written by older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    InProgress,
    Resolved,
    Closed,
}

impl ReportStatus {
    /// Closed reports accept no further stage changes.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Physical classification of the faulted link, captured on the RCA form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Backbone,
    Metro,
    Access,
    #[value(name = "last_mile")]
    LastMile,
}

/// Confirmed cause of failure selected on the RCA form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CauseOfFailure {
    #[value(name = "fibre_cut")]
    FibreCut,
    #[value(name = "core_break")]
    CoreBreak,
    #[value(name = "power_failure")]
    PowerFailure,
    #[value(name = "equipment_fault")]
    EquipmentFault,
    Vandalism,
    #[value(name = "third_party_works")]
    ThirdPartyWorks,
    Rodent,
    Other,
}

impl CauseOfFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            CauseOfFailure::FibreCut => "fibre_cut",
            CauseOfFailure::CoreBreak => "core_break",
            CauseOfFailure::PowerFailure => "power_failure",
            CauseOfFailure::EquipmentFault => "equipment_fault",
            CauseOfFailure::Vandalism => "vandalism",
            CauseOfFailure::ThirdPartyWorks => "third_party_works",
            CauseOfFailure::Rodent => "rodent",
            CauseOfFailure::Other => "other",
        }
    }
}

/// Outcome of comparing the measured repair window against the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum MttrStatus {
    #[serde(rename = "Within MTTR")]
    WithinMttr,
    #[serde(rename = "Exceeded MTTR")]
    ExceededMttr,
}

impl MttrStatus {
    pub fn label(self) -> &'static str {
        match self {
            MttrStatus::WithinMttr => "Within MTTR",
            MttrStatus::ExceededMttr => "Exceeded MTTR",
        }
    }
}

impl fmt::Display for MttrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Why a notification-log row was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Elapsed time crossed the breach ratio of the MTTR budget.
    MttrBreach,
    /// A report was marked resolved.
    ReportResolved,
}

impl NotificationKind {
    /// Kinds that may be written at most once per escalation.
    pub fn is_unique_per_escalation(self) -> bool {
        matches!(self, NotificationKind::MttrBreach)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// The caller, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Actor {
            id: UserId(id.into()),
            role,
        }
    }
}

/// Row of the read-only `profiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Profile {
    pub id: UserId,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Profile {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id.clone(),
            role: self.role,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// One fault-link record (root aggregate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Escalation {
    pub id: EscalationId,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_a_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_b_id: Option<String>,
    /// Segment label; only populated for segment-addressed providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_of_segment: Option<String>,
    pub link_id: String,
    pub ticket_id: TicketId,
    /// Contractual repair-time budget in hours.
    pub mttr_hours: f64,
    pub description: String,
    pub status: EscalationStatus,
    pub has_report: bool,
    #[serde(default)]
    pub is_critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regional_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_lead: Option<String>,
    /// Cause of failure, mirrored from the resolved report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cof: Option<String>,
    /// Point of failure, mirrored from the resolved report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pof: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Escalation {
    /// Derive the display link label from the selected sites or segment.
    ///
    /// Returns None when the selection is incomplete for the provider.
    pub fn derive_link_id(
        provider: Provider,
        site_a: Option<&str>,
        site_b: Option<&str>,
        segment: Option<&str>,
    ) -> Option<String> {
        if provider.uses_segment() {
            let segment = segment.map(str::trim).filter(|s| !s.is_empty())?;
            return Some(segment.to_string());
        }
        let a = site_a.map(str::trim).filter(|s| !s.is_empty())?;
        let b = site_b.map(str::trim).filter(|s| !s.is_empty())?;
        Some(format!("{}-{}", a, b))
    }

    /// Hours elapsed since the escalation was opened; never negative.
    pub fn elapsed_hours(&self, now: DateTime<Utc>) -> f64 {
        let secs = now.signed_duration_since(self.created_at).num_seconds();
        secs.max(0) as f64 / 3600.0
    }
}

/// One staged incident write-up attached to an escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    pub id: ReportId,
    pub escalation_id: EscalationId,
    pub issue_description: String,
    pub reported_by: String,
    pub contact_info: String,
    #[serde(default)]
    pub is_critical: bool,
    pub status: ReportStatus,
    /// Estimated-time-to-repair narrative from the in-progress stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pof: Option<String>,
    #[serde(default)]
    pub initial_photos: Vec<String>,
    #[serde(default)]
    pub progress_photos: Vec<String>,
    #[serde(default)]
    pub resolution_photos: Vec<String>,
    /// Set once by the resolve stage; later closure leaves it untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// Hours from creation to resolution; `None` until resolved.
    pub fn hours_to_resolve(&self) -> Option<f64> {
        let resolved_at = self.resolved_at?;
        let secs = resolved_at
            .signed_duration_since(self.created_at)
            .num_seconds();
        Some(secs.max(0) as f64 / 3600.0)
    }
}

/// Finalized root-cause record (one per escalation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RcaRecord {
    pub id: RcaId,
    pub escalation_id: EscalationId,
    pub link_type: LinkType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole hours of the outage window.
    pub mttr_used: i64,
    pub mttr_status: MttrStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pof: Option<String>,
    pub actual_cof: CauseOfFailure,
    pub detailed_cof: String,
    pub resolution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ofc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_lead: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_pof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tt_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottle_cassette_tray: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    pub submitted_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only alert/audit row keyed to an escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NotificationEntry {
    pub id: NotificationId,
    pub escalation_id: EscalationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<UserId>,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

/// Reference row from a provider's site table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Site {
    pub provider: Provider,
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}
