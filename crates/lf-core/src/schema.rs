//! JSON Schema generation for persisted records.
//!
//! Consumers of the table file and of `--format json` payloads can validate
//! against these schemas or generate bindings from them.
//!
//! # Usage
//!
//! ```bash
//! # List available schema types
//! lf-core schema --list
//!
//! # Generate schema for a specific type
//! lf-core schema Escalation
//!
//! # Generate all schemas
//! lf-core schema --all
//! ```

use schemars::schema_for;
use serde_json::Value;
use std::collections::BTreeMap;

pub use lf_common::{
    Actor, CauseOfFailure, Escalation, EscalationId, EscalationStatus, LinkType, MttrStatus,
    NotificationEntry, NotificationId, NotificationKind, Profile, Provider, RcaId, RcaRecord,
    Report, ReportId, ReportStatus, Role, Site, TicketId, UserId,
};

/// Available schema types with their descriptions.
pub fn available_schemas() -> Vec<(&'static str, &'static str)> {
    vec![
        // Identity types
        ("EscalationId", "Escalation row identifier"),
        ("ReportId", "Report row identifier"),
        ("RcaId", "RCA form row identifier"),
        ("NotificationId", "Notification log row identifier"),
        ("TicketId", "Human-facing escalation ticket (prefix + 6 base-36 chars)"),
        ("UserId", "Identity-provider user id"),
        ("Actor", "Caller identity and role"),
        // Enumerations
        ("Provider", "Telecom provider (mtn, airtel, glo)"),
        ("Role", "Caller role (admin, staff, fibre_network)"),
        ("EscalationStatus", "Escalation status"),
        ("ReportStatus", "Report stage status"),
        ("LinkType", "Physical link classification"),
        ("CauseOfFailure", "Confirmed cause of failure"),
        ("MttrStatus", "Repair window against the MTTR budget"),
        ("NotificationKind", "Reason a notification was written"),
        // Records
        ("Escalation", "Fault-link escalation (root aggregate)"),
        ("Report", "Field report with stage photos"),
        ("RcaRecord", "Root-cause analysis form, one per escalation"),
        ("NotificationEntry", "Notification log row"),
        ("Site", "Provider site reference row"),
        ("Profile", "User profile row"),
    ]
}

/// Generate JSON Schema for a type by name.
///
/// Returns the schema as a serde_json::Value, or None if the type is unknown.
pub fn generate_schema(type_name: &str) -> Option<Value> {
    let schema = match type_name {
        "EscalationId" => schema_for!(EscalationId),
        "ReportId" => schema_for!(ReportId),
        "RcaId" => schema_for!(RcaId),
        "NotificationId" => schema_for!(NotificationId),
        "TicketId" => schema_for!(TicketId),
        "UserId" => schema_for!(UserId),
        "Actor" => schema_for!(Actor),
        "Provider" => schema_for!(Provider),
        "Role" => schema_for!(Role),
        "EscalationStatus" => schema_for!(EscalationStatus),
        "ReportStatus" => schema_for!(ReportStatus),
        "LinkType" => schema_for!(LinkType),
        "CauseOfFailure" => schema_for!(CauseOfFailure),
        "MttrStatus" => schema_for!(MttrStatus),
        "NotificationKind" => schema_for!(NotificationKind),
        "Escalation" => schema_for!(Escalation),
        "Report" => schema_for!(Report),
        "RcaRecord" => schema_for!(RcaRecord),
        "NotificationEntry" => schema_for!(NotificationEntry),
        "Site" => schema_for!(Site),
        "Profile" => schema_for!(Profile),
        _ => return None,
    };

    serde_json::to_value(schema).ok()
}

/// Generate all schemas as a map from type name to schema.
pub fn generate_all_schemas() -> BTreeMap<String, Value> {
    let mut schemas = BTreeMap::new();
    for (name, _desc) in available_schemas() {
        if let Some(schema) = generate_schema(name) {
            schemas.insert(name.to_string(), schema);
        }
    }
    schemas
}

/// Schema output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    /// Pretty-printed JSON (default)
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

/// Format a schema value for output.
pub fn format_schema(schema: &Value, format: SchemaFormat) -> String {
    let rendered = match format {
        SchemaFormat::Json => serde_json::to_string_pretty(schema),
        SchemaFormat::JsonCompact => serde_json::to_string(schema),
    };
    rendered.unwrap_or_else(|_| "null".to_string())
}
