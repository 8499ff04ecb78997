//! Link fault tracker common types, IDs, and errors.
//!
//! This crate provides foundational types shared across lf-core modules:
//! - Record identity types (escalations, reports, RCA forms, notifications)
//! - Domain records and their status enums
//! - Common error types with stable codes
//! - CLI output formats

pub mod error;
pub mod id;
pub mod model;
pub mod output;
pub mod schema;

pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError, SuggestedAction};
pub use id::{EscalationId, NotificationId, RcaId, ReportId, TicketId, UserId};
pub use model::{
    Actor, CauseOfFailure, Escalation, EscalationStatus, LinkType, MttrStatus, NotificationEntry,
    NotificationKind, Profile, Provider, RcaRecord, Report, ReportStatus, Role, Site,
};
pub use output::OutputFormat;
pub use schema::SCHEMA_VERSION;
