//! Error types for the link fault tracker.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Validation Failed
//!   Reason: invalid value for mttr_hours: must be at least 0.1, got 0.05
//!   Fix: Correct the highlighted field and resubmit; nothing was saved.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 11,
//!   "category": "validation",
//!   "message": "invalid value for mttr_hours: must be at least 0.1, got 0.05",
//!   "recoverable": true,
//!   "suggested_action": "fix_input",
//!   "context": { "field": "mttr_hours" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input rejected before any write.
    Validation,
    /// Role not permitted for the action.
    Authorization,
    /// Transition not allowed from the current state.
    Lifecycle,
    /// Referenced row does not exist.
    NotFound,
    /// Backend rejected or failed the write.
    Persistence,
    /// Blob upload/listing errors.
    Storage,
    /// Configuration file errors.
    Config,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Authorization => write!(f, "authorization"),
            ErrorCategory::Lifecycle => write!(f, "lifecycle"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Persistence => write!(f, "persistence"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested next step for a caller that received an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Correct the input and resubmit.
    FixInput,
    /// Re-fetch the row; someone else changed it.
    Refresh,
    /// Open the existing record instead of creating a new one.
    OpenExisting,
    /// Retry the operation.
    Retry,
    /// Ask an operator with the right role.
    RequestAccess,
    /// Run config validation.
    RunCheck,
    /// Manual intervention required.
    ManualIntervention,
    /// Abort the operation.
    Abort,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::FixInput => write!(f, "fix_input"),
            SuggestedAction::Refresh => write!(f, "refresh"),
            SuggestedAction::OpenExisting => write!(f, "open_existing"),
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::RequestAccess => write!(f, "request_access"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
            SuggestedAction::Abort => write!(f, "abort"),
        }
    }
}

/// Unified error type for the link fault tracker.
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors (10-19)
    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("site A and site B must differ (both {site})")]
    DuplicateSites { site: String },

    #[error("{stage} requires between {min} and {max} images, got {got}")]
    ImageCount {
        stage: String,
        min: usize,
        max: usize,
        got: usize,
    },

    #[error("invalid timestamp for {field}: {value}")]
    InvalidTimestamp { field: String, value: String },

    // Authorization errors (20-29)
    #[error("role {role} is not permitted to {action}")]
    Forbidden { role: String, action: String },

    // Lifecycle errors (30-39)
    #[error("invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        id: String,
        from: String,
        to: String,
    },

    #[error("escalation {escalation_id} already has a report")]
    ReportAlreadyAttached { escalation_id: String },

    #[error("escalation {escalation_id} cannot be closed: {reason}")]
    NotClosable {
        escalation_id: String,
        reason: String,
    },

    // Not found errors (40-49)
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // Persistence errors (50-59)
    #[error("unique constraint violated on {table}.{key}: {value}")]
    Conflict {
        table: String,
        key: String,
        value: String,
    },

    #[error("persistence failure: {0}")]
    Persistence(String),

    // Storage errors (60-69)
    #[error("object storage failure: {0}")]
    Storage(String),

    // Configuration errors (70-79)
    #[error("configuration error: {0}")]
    Config(String),

    // I/O errors (80-89)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a missing-field validation error.
    pub fn missing(field: impl Into<String>) -> Self {
        Error::MissingField {
            field: field.into(),
        }
    }

    /// Shorthand for an invalid-value validation error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a not-found error.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Validation errors
    /// - 20-29: Authorization errors
    /// - 30-39: Lifecycle errors
    /// - 40-49: Not found errors
    /// - 50-59: Persistence errors
    /// - 60-69: Storage errors
    /// - 70-79: Configuration errors
    /// - 80-89: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::MissingField { .. } => 10,
            Error::InvalidValue { .. } => 11,
            Error::DuplicateSites { .. } => 12,
            Error::ImageCount { .. } => 13,
            Error::InvalidTimestamp { .. } => 14,
            Error::Forbidden { .. } => 20,
            Error::InvalidTransition { .. } => 30,
            Error::ReportAlreadyAttached { .. } => 31,
            Error::NotClosable { .. } => 32,
            Error::NotFound { .. } => 40,
            Error::Conflict { .. } => 50,
            Error::Persistence(_) => 51,
            Error::Storage(_) => 60,
            Error::Config(_) => 70,
            Error::Io(_) => 80,
            Error::Json(_) => 81,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MissingField { .. }
            | Error::InvalidValue { .. }
            | Error::DuplicateSites { .. }
            | Error::ImageCount { .. }
            | Error::InvalidTimestamp { .. } => ErrorCategory::Validation,

            Error::Forbidden { .. } => ErrorCategory::Authorization,

            Error::InvalidTransition { .. }
            | Error::ReportAlreadyAttached { .. }
            | Error::NotClosable { .. } => ErrorCategory::Lifecycle,

            Error::NotFound { .. } => ErrorCategory::NotFound,

            Error::Conflict { .. } | Error::Persistence(_) => ErrorCategory::Persistence,

            Error::Storage(_) => ErrorCategory::Storage,

            Error::Config(_) => ErrorCategory::Config,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable by the caller.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Validation: the form keeps its input, fix and resubmit
            Error::MissingField { .. }
            | Error::InvalidValue { .. }
            | Error::DuplicateSites { .. }
            | Error::ImageCount { .. }
            | Error::InvalidTimestamp { .. } => true,

            Error::Forbidden { .. } => false,

            Error::InvalidTransition { .. } => false,
            Error::ReportAlreadyAttached { .. } => false,
            Error::NotClosable { .. } => true, // finish the RCA first

            Error::NotFound { .. } => false,

            Error::Conflict { .. } => true,
            Error::Persistence(_) => true,

            Error::Storage(_) => true,
            Error::Config(_) => true,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Returns the suggested action for callers.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::MissingField { .. }
            | Error::InvalidValue { .. }
            | Error::DuplicateSites { .. }
            | Error::ImageCount { .. }
            | Error::InvalidTimestamp { .. } => SuggestedAction::FixInput,

            Error::Forbidden { .. } => SuggestedAction::RequestAccess,

            Error::InvalidTransition { .. } => SuggestedAction::Refresh,
            Error::ReportAlreadyAttached { .. } => SuggestedAction::OpenExisting,
            Error::NotClosable { .. } => SuggestedAction::Abort,

            Error::NotFound { .. } => SuggestedAction::Refresh,

            Error::Conflict { .. } => SuggestedAction::OpenExisting,
            Error::Persistence(_) => SuggestedAction::Retry,

            Error::Storage(_) => SuggestedAction::Retry,
            Error::Config(_) => SuggestedAction::RunCheck,
            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::MissingField { .. } | Error::InvalidValue { .. } => {
                "Correct the highlighted field and resubmit; nothing was saved."
            }
            Error::DuplicateSites { .. } => {
                "Pick two different sites for site A and site B."
            }
            Error::ImageCount { .. } => {
                "Attach between one and three photos for this stage (report creation allows none)."
            }
            Error::InvalidTimestamp { .. } => {
                "Use RFC 3339 or 'YYYY-MM-DDTHH:MM' (interpreted as UTC)."
            }

            Error::Forbidden { .. } => {
                "Ask a user with the required role, or update the capability table in the config file."
            }

            Error::InvalidTransition { .. } => {
                "The record moved on since you loaded it. Refresh and check its current stage."
            }
            Error::ReportAlreadyAttached { .. } => {
                "Open the existing report with 'lf-core report show' and update it instead."
            }
            Error::NotClosable { .. } => {
                "Submit the RCA with 'lf-core rca submit' before closing the escalation."
            }

            Error::NotFound { .. } => {
                "The record was deleted or never existed. List records with 'lf-core escalation list'."
            }

            Error::Conflict { .. } => {
                "A record with this key already exists. Open it instead of creating a new one."
            }
            Error::Persistence(_) => {
                "The store rejected the write. Check the data directory and retry."
            }

            Error::Storage(_) => {
                "Photo storage failed. Check the media directory permissions and retry; uploaded files may be orphaned."
            }
            Error::Config(_) => {
                "Run 'lf-core config validate' to check configuration syntax."
            }

            Error::Io(_) => {
                "Check disk space, permissions, and that the data directory exists. Retry the operation."
            }
            Error::Json(_) => {
                "Invalid JSON in a data file. Check syntax with 'jq .' or restore from backup."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::MissingField { .. } => "Missing Required Field",
            Error::InvalidValue { .. } => "Validation Failed",
            Error::DuplicateSites { .. } => "Duplicate Site Selection",
            Error::ImageCount { .. } => "Wrong Number of Photos",
            Error::InvalidTimestamp { .. } => "Invalid Timestamp",

            Error::Forbidden { .. } => "Permission Denied",

            Error::InvalidTransition { .. } => "Invalid Stage Transition",
            Error::ReportAlreadyAttached { .. } => "Report Already Exists",
            Error::NotClosable { .. } => "Escalation Not Closable",

            Error::NotFound { .. } => "Not Found",

            Error::Conflict { .. } => "Duplicate Record",
            Error::Persistence(_) => "Persistence Error",

            Error::Storage(_) => "Storage Error",
            Error::Config(_) => "Configuration Error",

            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested next step.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g., field, entity id).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::MissingField { field }
            | Error::InvalidValue { field, .. }
            | Error::InvalidTimestamp { field, .. } => {
                context.insert("field".to_string(), serde_json::json!(field));
            }
            Error::ImageCount { stage, got, .. } => {
                context.insert("stage".to_string(), serde_json::json!(stage));
                context.insert("images".to_string(), serde_json::json!(got));
            }
            Error::Forbidden { role, action } => {
                context.insert("role".to_string(), serde_json::json!(role));
                context.insert("action".to_string(), serde_json::json!(action));
            }
            Error::InvalidTransition { entity, id, .. } | Error::NotFound { entity, id } => {
                context.insert("entity".to_string(), serde_json::json!(entity));
                context.insert("id".to_string(), serde_json::json!(id));
            }
            Error::ReportAlreadyAttached { escalation_id }
            | Error::NotClosable { escalation_id, .. } => {
                context.insert("escalation_id".to_string(), serde_json::json!(escalation_id));
            }
            Error::Conflict { table, key, .. } => {
                context.insert("table".to_string(), serde_json::json!(table));
                context.insert("key".to_string(), serde_json::json!(key));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_categories() {
        let cases: Vec<(Error, ErrorCategory, u32)> = vec![
            (Error::missing("description"), ErrorCategory::Validation, 10),
            (
                Error::Forbidden {
                    role: "staff".into(),
                    action: "submit_rca".into(),
                },
                ErrorCategory::Authorization,
                20,
            ),
            (
                Error::ReportAlreadyAttached {
                    escalation_id: "e1".into(),
                },
                ErrorCategory::Lifecycle,
                31,
            ),
            (Error::not_found("escalation", "e1"), ErrorCategory::NotFound, 40),
            (
                Error::Conflict {
                    table: "rca_forms".into(),
                    key: "escalation_id".into(),
                    value: "e1".into(),
                },
                ErrorCategory::Persistence,
                50,
            ),
            (Error::Storage("disk full".into()), ErrorCategory::Storage, 60),
        ];

        for (err, category, code) in cases {
            assert_eq!(err.category(), category, "{}", err);
            assert_eq!(err.code(), code, "{}", err);
        }
    }

    #[test]
    fn test_validation_errors_are_recoverable() {
        assert!(Error::missing("x").is_recoverable());
        assert!(Error::DuplicateSites { site: "S1".into() }.is_recoverable());
        assert_eq!(
            Error::invalid("mttr_hours", "too small").suggested_action(),
            SuggestedAction::FixInput
        );
    }

    #[test]
    fn test_structured_error_context() {
        let err = Error::invalid("mttr_hours", "must be at least 0.1");
        let structured = StructuredError::from(&err);
        assert_eq!(structured.code, 11);
        assert_eq!(structured.category, ErrorCategory::Validation);
        assert_eq!(
            structured.context.get("field"),
            Some(&serde_json::json!("mttr_hours"))
        );
        let json = structured.to_json();
        assert!(json.contains(r#""suggested_action":"fix_input""#));
    }

    #[test]
    fn test_format_error_human_without_color() {
        let err = Error::not_found("report", "r-1");
        let out = format_error_human(&err, false);
        assert!(out.starts_with("✗ Not Found"));
        assert!(out.contains("Reason: report not found: r-1"));
        assert!(out.contains("Fix: "));
    }
}
