//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::capabilities::Action;
use crate::lifecycle::{LifecycleConfig, TEMPLATE_TOKENS};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 70,
            ValidationError::ParseError(_) => 71,
            ValidationError::SemanticError(_) => 72,
            ValidationError::InvalidValue { .. } => 73,
            ValidationError::VersionMismatch { .. } => 74,
        }
    }
}

impl From<ValidationError> for lf_common::Error {
    fn from(err: ValidationError) -> Self {
        lf_common::Error::Config(err.to_string())
    }
}

/// Validate a lifecycle configuration semantically.
pub fn validate_config(config: &LifecycleConfig) -> ValidationResult<()> {
    let ours = crate::CONFIG_SCHEMA_VERSION.split('.').next();
    if config.schema_version.split('.').next() != ours {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if !config.min_mttr_hours.is_finite() || config.min_mttr_hours <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "min_mttr_hours".to_string(),
            message: format!("Must be positive, got {}", config.min_mttr_hours),
        });
    }

    if !(config.breach_ratio > 0.0 && config.breach_ratio <= 1.0) {
        return Err(ValidationError::InvalidValue {
            field: "breach_ratio".to_string(),
            message: format!("Must be in (0, 1], got {}", config.breach_ratio),
        });
    }

    if config.max_photos == 0 {
        return Err(ValidationError::InvalidValue {
            field: "max_photos".to_string(),
            message: "Must allow at least one photo per stage".to_string(),
        });
    }

    validate_ticket_prefix(&config.ticket_prefix)?;

    if config.ticket_retry_attempts == 0 {
        return Err(ValidationError::InvalidValue {
            field: "ticket_retry_attempts".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    if config.public_base_url.trim().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "public_base_url".to_string(),
            message: "Must not be empty".to_string(),
        });
    }

    if !TEMPLATE_TOKENS
        .iter()
        .take(2)
        .any(|token| config.breach_message_template.contains(token))
    {
        return Err(ValidationError::InvalidValue {
            field: "breach_message_template".to_string(),
            message: "Must reference {ticket} or {link_id}".to_string(),
        });
    }

    let table = config.capability_table();
    let orphaned: Vec<&str> = Action::ALL
        .iter()
        .filter(|action| table.roles_for(**action).is_empty())
        .map(|action| action.as_str())
        .collect();
    if !orphaned.is_empty() {
        return Err(ValidationError::SemanticError(format!(
            "No role is granted: {}",
            orphaned.join(", ")
        )));
    }

    Ok(())
}

fn validate_ticket_prefix(prefix: &str) -> ValidationResult<()> {
    if prefix.is_empty() || prefix.len() > 16 {
        return Err(ValidationError::InvalidValue {
            field: "ticket_prefix".to_string(),
            message: format!("Must be 1-16 characters, got {:?}", prefix),
        });
    }

    // A trailing alphanumeric would blur into the generated code.
    let last = prefix.chars().last();
    if last.is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidValue {
            field: "ticket_prefix".to_string(),
            message: format!("Must end with a separator such as '-', got {:?}", prefix),
        });
    }

    if prefix.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidValue {
            field: "ticket_prefix".to_string(),
            message: "Must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lf_common::Role;
    use std::collections::BTreeSet;

    #[test]
    fn test_default_config_is_valid() {
        validate_config(&LifecycleConfig::default()).expect("defaults must validate");
    }

    #[test]
    fn test_rejects_breach_ratio_out_of_range() {
        let config = LifecycleConfig {
            breach_ratio: 1.5,
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "breach_ratio"));
        assert_eq!(err.code(), 73);
    }

    #[test]
    fn test_rejects_alphanumeric_prefix_tail() {
        let config = LifecycleConfig {
            ticket_prefix: "ESC".to_string(),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_orphaned_action() {
        let mut config = LifecycleConfig::default();
        config.capabilities.insert(Role::Admin, BTreeSet::new());
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ValidationError::SemanticError(ref m) if m.contains("manage_sites")));
    }

    #[test]
    fn test_rejects_major_version_mismatch() {
        let config = LifecycleConfig {
            schema_version: "2.0.0".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::VersionMismatch { .. })
        ));
    }
}
