//! Lifecycle configuration types.
//!
//! Every field has a serde default, so `{}` is a valid config file.

use lf_common::Role;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::capabilities::{Action, CapabilityTable};
use crate::validate::ValidationError;

/// Placeholder tokens understood by `breach_message_template`.
pub const TEMPLATE_TOKENS: [&str; 4] = ["{ticket}", "{link_id}", "{elapsed}", "{mttr}"];

/// Complete lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Smallest accepted MTTR budget, in hours.
    #[serde(default = "default_min_mttr_hours")]
    pub min_mttr_hours: f64,

    /// Fraction of the MTTR budget after which an open escalation is urgent.
    #[serde(default = "default_breach_ratio")]
    pub breach_ratio: f64,

    /// Upper bound on photos per report stage.
    #[serde(default = "default_max_photos")]
    pub max_photos: usize,

    #[serde(default = "default_ticket_prefix")]
    pub ticket_prefix: String,

    /// Fresh ticket codes tried after a unique-constraint conflict.
    #[serde(default = "default_ticket_retry_attempts")]
    pub ticket_retry_attempts: u32,

    /// Base URL prepended to stored object paths.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_breach_message_template")]
    pub breach_message_template: String,

    /// Per-role grant overrides; roles not listed keep the default grants.
    #[serde(default)]
    pub capabilities: BTreeMap<Role, BTreeSet<Action>>,

    #[serde(default)]
    pub notes: Option<String>,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

fn default_min_mttr_hours() -> f64 {
    0.1
}

fn default_breach_ratio() -> f64 {
    0.7
}

fn default_max_photos() -> usize {
    3
}

fn default_ticket_prefix() -> String {
    "ESC-".to_string()
}

fn default_ticket_retry_attempts() -> u32 {
    3
}

fn default_public_base_url() -> String {
    "file:///var/lib/link-fault/media".to_string()
}

fn default_breach_message_template() -> String {
    "MTTR breach: {ticket} ({link_id}) open {elapsed}h of {mttr}h budget".to_string()
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            min_mttr_hours: default_min_mttr_hours(),
            breach_ratio: default_breach_ratio(),
            max_photos: default_max_photos(),
            ticket_prefix: default_ticket_prefix(),
            ticket_retry_attempts: default_ticket_retry_attempts(),
            public_base_url: default_public_base_url(),
            breach_message_template: default_breach_message_template(),
            capabilities: BTreeMap::new(),
            notes: None,
        }
    }
}

impl LifecycleConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_json(&content)
    }

    /// Parse from a JSON string.
    pub fn parse_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Effective capability table (defaults plus overrides).
    pub fn capability_table(&self) -> CapabilityTable {
        CapabilityTable::with_overrides(&self.capabilities)
    }

    /// Render the breach notification message for one escalation.
    pub fn render_breach_message(
        &self,
        ticket: &str,
        link_id: &str,
        elapsed_hours: f64,
        mttr_hours: f64,
    ) -> String {
        self.breach_message_template
            .replace("{ticket}", ticket)
            .replace("{link_id}", link_id)
            .replace("{elapsed}", &format!("{:.1}", elapsed_hours))
            .replace("{mttr}", &format!("{}", mttr_hours))
    }
}
