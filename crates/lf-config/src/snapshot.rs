//! Configuration snapshots for diagnostics and reproducibility.
//!
//! A snapshot captures the configuration a command ran with so that
//! `config show` output can be compared across hosts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::{ConfigSource, LoadedConfig};
use crate::LifecycleConfig;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Hostname where snapshot was taken.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the config was loaded from.
    #[serde(default)]
    pub config_path: Option<String>,

    /// Source of the configuration.
    pub config_source: String,

    /// SHA-256 of the effective configuration (for quick comparison).
    pub config_hash: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub min_mttr_hours: f64,
    pub breach_ratio: f64,
    pub max_photos: usize,
    pub ticket_prefix: String,
    /// Number of roles with overridden grants.
    pub capability_overrides: usize,
}

impl ConfigSnapshot {
    /// Create a snapshot from a loaded configuration.
    ///
    /// The hash covers the effective (defaulted) config, so a file that
    /// only restates defaults hashes the same as no file at all.
    pub fn new(loaded: &LoadedConfig) -> Self {
        let config = &loaded.config;
        let effective = serde_json::to_string(config).unwrap_or_default();

        ConfigSnapshot {
            timestamp: Utc::now(),
            hostname: current_hostname(),
            schema_version: config.schema_version.clone(),
            config_path: loaded.paths.config.as_ref().map(|p| p.display().to_string()),
            config_source: loaded.paths.source.to_string(),
            config_hash: hash_content(&effective),
            summary: ConfigSummary::from_config(config),
        }
    }

    /// Create a snapshot with only defaults (no config file loaded).
    pub fn defaults_only() -> Self {
        let config = LifecycleConfig::default();
        let effective = serde_json::to_string(&config).unwrap_or_default();

        ConfigSnapshot {
            timestamp: Utc::now(),
            hostname: current_hostname(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            config_path: None,
            config_source: ConfigSource::BuiltinDefault.to_string(),
            config_hash: hash_content(&effective),
            summary: ConfigSummary::from_config(&config),
        }
    }

    /// Serialize snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check if this snapshot matches another (same effective config).
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.config_hash == other.config_hash
    }

    /// Get a short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.config_hash[..12.min(self.config_hash.len())]
    }
}

impl ConfigSummary {
    fn from_config(config: &LifecycleConfig) -> Self {
        ConfigSummary {
            min_mttr_hours: config.min_mttr_hours,
            breach_ratio: config.breach_ratio,
            max_photos: config.max_photos,
            ticket_prefix: config.ticket_prefix.clone(),
            capability_overrides: config.capabilities.len(),
        }
    }
}

fn current_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().to_string())
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
