//! Link fault tracker configuration loading and validation.
//!
//! This crate provides:
//! - The typed lifecycle configuration (MTTR floor, breach ratio, photo limits, tickets)
//! - The role/action capability table
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation
//! - Config snapshots for diagnostics

pub mod capabilities;
pub mod lifecycle;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use capabilities::{Action, CapabilityTable};
pub use lifecycle::LifecycleConfig;
pub use resolve::{load_config, resolve_config, ConfigPaths, ConfigSource, LoadedConfig};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
