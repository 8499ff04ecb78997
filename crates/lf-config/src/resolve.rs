//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG paths → /etc → defaults.

use std::path::{Path, PathBuf};

use crate::lifecycle::LifecycleConfig;
use crate::validate::{validate_config, ValidationError};

/// Discovered configuration file path.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path to lifecycle.json (or None if not found).
    pub config: Option<PathBuf>,

    /// Source of the lifecycle config (for diagnostics).
    pub source: ConfigSource,
}

/// Where a configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/link-fault/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "LF_CONFIG";
pub const ENV_CONFIG_DIR: &str = "LINK_FAULT_CONFIG_DIR";

/// Standard config file name.
pub const CONFIG_FILENAME: &str = "lifecycle.json";

/// Application name for XDG directories.
const APP_NAME: &str = "link-fault";

/// Resolve the lifecycle config path using the standard resolution order.
///
/// 1. Explicit CLI path (if provided)
/// 2. LF_CONFIG environment variable
/// 3. LINK_FAULT_CONFIG_DIR environment variable + filename
/// 4. XDG config directory (~/.config/link-fault/)
/// 5. System config (/etc/link-fault/)
/// 6. Built-in defaults (None)
pub fn resolve_config(cli_config: Option<&Path>) -> ConfigPaths {
    let mut paths = ConfigPaths::default();

    // 1. CLI argument
    if let Some(path) = cli_config {
        if path.exists() {
            paths.config = Some(path.to_path_buf());
            paths.source = ConfigSource::CliArgument;
            return paths;
        }
    }

    // 2. Environment variable (direct path)
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            paths.config = Some(path);
            paths.source = ConfigSource::Environment;
            return paths;
        }
    }

    // 3. Environment variable (config dir)
    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(CONFIG_FILENAME);
        if path.exists() {
            paths.config = Some(path);
            paths.source = ConfigSource::Environment;
            return paths;
        }
    }

    // 4. XDG config directory
    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            paths.config = Some(path);
            paths.source = ConfigSource::XdgConfig;
            return paths;
        }
    }

    // 5. System config
    let system_path = system_config_dir().join(CONFIG_FILENAME);
    if system_path.exists() {
        paths.config = Some(system_path);
        paths.source = ConfigSource::SystemConfig;
        return paths;
    }

    // 6. Built-in default (None)
    paths
}

/// A resolved, parsed and validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LifecycleConfig,
    pub paths: ConfigPaths,
    /// Raw file contents as read from disk.
    pub raw: Option<String>,
}

/// Resolve, read and validate the lifecycle config.
///
/// An explicit CLI path that does not exist is an error rather than a
/// silent fallback to defaults.
pub fn load_config(cli_config: Option<&Path>) -> Result<LoadedConfig, ValidationError> {
    if let Some(path) = cli_config {
        if !path.exists() {
            return Err(ValidationError::IoError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    }

    let paths = resolve_config(cli_config);
    let (config, raw) = match &paths.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
            })?;
            (LifecycleConfig::parse_json(&raw)?, Some(raw))
        }
        None => (LifecycleConfig::default(), None),
    };

    validate_config(&config)?;

    Ok(LoadedConfig { config, paths, raw })
}

/// Get the XDG config directory for link-fault.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(format!("{}", ConfigSource::SystemConfig), "system config");
        assert_eq!(
            format!("{}", ConfigSource::BuiltinDefault),
            "builtin default"
        );
    }

    #[test]
    fn test_system_config_dir() {
        assert_eq!(system_config_dir(), PathBuf::from("/etc/link-fault"));
    }

    #[test]
    fn test_load_config_missing_cli_path_errors() {
        let err = load_config(Some(Path::new("/nonexistent/lifecycle.json"))).unwrap_err();
        assert!(matches!(err, ValidationError::IoError(_)));
    }
}
