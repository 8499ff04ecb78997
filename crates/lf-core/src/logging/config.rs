//! Log settings for one `lf-core` run.
//!
//! Sources, lowest first: defaults, `RUST_LOG`, `LF_LOG`, `LF_LOG_FORMAT`,
//! then the global `-v`/`-q`/`--format` flags. JSON command output switches
//! logs to JSONL unless `LF_LOG_FORMAT` pins the format.

use lf_common::OutputFormat;
use tracing_subscriber::filter::LevelFilter;

pub const ENV_LOG: &str = "LF_LOG";
pub const ENV_LOG_FORMAT: &str = "LF_LOG_FORMAT";
const ENV_RUST_LOG: &str = "RUST_LOG";

/// Where log lines go and how they look. Both variants write to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Jsonl,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" => Some(LogFormat::Human),
            "jsonl" | "json" => Some(LogFormat::Jsonl),
            _ => None,
        }
    }
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" | "quiet" => Some(LevelFilter::OFF),
        _ => None,
    }
}

/// Most verbose level named in a `RUST_LOG` directive list.
///
/// Targets are ignored: `lf_core=debug,warn` yields debug.
fn rust_log_level(value: &str) -> Option<LevelFilter> {
    value
        .split(',')
        .filter_map(|directive| directive.rsplit('=').next().and_then(parse_level))
        .max()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LevelFilter,
    /// Set when `LF_LOG_FORMAT` chose the format.
    format_pinned: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LevelFilter::INFO,
            format_pinned: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = LogConfig::default();

        let level = lookup(ENV_LOG)
            .as_deref()
            .and_then(parse_level)
            .or_else(|| lookup(ENV_RUST_LOG).as_deref().and_then(rust_log_level));
        if let Some(level) = level {
            config.level = level;
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT).as_deref().and_then(LogFormat::parse) {
            config.format = format;
            config.format_pinned = true;
        }
        config
    }

    /// Fold in the global CLI flags.
    ///
    /// `-q` keeps errors only and wins over `-v`. One `-v` raises the level to
    /// at least debug, two or more to trace.
    pub fn with_cli(mut self, verbose: u8, quiet: bool, output: OutputFormat) -> Self {
        if quiet {
            self.level = LevelFilter::ERROR;
        } else if verbose == 1 {
            self.level = self.level.max(LevelFilter::DEBUG);
        } else if verbose > 1 {
            self.level = LevelFilter::TRACE;
        }
        if !self.format_pinned && output.is_machine() {
            self.format = LogFormat::Jsonl;
        }
        self
    }
}
