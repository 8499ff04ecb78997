//! Exit codes for the lf-core CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0-9: Operational outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, backend failures)

use lf_common::{Error, ErrorCategory};

/// Exit codes for lf-core operations.
///
/// These codes are a stable contract for automation. Changes require
/// a major version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-9)
    // ========================================================================
    /// Success
    Clean = 0,

    /// `alerts scan` found urgent escalations
    Urgent = 1,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments or rejected input
    ArgsError = 10,

    /// Config file missing, unreadable or invalid
    ConfigError = 11,

    /// Role not permitted for the action
    PermissionError = 12,

    /// Table file written by an incompatible version
    VersionError = 13,

    /// Referenced record does not exist
    NotFound = 15,

    /// Transition not allowed from the current state
    LifecycleError = 16,

    /// Unique constraint violated
    ConflictError = 17,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal or backend error
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// Object storage failure
    StorageError = 22,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success (codes 0-1).
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::Urgent)
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        let code = self as i32;
        code >= 20
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::Urgent => "OK_URGENT",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::PermissionError => "ERR_PERMISSION",
            ExitCode::VersionError => "ERR_VERSION",
            ExitCode::NotFound => "ERR_NOT_FOUND",
            ExitCode::LifecycleError => "ERR_LIFECYCLE",
            ExitCode::ConflictError => "ERR_CONFLICT",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::StorageError => "ERR_STORAGE",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        if matches!(err, Error::Conflict { .. }) {
            return ExitCode::ConflictError;
        }
        match err.category() {
            ErrorCategory::Validation => ExitCode::ArgsError,
            ErrorCategory::Authorization => ExitCode::PermissionError,
            ErrorCategory::Lifecycle => ExitCode::LifecycleError,
            ErrorCategory::NotFound => ExitCode::NotFound,
            ErrorCategory::Persistence => ExitCode::InternalError,
            ErrorCategory::Storage => ExitCode::StorageError,
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
