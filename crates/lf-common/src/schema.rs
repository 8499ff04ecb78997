//! Schema versioning for persisted tables and CLI payloads.

/// Schema version stamped on every JSON payload and on the table file.
///
/// Bump the minor component for additive record fields and the major
/// component when an existing field changes meaning.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Returns true if a persisted schema version can be read by this build.
pub fn is_compatible(version: &str) -> bool {
    let ours = SCHEMA_VERSION.split('.').next();
    let theirs = version.split('.').next();
    ours.is_some() && ours == theirs
}
