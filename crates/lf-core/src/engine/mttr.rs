//! MTTR arithmetic and breach thresholds.
//!
//! All functions here are pure; the engine supplies `now` from its clock.

use chrono::{DateTime, NaiveDateTime, Utc};
use lf_common::{Error, MttrStatus};

/// Naive layouts accepted for free-entry timestamps, read as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse an RFC 3339 timestamp or one of the local forms such as
/// `2024-01-01T05:30`.
pub fn parse_timestamp(field: &str, value: &str) -> lf_common::Result<DateTime<Utc>> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err(Error::missing(field));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::InvalidTimestamp {
            field: field.to_string(),
            value: raw.to_string(),
        })
}

/// Whole minutes from `start` to `end`; negative when `end` precedes `start`.
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    end.signed_duration_since(start).num_minutes()
}

/// Integer hours of a repair window: `floor(minutes / 60)`, never negative.
pub fn mttr_used(minutes: i64) -> i64 {
    minutes.max(0) / 60
}

/// Exceeded iff the window is strictly longer than the budget.
pub fn mttr_status(minutes: i64, mttr_hours: f64) -> MttrStatus {
    if (minutes.max(0) as f64) > mttr_hours * 60.0 {
        MttrStatus::ExceededMttr
    } else {
        MttrStatus::WithinMttr
    }
}

/// Result of measuring an RCA window against the escalation budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MttrOutcome {
    pub minutes: i64,
    pub mttr_used: i64,
    pub mttr_status: MttrStatus,
    /// The end preceded the start and the window was clamped to zero.
    pub clamped: bool,
}

pub fn measure(start: DateTime<Utc>, end: DateTime<Utc>, mttr_hours: f64) -> MttrOutcome {
    let raw = minutes_between(start, end);
    let minutes = raw.max(0);
    MttrOutcome {
        minutes,
        mttr_used: mttr_used(minutes),
        mttr_status: mttr_status(minutes, mttr_hours),
        clamped: raw < 0,
    }
}

/// Hours after which an open escalation counts as urgent.
pub fn breach_threshold_hours(mttr_hours: f64, breach_ratio: f64) -> f64 {
    mttr_hours * breach_ratio
}

pub fn is_urgent(elapsed_hours: f64, mttr_hours: f64, breach_ratio: f64) -> bool {
    elapsed_hours >= breach_threshold_hours(mttr_hours, breach_ratio)
}
