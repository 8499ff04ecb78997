//! Escalation status projection.
//!
//! The escalation's status is a pure function of its report set, except
//! that an explicit close sticks.

use lf_common::{EscalationStatus, Report, ReportStatus};

pub fn project_escalation_status(current: EscalationStatus, reports: &[Report]) -> EscalationStatus {
    if current == EscalationStatus::Closed {
        return EscalationStatus::Closed;
    }
    if reports.is_empty() {
        return EscalationStatus::Pending;
    }
    let active = reports
        .iter()
        .any(|r| matches!(r.status, ReportStatus::InProgress | ReportStatus::Pending));
    if active {
        EscalationStatus::InProgress
    } else {
        EscalationStatus::Resolved
    }
}
