//! MTTR breach detection.
//!
//! An open escalation is urgent once `elapsed >= mttr_hours * breach_ratio`.
//! The first scan that sees it urgent writes one `mttr_breach` entry to the
//! notification log; the log's unique constraint on
//! `(escalation_id, kind)` turns any later or concurrent attempt into
//! "already notified". Alert writes are best effort and never fail a scan.

use chrono::{DateTime, Utc};
use lf_common::{
    Actor, Escalation, EscalationId, NotificationEntry, NotificationId, NotificationKind, TicketId,
};
use lf_config::Action;
use serde::Serialize;

use super::mttr::{breach_threshold_hours, is_urgent};
use super::Engine;
use crate::logging::{event_names, Stage};
use crate::store::{EscalationFilter, NotificationFilter, WriteBatch, WriteOp};

/// One urgent escalation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreachEntry {
    pub escalation_id: EscalationId,
    pub ticket_id: TicketId,
    pub link_id: String,
    pub mttr_hours: f64,
    pub elapsed_hours: f64,
    pub threshold_hours: f64,
}

/// Outcome of one breach scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BreachReport {
    pub scanned_at: Option<DateTime<Utc>>,
    /// Open escalations examined.
    pub scanned: usize,
    pub urgent: Vec<BreachEntry>,
    /// Notification rows written by this scan.
    pub notified: Vec<NotificationEntry>,
    pub already_notified: Vec<EscalationId>,
    /// Escalations whose alert write failed (logged, not raised).
    pub failed: Vec<EscalationId>,
}

impl BreachReport {
    pub fn urgent_ids(&self) -> Vec<&EscalationId> {
        self.urgent.iter().map(|b| &b.escalation_id).collect()
    }

    pub fn is_urgent(&self, id: &EscalationId) -> bool {
        self.urgent.iter().any(|b| &b.escalation_id == id)
    }
}

/// Evaluate one escalation against the breach threshold.
///
/// Returns None for resolved or closed escalations and for open ones still
/// under the threshold.
pub fn evaluate(escalation: &Escalation, now: DateTime<Utc>, breach_ratio: f64) -> Option<BreachEntry> {
    if !escalation.status.is_open() {
        return None;
    }
    let elapsed_hours = escalation.elapsed_hours(now);
    if !is_urgent(elapsed_hours, escalation.mttr_hours, breach_ratio) {
        return None;
    }
    Some(BreachEntry {
        escalation_id: escalation.id.clone(),
        ticket_id: escalation.ticket_id.clone(),
        link_id: escalation.link_id.clone(),
        mttr_hours: escalation.mttr_hours,
        elapsed_hours,
        threshold_hours: breach_threshold_hours(escalation.mttr_hours, breach_ratio),
    })
}

enum Delivery {
    Written(NotificationEntry),
    AlreadyNotified,
    Failed,
}

impl Engine {
    /// Scan open escalations and alert on new breaches.
    pub fn scan_breaches(&self, actor: &Actor) -> lf_common::Result<BreachReport> {
        self.authorize(actor, Action::ScanBreaches)?;
        let now = self.now();
        let open = self.store.list_escalations(&EscalationFilter {
            open_only: true,
            ..Default::default()
        })?;

        let mut report = BreachReport {
            scanned_at: Some(now),
            scanned: open.len(),
            ..Default::default()
        };

        for escalation in &open {
            let Some(entry) = evaluate(escalation, now, self.config.breach_ratio) else {
                continue;
            };
            match self.notify_breach(escalation, &entry, now) {
                Delivery::Written(n) => report.notified.push(n),
                Delivery::AlreadyNotified => report.already_notified.push(entry.escalation_id.clone()),
                Delivery::Failed => report.failed.push(entry.escalation_id.clone()),
            }
            report.urgent.push(entry);
        }

        tracing::info!(
            target: event_names::BREACH_SCAN_FINISHED,
            stage = %Stage::Alert,
            scanned = report.scanned,
            urgent = report.urgent.len(),
            notified = report.notified.len(),
            failed = report.failed.len(),
            "breach scan finished"
        );
        Ok(report)
    }

    fn notify_breach(&self, escalation: &Escalation, entry: &BreachEntry, now: DateTime<Utc>) -> Delivery {
        // Fast path: skip the insert when the log already has the alert.
        let filter = NotificationFilter {
            escalation_id: Some(escalation.id.clone()),
            ..Default::default()
        };
        match self.store.notifications(&filter) {
            Ok(rows) if rows.iter().any(|n| n.kind == NotificationKind::MttrBreach) => {
                return Delivery::AlreadyNotified;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    target: event_names::BREACH_NOTIFY_FAILED,
                    stage = %Stage::Alert,
                    escalation_id = %escalation.id,
                    error = %err,
                    "could not read notification log"
                );
                return Delivery::Failed;
            }
        }

        let notice = NotificationEntry {
            id: NotificationId::new(),
            escalation_id: escalation.id.clone(),
            recipient: Some(escalation.created_by.clone()),
            kind: NotificationKind::MttrBreach,
            message: self.config.render_breach_message(
                &escalation.ticket_id.0,
                &escalation.link_id,
                entry.elapsed_hours,
                escalation.mttr_hours,
            ),
            created_at: now,
            is_read: false,
            read_at: None,
        };

        match self
            .store
            .commit(WriteBatch::new().with(WriteOp::InsertNotification(notice.clone())))
        {
            Ok(_) => {
                tracing::warn!(
                    target: event_names::BREACH_DETECTED,
                    stage = %Stage::Alert,
                    escalation_id = %escalation.id,
                    ticket_id = %escalation.ticket_id,
                    elapsed_hours = entry.elapsed_hours,
                    threshold_hours = entry.threshold_hours,
                    "MTTR breach notified"
                );
                Delivery::Written(notice)
            }
            Err(err) if err.is_unique_violation() => Delivery::AlreadyNotified,
            Err(err) => {
                tracing::warn!(
                    target: event_names::BREACH_NOTIFY_FAILED,
                    stage = %Stage::Alert,
                    escalation_id = %escalation.id,
                    error = %err,
                    "breach notification not written"
                );
                Delivery::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testkit::*;
    use super::*;
    use chrono::Duration;
    use lf_common::EscalationStatus;

    #[test]
    fn test_eight_of_ten_is_urgent_six_is_not() {
        let h = harness();
        let mut e = h.engine.create_escalation(&fibre(), &glo_input("10")).unwrap();
        assert!(evaluate(&e, t0() + Duration::hours(8), 0.7).is_some());
        assert!(evaluate(&e, t0() + Duration::hours(6), 0.7).is_none());
        e.status = EscalationStatus::Resolved;
        assert!(evaluate(&e, t0() + Duration::hours(80), 0.7).is_none());
    }

    #[test]
    fn test_scan_notifies_once() {
        let h = harness();
        let e = h.engine.create_escalation(&fibre(), &glo_input("10")).unwrap();
        h.clock.advance(Duration::hours(8));

        let first = h.engine.scan_breaches(&staff()).unwrap();
        assert_eq!(first.urgent_ids(), vec![&e.id]);
        assert_eq!(first.notified.len(), 1);
        assert_eq!(first.notified[0].recipient.as_ref(), Some(&e.created_by));
        assert!(first.notified[0].message.contains(&e.ticket_id.0));

        let second = h.engine.scan_breaches(&staff()).unwrap();
        assert!(second.is_urgent(&e.id));
        assert!(second.notified.is_empty());
        assert_eq!(second.already_notified, vec![e.id.clone()]);
    }

    #[test]
    fn test_under_threshold_not_flagged() {
        let h = harness();
        h.engine.create_escalation(&fibre(), &glo_input("10")).unwrap();
        h.clock.advance(Duration::hours(6));
        let report = h.engine.scan_breaches(&admin()).unwrap();
        assert_eq!(report.scanned, 1);
        assert!(report.urgent.is_empty());
    }
}
