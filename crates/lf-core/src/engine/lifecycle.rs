//! Escalation close/delete, list refresh and the notification inbox.

use lf_common::{
    Actor, Error, Escalation, EscalationId, EscalationStatus, NotificationEntry, NotificationId,
    ReportStatus, Role,
};
use lf_config::Action;
use serde::Serialize;

use super::alerting::BreachReport;
use super::Engine;
use crate::logging::{event_names, Stage};
use crate::store::{EscalationFilter, NotificationFilter, WriteBatch, WriteOp};

/// A list refresh: the escalations plus the breach scan it triggered.
#[derive(Debug, Clone, Serialize)]
pub struct EscalationListing {
    pub escalations: Vec<Escalation>,
    /// None when the actor may not scan or the scan failed.
    pub breaches: Option<BreachReport>,
}

impl Engine {
    /// List escalations and run the breach scan, as every refresh does.
    ///
    /// A failed or forbidden scan does not fail the listing.
    pub fn refresh_escalations(
        &self,
        actor: &Actor,
        filter: &EscalationFilter,
    ) -> lf_common::Result<EscalationListing> {
        let breaches = if self.capabilities.allows(actor.role, Action::ScanBreaches) {
            match self.scan_breaches(actor) {
                Ok(report) => Some(report),
                Err(err) => {
                    tracing::warn!(
                        target: event_names::BREACH_NOTIFY_FAILED,
                        stage = %Stage::Alert,
                        error = %err,
                        "breach scan skipped during refresh"
                    );
                    None
                }
            }
        } else {
            None
        };
        let escalations = self.store.list_escalations(filter)?;
        Ok(EscalationListing {
            escalations,
            breaches,
        })
    }

    /// Move a resolved escalation to `closed`.
    ///
    /// Requires an RCA on file and every report closed.
    pub fn close_escalation(&self, actor: &Actor, id: &EscalationId) -> lf_common::Result<Escalation> {
        self.authorize(actor, Action::CloseEscalation)?;
        let mut escalation = self.get_escalation(id)?;
        if escalation.status == EscalationStatus::Closed {
            return Err(Error::InvalidTransition {
                entity: "escalation".to_string(),
                id: id.to_string(),
                from: escalation.status.to_string(),
                to: EscalationStatus::Closed.to_string(),
            });
        }
        if self.store.find_rca(id)?.is_none() {
            return Err(Error::NotClosable {
                escalation_id: id.to_string(),
                reason: "no RCA on file".to_string(),
            });
        }
        let open_reports = self
            .store
            .reports_for(id)?
            .iter()
            .filter(|r| r.status != ReportStatus::Closed)
            .count();
        if open_reports > 0 {
            return Err(Error::NotClosable {
                escalation_id: id.to_string(),
                reason: format!("{} report(s) not closed", open_reports),
            });
        }

        escalation.status = EscalationStatus::Closed;
        escalation.updated_at = self.now();
        self.store
            .commit(WriteBatch::new().with(WriteOp::UpdateEscalation(escalation.clone())))?;

        tracing::info!(
            target: event_names::ESCALATION_CLOSED,
            stage = %Stage::Escalation,
            escalation_id = %escalation.id,
            "escalation closed"
        );
        Ok(escalation)
    }

    /// Delete an escalation with its reports, RCA and notifications.
    pub fn delete_escalation(&self, actor: &Actor, id: &EscalationId) -> lf_common::Result<usize> {
        self.authorize(actor, Action::DeleteEscalation)?;
        let changes = self
            .store
            .commit(WriteBatch::new().with(WriteOp::DeleteEscalation(id.clone())))?;
        tracing::info!(
            target: event_names::ESCALATION_DELETED,
            stage = %Stage::Escalation,
            escalation_id = %id,
            rows = changes.len(),
            "escalation deleted"
        );
        Ok(changes.len())
    }

    /// Notifications addressed to the actor; admins see every entry.
    pub fn notifications(
        &self,
        actor: &Actor,
        unread_only: bool,
    ) -> lf_common::Result<Vec<NotificationEntry>> {
        self.authorize(actor, Action::ReadNotifications)?;
        let filter = NotificationFilter {
            recipient: (actor.role != Role::Admin).then(|| actor.id.clone()),
            escalation_id: None,
            unread_only,
        };
        Ok(self.store.notifications(&filter)?)
    }

    pub fn mark_notification_read(
        &self,
        actor: &Actor,
        id: &NotificationId,
    ) -> lf_common::Result<NotificationEntry> {
        let entry = self
            .notifications(actor, false)?
            .into_iter()
            .find(|n| &n.id == id)
            .ok_or_else(|| Error::not_found("notification", id))?;
        if entry.is_read {
            return Ok(entry);
        }
        let at = self.now();
        self.store.commit(
            WriteBatch::new().with(WriteOp::MarkNotificationRead { id: id.clone(), at }),
        )?;
        Ok(NotificationEntry {
            is_read: true,
            read_at: Some(at),
            ..entry
        })
    }
}
