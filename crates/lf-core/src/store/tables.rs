//! In-memory table set and the batch apply logic shared by every backend.

use lf_common::schema::SCHEMA_VERSION;
use lf_common::{
    Escalation, EscalationId, NotificationEntry, Profile, Provider, RcaRecord, Report, ReportId,
    ReportStatus, Site, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{EscalationFilter, NotificationFilter, StoreError, WriteBatch, WriteOp};
use crate::events::{ChangeEvent, ChangeOp, Table};

/// Every persistent table, keyed by row ID where rows have one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub schema_version: String,
    #[serde(default)]
    escalations: BTreeMap<String, Escalation>,
    #[serde(default)]
    reports: BTreeMap<String, Report>,
    #[serde(default)]
    rca_forms: BTreeMap<String, RcaRecord>,
    #[serde(default)]
    notification_log: Vec<NotificationEntry>,
    #[serde(default)]
    sites: Vec<Site>,
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

impl Default for Tables {
    fn default() -> Self {
        Tables {
            schema_version: SCHEMA_VERSION.to_string(),
            escalations: BTreeMap::new(),
            reports: BTreeMap::new(),
            rca_forms: BTreeMap::new(),
            notification_log: Vec::new(),
            sites: Vec::new(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Tables {
    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get_escalation(&self, id: &EscalationId) -> Option<Escalation> {
        self.escalations.get(id.as_str()).cloned()
    }

    pub fn list_escalations(&self, filter: &EscalationFilter) -> Vec<Escalation> {
        let mut rows: Vec<Escalation> = self
            .escalations
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        rows
    }

    pub fn get_report(&self, id: &ReportId) -> Option<Report> {
        self.reports.get(id.as_str()).cloned()
    }

    pub fn reports_for(&self, escalation_id: &EscalationId) -> Vec<Report> {
        let mut rows: Vec<Report> = self
            .reports
            .values()
            .filter(|r| &r.escalation_id == escalation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rows
    }

    pub fn list_reports(&self) -> Vec<Report> {
        self.reports.values().cloned().collect()
    }

    pub fn find_rca(&self, escalation_id: &EscalationId) -> Option<RcaRecord> {
        self.rca_forms
            .values()
            .find(|r| &r.escalation_id == escalation_id)
            .cloned()
    }

    pub fn list_rcas(&self) -> Vec<RcaRecord> {
        self.rca_forms.values().cloned().collect()
    }

    pub fn notifications(&self, filter: &NotificationFilter) -> Vec<NotificationEntry> {
        let mut rows: Vec<NotificationEntry> = self
            .notification_log
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    pub fn sites(&self, provider: Option<Provider>) -> Vec<Site> {
        let mut rows: Vec<Site> = self
            .sites
            .iter()
            .filter(|s| provider.is_none_or(|p| s.provider == p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.provider, &a.id).cmp(&(b.provider, &b.id)));
        rows
    }

    pub fn profile(&self, id: &UserId) -> Option<Profile> {
        self.profiles.get(id.as_str()).cloned()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Apply a batch to a copy of these tables.
    ///
    /// Returns the new table set and one change event per written row. On
    /// error `self` is untouched, which is what makes commits atomic.
    pub fn staged(&self, batch: &WriteBatch) -> Result<(Tables, Vec<ChangeEvent>), StoreError> {
        let mut next = self.clone();
        let mut changes = Vec::new();
        for op in batch.ops() {
            next.apply_op(op, &mut changes)?;
        }
        Ok((next, changes))
    }

    fn apply_op(&mut self, op: &WriteOp, changes: &mut Vec<ChangeEvent>) -> Result<(), StoreError> {
        match op {
            WriteOp::InsertEscalation(e) => {
                if self.escalations.contains_key(e.id.as_str()) {
                    return Err(unique(Table::Escalations, "id", e.id.as_str()));
                }
                if self.escalations.values().any(|x| x.ticket_id == e.ticket_id) {
                    return Err(unique(Table::Escalations, "ticket_id", e.ticket_id.0.as_str()));
                }
                self.escalations.insert(e.id.0.clone(), e.clone());
                changes.push(ChangeEvent::new(Table::Escalations, ChangeOp::Insert, e.id.as_str()));
            }
            WriteOp::UpdateEscalation(e) => {
                let current = self
                    .escalations
                    .get(e.id.as_str())
                    .ok_or_else(|| missing(Table::Escalations, e.id.as_str()))?;
                if current.ticket_id != e.ticket_id
                    && self
                        .escalations
                        .values()
                        .any(|x| x.id != e.id && x.ticket_id == e.ticket_id)
                {
                    return Err(unique(Table::Escalations, "ticket_id", e.ticket_id.0.as_str()));
                }
                self.escalations.insert(e.id.0.clone(), e.clone());
                changes.push(ChangeEvent::new(Table::Escalations, ChangeOp::Update, e.id.as_str()));
            }
            WriteOp::DeleteEscalation(id) => {
                if self.escalations.remove(id.as_str()).is_none() {
                    return Err(missing(Table::Escalations, id.as_str()));
                }
                changes.push(ChangeEvent::new(Table::Escalations, ChangeOp::Delete, id.as_str()));

                let report_ids: Vec<String> = self
                    .reports
                    .values()
                    .filter(|r| &r.escalation_id == id)
                    .map(|r| r.id.0.clone())
                    .collect();
                for rid in report_ids {
                    self.reports.remove(&rid);
                    changes.push(ChangeEvent::new(Table::Reports, ChangeOp::Delete, rid));
                }

                let rca_ids: Vec<String> = self
                    .rca_forms
                    .values()
                    .filter(|r| &r.escalation_id == id)
                    .map(|r| r.id.0.clone())
                    .collect();
                for rid in rca_ids {
                    self.rca_forms.remove(&rid);
                    changes.push(ChangeEvent::new(Table::RcaForms, ChangeOp::Delete, rid));
                }

                let mut kept = Vec::with_capacity(self.notification_log.len());
                for n in self.notification_log.drain(..) {
                    if &n.escalation_id == id {
                        changes.push(ChangeEvent::new(
                            Table::NotificationLog,
                            ChangeOp::Delete,
                            n.id.as_str(),
                        ));
                    } else {
                        kept.push(n);
                    }
                }
                self.notification_log = kept;
            }
            WriteOp::InsertReport(r) => {
                self.require_escalation(&r.escalation_id)?;
                if self.reports.contains_key(r.id.as_str()) {
                    return Err(unique(Table::Reports, "id", r.id.as_str()));
                }
                self.reports.insert(r.id.0.clone(), r.clone());
                changes.push(ChangeEvent::new(Table::Reports, ChangeOp::Insert, r.id.as_str()));
            }
            WriteOp::UpdateReport(r) => {
                if !self.reports.contains_key(r.id.as_str()) {
                    return Err(missing(Table::Reports, r.id.as_str()));
                }
                self.reports.insert(r.id.0.clone(), r.clone());
                changes.push(ChangeEvent::new(Table::Reports, ChangeOp::Update, r.id.as_str()));
            }
            WriteOp::CloseReports { escalation_id, at } => {
                self.require_escalation(escalation_id)?;
                for report in self.reports.values_mut() {
                    if &report.escalation_id == escalation_id
                        && report.status == ReportStatus::Resolved
                    {
                        report.status = ReportStatus::Closed;
                        report.updated_at = *at;
                        changes.push(ChangeEvent::new(
                            Table::Reports,
                            ChangeOp::Update,
                            report.id.as_str(),
                        ));
                    }
                }
            }
            WriteOp::InsertRca(rca) => {
                self.require_escalation(&rca.escalation_id)?;
                if self
                    .rca_forms
                    .values()
                    .any(|x| x.escalation_id == rca.escalation_id)
                {
                    return Err(unique(
                        Table::RcaForms,
                        "escalation_id",
                        rca.escalation_id.as_str(),
                    ));
                }
                self.rca_forms.insert(rca.id.0.clone(), rca.clone());
                changes.push(ChangeEvent::new(Table::RcaForms, ChangeOp::Insert, rca.id.as_str()));
            }
            WriteOp::UpdateRca(rca) => {
                if !self.rca_forms.contains_key(rca.id.as_str()) {
                    return Err(missing(Table::RcaForms, rca.id.as_str()));
                }
                self.rca_forms.insert(rca.id.0.clone(), rca.clone());
                changes.push(ChangeEvent::new(Table::RcaForms, ChangeOp::Update, rca.id.as_str()));
            }
            WriteOp::InsertNotification(n) => {
                self.require_escalation(&n.escalation_id)?;
                if n.kind.is_unique_per_escalation()
                    && self
                        .notification_log
                        .iter()
                        .any(|x| x.escalation_id == n.escalation_id && x.kind == n.kind)
                {
                    return Err(unique(
                        Table::NotificationLog,
                        "escalation_id,kind",
                        n.escalation_id.as_str(),
                    ));
                }
                self.notification_log.push(n.clone());
                changes.push(ChangeEvent::new(
                    Table::NotificationLog,
                    ChangeOp::Insert,
                    n.id.as_str(),
                ));
            }
            WriteOp::MarkNotificationRead { id, at } => {
                let entry = self
                    .notification_log
                    .iter_mut()
                    .find(|n| &n.id == id)
                    .ok_or_else(|| missing(Table::NotificationLog, id.as_str()))?;
                if !entry.is_read {
                    entry.is_read = true;
                    entry.read_at = Some(*at);
                    changes.push(ChangeEvent::new(
                        Table::NotificationLog,
                        ChangeOp::Update,
                        id.as_str(),
                    ));
                }
            }
            WriteOp::ReplaceSites { provider, sites } => {
                let mut kept = Vec::with_capacity(self.sites.len());
                for s in self.sites.drain(..) {
                    if s.provider == *provider {
                        changes.push(ChangeEvent::new(Table::Sites, ChangeOp::Delete, site_key(&s)));
                    } else {
                        kept.push(s);
                    }
                }
                self.sites = kept;
                for s in sites {
                    if s.provider != *provider {
                        continue;
                    }
                    if self.sites.iter().any(|x| x.provider == s.provider && x.id == s.id) {
                        return Err(unique(Table::Sites, "provider,id", &site_key(s)));
                    }
                    self.sites.push(s.clone());
                    changes.push(ChangeEvent::new(Table::Sites, ChangeOp::Insert, site_key(s)));
                }
            }
            WriteOp::PutProfile(p) => {
                let op = if self.profiles.contains_key(p.id.as_str()) {
                    ChangeOp::Update
                } else {
                    ChangeOp::Insert
                };
                self.profiles.insert(p.id.0.clone(), p.clone());
                changes.push(ChangeEvent::new(Table::Profiles, op, p.id.as_str()));
            }
        }
        Ok(())
    }

    fn require_escalation(&self, id: &EscalationId) -> Result<(), StoreError> {
        if self.escalations.contains_key(id.as_str()) {
            Ok(())
        } else {
            Err(missing(Table::Escalations, id.as_str()))
        }
    }
}

fn site_key(site: &Site) -> String {
    format!("{}:{}", site.provider, site.id)
}

fn unique(table: Table, key: &'static str, value: &str) -> StoreError {
    StoreError::UniqueViolation {
        table,
        key,
        value: value.to_string(),
    }
}

fn missing(table: Table, id: &str) -> StoreError {
    StoreError::NotFound {
        table,
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lf_common::{EscalationStatus, NotificationId, NotificationKind, TicketId};

    fn escalation(ticket: &str) -> Escalation {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Escalation {
            id: EscalationId::new(),
            provider: Provider::Glo,
            site_a_id: Some("A".into()),
            site_b_id: Some("B".into()),
            list_of_segment: None,
            link_id: "A-B".into(),
            ticket_id: TicketId::from_parts("ESC-", ticket),
            mttr_hours: 4.0,
            description: "down".into(),
            status: EscalationStatus::Pending,
            has_report: false,
            is_critical: false,
            regional_manager: None,
            team_lead: None,
            cof: None,
            pof: None,
            created_by: UserId::new("u-1"),
            created_at: at,
            updated_at: at,
        }
    }

    fn breach(escalation_id: &EscalationId) -> NotificationEntry {
        NotificationEntry {
            id: NotificationId::new(),
            escalation_id: escalation_id.clone(),
            recipient: None,
            kind: NotificationKind::MttrBreach,
            message: "breach".into(),
            created_at: Utc::now(),
            is_read: false,
            read_at: None,
        }
    }

    fn report(escalation_id: &EscalationId, status: ReportStatus) -> Report {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Report {
            id: ReportId::new(),
            escalation_id: escalation_id.clone(),
            issue_description: "LOS".into(),
            reported_by: "NOC".into(),
            contact_info: "noc@example.net".into(),
            is_critical: false,
            status,
            status_notes: None,
            resolution_notes: None,
            cof: None,
            pof: None,
            initial_photos: vec![],
            progress_photos: vec![],
            resolution_photos: vec![],
            resolved_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_close_reports_only_touches_resolved() {
        let e = escalation("EEEEEE");
        let done = report(&e.id, ReportStatus::Resolved);
        let open = report(&e.id, ReportStatus::InProgress);
        let batch = WriteBatch::new()
            .with(WriteOp::InsertEscalation(e.clone()))
            .with(WriteOp::InsertReport(done.clone()))
            .with(WriteOp::InsertReport(open.clone()));
        let (tables, _) = Tables::default().staged(&batch).unwrap();

        let at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let (tables, changes) = tables
            .staged(&WriteBatch::new().with(WriteOp::CloseReports {
                escalation_id: e.id.clone(),
                at,
            }))
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            tables.get_report(&done.id).unwrap().status,
            ReportStatus::Closed
        );
        assert_eq!(
            tables.get_report(&open.id).unwrap().status,
            ReportStatus::InProgress
        );
    }

    #[test]
    fn test_duplicate_ticket_rejected() {
        let tables = Tables::default();
        let batch = WriteBatch::new()
            .with(WriteOp::InsertEscalation(escalation("AAAAAA")))
            .with(WriteOp::InsertEscalation(escalation("AAAAAA")));
        let err = tables.staged(&batch).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UniqueViolation { key: "ticket_id", .. }
        ));
    }

    #[test]
    fn test_failed_batch_leaves_tables_untouched() {
        let tables = Tables::default();
        let e = escalation("BBBBBB");
        let batch = WriteBatch::new()
            .with(WriteOp::InsertEscalation(e.clone()))
            .with(WriteOp::DeleteEscalation(EscalationId::new()));
        assert!(tables.staged(&batch).is_err());
        assert!(tables.get_escalation(&e.id).is_none());
    }

    #[test]
    fn test_breach_unique_per_escalation() {
        let e = escalation("CCCCCC");
        let (tables, _) = Tables::default()
            .staged(&WriteBatch::new().with(WriteOp::InsertEscalation(e.clone())))
            .unwrap();
        let (tables, _) = tables
            .staged(&WriteBatch::new().with(WriteOp::InsertNotification(breach(&e.id))))
            .unwrap();
        let err = tables
            .staged(&WriteBatch::new().with(WriteOp::InsertNotification(breach(&e.id))))
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_delete_cascades() {
        let e = escalation("DDDDDD");
        let batch = WriteBatch::new()
            .with(WriteOp::InsertEscalation(e.clone()))
            .with(WriteOp::InsertNotification(breach(&e.id)));
        let (tables, _) = Tables::default().staged(&batch).unwrap();

        let (tables, changes) = tables
            .staged(&WriteBatch::new().with(WriteOp::DeleteEscalation(e.id.clone())))
            .unwrap();
        assert_eq!(changes.len(), 2);
        assert!(tables
            .notifications(&NotificationFilter::default())
            .is_empty());
    }

    #[test]
    fn test_notification_requires_escalation() {
        let err = Tables::default()
            .staged(&WriteBatch::new().with(WriteOp::InsertNotification(breach(&EscalationId::new()))))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { table: Table::Escalations, .. }));
    }
}
