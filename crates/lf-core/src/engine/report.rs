//! Report stage transitions: create, in-progress update, resolve.

use lf_common::{
    Actor, Error, Escalation, EscalationStatus, NotificationEntry, NotificationId,
    NotificationKind, Report, ReportId, ReportStatus,
};
use lf_config::Action;

use super::status::project_escalation_status;
use super::{required, Engine};
use crate::blob::{upload_stage_images, validate_images, ImageUpload, StageFolder};
use crate::logging::{event_names, Stage};
use crate::store::{WriteBatch, WriteOp};

/// Input of the report-creation stage.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub escalation_id: lf_common::EscalationId,
    pub issue_description: String,
    pub reported_by: String,
    pub contact_info: String,
    pub is_critical: bool,
    pub images: Vec<ImageUpload>,
}

/// Input of one in-progress update.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub report_id: ReportId,
    pub status_notes: String,
    pub images: Vec<ImageUpload>,
}

/// Input of the resolve stage.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub report_id: ReportId,
    pub resolution_notes: String,
    pub cof: String,
    pub pof: String,
    pub images: Vec<ImageUpload>,
}

impl Engine {
    /// Attach the first report to an escalation.
    ///
    /// The report starts `in_progress`; the escalation gains `has_report`
    /// and is re-projected in the same batch.
    pub fn create_report(&self, actor: &Actor, input: &NewReport) -> lf_common::Result<Report> {
        self.authorize(actor, Action::CreateReport)?;
        let issue_description = required("issue_description", &input.issue_description)?;
        let reported_by = required("reported_by", &input.reported_by)?;
        let contact_info = required("contact_info", &input.contact_info)?;
        validate_images(StageFolder::Reports, &input.images, self.config.max_photos)?;

        let escalation = self.get_escalation(&input.escalation_id)?;
        if escalation.status == EscalationStatus::Closed {
            return Err(Error::InvalidTransition {
                entity: "escalation".to_string(),
                id: escalation.id.to_string(),
                from: escalation.status.to_string(),
                to: "in_progress".to_string(),
            });
        }
        if escalation.has_report {
            return Err(Error::ReportAlreadyAttached {
                escalation_id: escalation.id.to_string(),
            });
        }

        let now = self.now();
        let photos = upload_stage_images(
            self.media.as_ref(),
            StageFolder::Reports,
            &escalation.link_id,
            &input.images,
            now,
        )?;

        let report = Report {
            id: ReportId::new(),
            escalation_id: escalation.id.clone(),
            issue_description,
            reported_by,
            contact_info,
            is_critical: input.is_critical,
            status: ReportStatus::InProgress,
            status_notes: None,
            resolution_notes: None,
            cof: None,
            pof: None,
            initial_photos: photos,
            progress_photos: Vec::new(),
            resolution_photos: Vec::new(),
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut reports = self.store.reports_for(&escalation.id)?;
        reports.push(report.clone());
        let mut updated = escalation;
        updated.has_report = true;
        updated.status = project_escalation_status(updated.status, &reports);
        updated.updated_at = now;

        let batch = WriteBatch::new()
            .with(WriteOp::InsertReport(report.clone()))
            .with(WriteOp::UpdateEscalation(updated.clone()));
        self.store.commit(batch)?;

        tracing::info!(
            target: event_names::REPORT_CREATED,
            stage = %Stage::Report,
            escalation_id = %updated.id,
            report_id = %report.id,
            contact_info = %report.contact_info,
            photos = report.initial_photos.len(),
            "report attached"
        );
        Ok(report)
    }

    /// Record field progress on an open report. Repeatable.
    ///
    /// The latest update's notes and photos replace the previous ones.
    pub fn update_in_progress(
        &self,
        actor: &Actor,
        input: &ProgressUpdate,
    ) -> lf_common::Result<Report> {
        self.authorize(actor, Action::UpdateInProgress)?;
        let status_notes = required("status_notes", &input.status_notes)?;
        validate_images(StageFolder::InProgress, &input.images, self.config.max_photos)?;

        let mut report = self.get_report(&input.report_id)?;
        ensure_open(&report, ReportStatus::InProgress)?;
        let escalation = self.get_escalation(&report.escalation_id)?;

        let now = self.now();
        report.progress_photos = upload_stage_images(
            self.media.as_ref(),
            StageFolder::InProgress,
            &escalation.link_id,
            &input.images,
            now,
        )?;
        report.status_notes = Some(status_notes);
        report.status = ReportStatus::InProgress;
        report.updated_at = now;

        let updated = self.reproject(escalation, &report, now)?;
        let batch = WriteBatch::new()
            .with(WriteOp::UpdateReport(report.clone()))
            .with(WriteOp::UpdateEscalation(updated.clone()));
        self.store.commit(batch)?;

        tracing::info!(
            target: event_names::REPORT_PROGRESS_UPDATED,
            stage = %Stage::Report,
            escalation_id = %updated.id,
            report_id = %report.id,
            photos = report.progress_photos.len(),
            "in-progress update recorded"
        );
        Ok(report)
    }

    /// Resolve a report, mirror cause/point of failure onto the escalation
    /// and notify the escalation's creator.
    pub fn resolve_report(&self, actor: &Actor, input: &Resolution) -> lf_common::Result<Report> {
        self.authorize(actor, Action::ResolveReport)?;
        let resolution_notes = required("resolution_notes", &input.resolution_notes)?;
        let cof = required("cof", &input.cof)?;
        let pof = required("pof", &input.pof)?;
        validate_images(StageFolder::Resolved, &input.images, self.config.max_photos)?;

        let mut report = self.get_report(&input.report_id)?;
        ensure_open(&report, ReportStatus::Resolved)?;
        let escalation = self.get_escalation(&report.escalation_id)?;

        let now = self.now();
        report.resolution_photos = upload_stage_images(
            self.media.as_ref(),
            StageFolder::Resolved,
            &escalation.link_id,
            &input.images,
            now,
        )?;
        report.resolution_notes = Some(resolution_notes);
        report.cof = Some(cof.clone());
        report.pof = Some(pof.clone());
        report.status = ReportStatus::Resolved;
        report.resolved_at = Some(now);
        report.updated_at = now;

        let mut updated = self.reproject(escalation, &report, now)?;
        updated.cof = Some(cof);
        updated.pof = Some(pof);

        let notice = NotificationEntry {
            id: NotificationId::new(),
            escalation_id: updated.id.clone(),
            recipient: Some(updated.created_by.clone()),
            kind: NotificationKind::ReportResolved,
            message: format!(
                "Report for {} ({}) resolved by {}",
                updated.ticket_id, updated.link_id, actor.id
            ),
            created_at: now,
            is_read: false,
            read_at: None,
        };

        let batch = WriteBatch::new()
            .with(WriteOp::UpdateReport(report.clone()))
            .with(WriteOp::UpdateEscalation(updated.clone()))
            .with(WriteOp::InsertNotification(notice));
        self.store.commit(batch)?;

        tracing::info!(
            target: event_names::REPORT_RESOLVED,
            stage = %Stage::Report,
            escalation_id = %updated.id,
            report_id = %report.id,
            escalation_status = %updated.status,
            "report resolved"
        );
        Ok(report)
    }

    /// Escalation with its status re-derived from the report set after
    /// `changed` replaces its stored version.
    fn reproject(
        &self,
        mut escalation: Escalation,
        changed: &Report,
        now: chrono::DateTime<chrono::Utc>,
    ) -> lf_common::Result<Escalation> {
        let reports: Vec<Report> = self
            .store
            .reports_for(&escalation.id)?
            .into_iter()
            .map(|r| if r.id == changed.id { changed.clone() } else { r })
            .collect();
        escalation.status = project_escalation_status(escalation.status, &reports);
        escalation.updated_at = now;
        Ok(escalation)
    }
}

/// Only `in_progress` (or legacy `pending`) reports accept stage updates.
fn ensure_open(report: &Report, to: ReportStatus) -> lf_common::Result<()> {
    match report.status {
        ReportStatus::Pending | ReportStatus::InProgress => Ok(()),
        from => Err(Error::InvalidTransition {
            entity: "report".to_string(),
            id: report.id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}
