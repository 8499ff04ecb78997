//! RCA finalization.
//!
//! Submitting the RCA measures the outage window against the escalation's
//! MTTR budget, upserts the single RCA row for the escalation and closes
//! every report in the same batch.

use chrono::{DateTime, Utc};
use lf_common::{
    Actor, CauseOfFailure, Error, Escalation, EscalationId, EscalationStatus, LinkType, RcaId,
    RcaRecord, Report, ReportStatus,
};
use lf_config::Action;
use serde::{Deserialize, Serialize};

use super::mttr::{measure, parse_timestamp};
use super::status::project_escalation_status;
use super::{optional, required, Engine};
use crate::logging::{event_names, Stage};
use crate::store::{WriteBatch, WriteOp};

/// RCA form input. Timestamps are free-entry text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaSubmission {
    pub escalation_id: EscalationId,
    pub link_type: LinkType,
    pub start_time: String,
    pub end_time: String,
    pub actual_cof: Option<CauseOfFailure>,
    pub detailed_cof: String,
    pub resolution: String,
    #[serde(default)]
    pub cof: Option<String>,
    #[serde(default)]
    pub pof: Option<String>,
    #[serde(default)]
    pub ofc: Option<String>,
    #[serde(default)]
    pub jc: Option<String>,
    #[serde(default)]
    pub cod: Option<String>,
    #[serde(default)]
    pub team_lead: Option<String>,
    #[serde(default)]
    pub team_manager: Option<String>,
    #[serde(default)]
    pub time_to_pof: Option<String>,
    #[serde(default)]
    pub time_to_test: Option<String>,
    #[serde(default)]
    pub tt_number: Option<String>,
    #[serde(default)]
    pub bottle_cassette_tray: Option<String>,
    #[serde(default)]
    pub segment: Option<String>,
}

impl RcaSubmission {
    /// Minimal submission; optional fields start empty.
    pub fn new(
        escalation_id: EscalationId,
        link_type: LinkType,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
        actual_cof: CauseOfFailure,
        detailed_cof: impl Into<String>,
        resolution: impl Into<String>,
    ) -> Self {
        RcaSubmission {
            escalation_id,
            link_type,
            start_time: start_time.into(),
            end_time: end_time.into(),
            actual_cof: Some(actual_cof),
            detailed_cof: detailed_cof.into(),
            resolution: resolution.into(),
            cof: None,
            pof: None,
            ofc: None,
            jc: None,
            cod: None,
            team_lead: None,
            team_manager: None,
            time_to_pof: None,
            time_to_test: None,
            tt_number: None,
            bottle_cassette_tray: None,
            segment: None,
        }
    }
}

/// Whether the RCA form should open blank or show the record on file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "rca", rename_all = "snake_case")]
pub enum RcaFormMode {
    Create,
    View(Box<RcaRecord>),
}

impl Engine {
    pub fn rca_form_mode(&self, escalation_id: &EscalationId) -> lf_common::Result<RcaFormMode> {
        Ok(match self.store.find_rca(escalation_id)? {
            Some(existing) => RcaFormMode::View(Box::new(existing)),
            None => RcaFormMode::Create,
        })
    }

    /// Upsert the escalation's RCA and close its reports.
    ///
    /// The escalation needs at least one report, and every report must
    /// already be resolved (or closed by an earlier submission).
    ///
    /// Re-submitting updates the existing row in place, so the operation is
    /// idempotent apart from `updated_at`.
    pub fn submit_rca(&self, actor: &Actor, input: &RcaSubmission) -> lf_common::Result<RcaRecord> {
        self.authorize(actor, Action::SubmitRca)?;
        let actual_cof = input.actual_cof.ok_or_else(|| Error::missing("actual_cof"))?;
        let detailed_cof = required("detailed_cof", &input.detailed_cof)?;
        let resolution = required("resolution", &input.resolution)?;
        let start = parse_timestamp("start_time", &input.start_time)?;
        let end = parse_timestamp("end_time", &input.end_time)?;

        let escalation = self.get_escalation(&input.escalation_id)?;
        if escalation.status == EscalationStatus::Closed {
            return Err(Error::InvalidTransition {
                entity: "escalation".to_string(),
                id: escalation.id.to_string(),
                from: escalation.status.to_string(),
                to: "rca_submitted".to_string(),
            });
        }

        let reports = self.store.reports_for(&escalation.id)?;
        if reports.is_empty() {
            return Err(Error::InvalidTransition {
                entity: "escalation".to_string(),
                id: escalation.id.to_string(),
                from: "no_report".to_string(),
                to: "rca_submitted".to_string(),
            });
        }
        if let Some(open) = reports
            .iter()
            .find(|r| !matches!(r.status, ReportStatus::Resolved | ReportStatus::Closed))
        {
            return Err(Error::InvalidTransition {
                entity: "report".to_string(),
                id: open.id.to_string(),
                from: open.status.to_string(),
                to: ReportStatus::Closed.to_string(),
            });
        }

        let outcome = measure(start, end, escalation.mttr_hours);
        if outcome.clamped {
            tracing::warn!(
                target: event_names::RCA_NEGATIVE_WINDOW,
                stage = %Stage::Rca,
                escalation_id = %escalation.id,
                start_time = %start,
                end_time = %end,
                "end_time precedes start_time; window clamped to zero"
            );
        }

        let now = self.now();
        let draft = RcaRecord {
            id: RcaId::new(),
            escalation_id: escalation.id.clone(),
            link_type: input.link_type,
            start_time: start,
            end_time: end,
            mttr_used: outcome.mttr_used,
            mttr_status: outcome.mttr_status,
            cof: optional(input.cof.as_deref()),
            pof: optional(input.pof.as_deref()),
            actual_cof,
            detailed_cof,
            resolution,
            ofc: optional(input.ofc.as_deref()),
            jc: optional(input.jc.as_deref()),
            cod: optional(input.cod.as_deref()),
            team_lead: optional(input.team_lead.as_deref()),
            team_manager: optional(input.team_manager.as_deref()),
            time_to_pof: optional(input.time_to_pof.as_deref()),
            time_to_test: optional(input.time_to_test.as_deref()),
            tt_number: optional(input.tt_number.as_deref()),
            bottle_cassette_tray: optional(input.bottle_cassette_tray.as_deref()),
            segment: optional(input.segment.as_deref()),
            submitted_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
        };

        let record = match self.store.find_rca(&escalation.id)? {
            Some(existing) => {
                self.commit_rca(&escalation, &reports, adopt(draft, &existing), false, now)?
            }
            None => match self.commit_rca(&escalation, &reports, draft.clone(), true, now) {
                Ok(record) => record,
                Err(Error::Conflict { key, .. }) if key == "escalation_id" => {
                    tracing::warn!(
                        target: event_names::RCA_UPSERT_CONFLICT,
                        stage = %Stage::Rca,
                        escalation_id = %escalation.id,
                        "RCA inserted concurrently; updating the existing row"
                    );
                    let existing = self
                        .store
                        .find_rca(&escalation.id)?
                        .ok_or_else(|| Error::not_found("rca", &escalation.id))?;
                    self.commit_rca(&escalation, &reports, adopt(draft, &existing), false, now)?
                }
                Err(err) => return Err(err),
            },
        };

        tracing::info!(
            target: event_names::RCA_SUBMITTED,
            stage = %Stage::Rca,
            escalation_id = %escalation.id,
            rca_id = %record.id,
            mttr_used = record.mttr_used,
            mttr_status = %record.mttr_status,
            "RCA on file; reports closed"
        );
        Ok(record)
    }

    fn commit_rca(
        &self,
        escalation: &Escalation,
        reports: &[Report],
        record: RcaRecord,
        insert: bool,
        now: DateTime<Utc>,
    ) -> lf_common::Result<RcaRecord> {
        let closed: Vec<Report> = reports
            .iter()
            .cloned()
            .map(|mut r| {
                if r.status == ReportStatus::Resolved {
                    r.status = ReportStatus::Closed;
                }
                r
            })
            .collect();
        let mut updated = escalation.clone();
        updated.status = project_escalation_status(updated.status, &closed);
        updated.updated_at = now;

        let op = if insert {
            WriteOp::InsertRca(record.clone())
        } else {
            WriteOp::UpdateRca(record.clone())
        };
        let batch = WriteBatch::new()
            .with(op)
            .with(WriteOp::CloseReports {
                escalation_id: escalation.id.clone(),
                at: now,
            })
            .with(WriteOp::UpdateEscalation(updated));
        self.store.commit(batch)?;
        Ok(record)
    }
}

/// Carry the stored row's identity onto a fresh draft.
fn adopt(mut draft: RcaRecord, existing: &RcaRecord) -> RcaRecord {
    draft.id = existing.id.clone();
    draft.created_at = existing.created_at;
    draft
}

#[cfg(test)]
mod tests {
    use super::super::testkit::*;
    use super::super::{NewReport, Resolution};
    use super::*;
    use crate::store::Store;
    use lf_common::MttrStatus;

    fn resolved_escalation(h: &Harness, mttr: &str) -> Escalation {
        let e = h.engine.create_escalation(&fibre(), &glo_input(mttr)).unwrap();
        let r = h
            .engine
            .create_report(
                &staff(),
                &NewReport {
                    escalation_id: e.id.clone(),
                    issue_description: "LOS".into(),
                    reported_by: "NOC".into(),
                    contact_info: "noc@example.net".into(),
                    is_critical: false,
                    images: vec![],
                },
            )
            .unwrap();
        h.engine
            .resolve_report(
                &staff(),
                &Resolution {
                    report_id: r.id,
                    resolution_notes: "spliced fiber".into(),
                    cof: "Core Break".into(),
                    pof: "KM12".into(),
                    images: vec![jpg("done.png")],
                },
            )
            .unwrap();
        h.engine.get_escalation(&e.id).unwrap()
    }

    fn submission(e: &Escalation) -> RcaSubmission {
        RcaSubmission::new(
            e.id.clone(),
            LinkType::Backbone,
            "2024-01-01T00:00",
            "2024-01-01T05:30",
            CauseOfFailure::CoreBreak,
            "Excavator",
            "Spliced",
        )
    }

    #[test]
    fn test_exceeded_and_reports_closed() {
        let h = harness();
        let e = resolved_escalation(&h, "3");
        let resolved_at = h.engine.now();
        h.clock.advance(chrono::Duration::hours(3));
        let rca = h.engine.submit_rca(&fibre(), &submission(&e)).unwrap();
        assert_eq!(rca.mttr_used, 5);
        assert_eq!(rca.mttr_status, MttrStatus::ExceededMttr);

        let reports = h.store.reports_for(&e.id).unwrap();
        assert!(reports.iter().all(|r| r.status == ReportStatus::Closed));
        assert!(reports.iter().all(|r| r.resolved_at == Some(resolved_at)));
        assert!(reports.iter().all(|r| r.updated_at > resolved_at));
        assert_eq!(
            h.engine.get_escalation(&e.id).unwrap().status,
            EscalationStatus::Resolved
        );
    }

    #[test]
    fn test_resubmit_updates_in_place() {
        let h = harness();
        let e = resolved_escalation(&h, "6");
        let first = h.engine.submit_rca(&fibre(), &submission(&e)).unwrap();
        let second = h.engine.submit_rca(&fibre(), &submission(&e)).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.mttr_used, second.mttr_used);
        assert_eq!(second.mttr_status, MttrStatus::WithinMttr);
        assert_eq!(h.store.list_rcas().unwrap().len(), 1);
    }

    #[test]
    fn test_form_mode_flips_after_submit() {
        let h = harness();
        let e = resolved_escalation(&h, "3");
        assert_eq!(h.engine.rca_form_mode(&e.id).unwrap(), RcaFormMode::Create);
        h.engine.submit_rca(&fibre(), &submission(&e)).unwrap();
        assert!(matches!(
            h.engine.rca_form_mode(&e.id).unwrap(),
            RcaFormMode::View(_)
        ));
    }

    #[test]
    fn test_negative_window_clamped() {
        let h = harness();
        let e = resolved_escalation(&h, "3");
        let mut input = submission(&e);
        input.start_time = "2024-01-01T05:30".into();
        input.end_time = "2024-01-01T00:00".into();
        let rca = h.engine.submit_rca(&fibre(), &input).unwrap();
        assert_eq!(rca.mttr_used, 0);
        assert_eq!(rca.mttr_status, MttrStatus::WithinMttr);
    }

    #[test]
    fn test_mandatory_fields() {
        let h = harness();
        let e = resolved_escalation(&h, "3");
        let mut input = submission(&e);
        input.actual_cof = None;
        assert!(matches!(
            h.engine.submit_rca(&fibre(), &input),
            Err(Error::MissingField { .. })
        ));
        let mut input = submission(&e);
        input.end_time = "soon".into();
        assert!(matches!(
            h.engine.submit_rca(&fibre(), &input),
            Err(Error::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_rejected_without_report() {
        let h = harness();
        let e = h.engine.create_escalation(&fibre(), &glo_input("3")).unwrap();
        assert!(matches!(
            h.engine.submit_rca(&fibre(), &submission(&e)),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(h.store.list_rcas().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_while_report_in_progress() {
        let h = harness();
        let e = h.engine.create_escalation(&fibre(), &glo_input("3")).unwrap();
        let r = h
            .engine
            .create_report(
                &staff(),
                &NewReport {
                    escalation_id: e.id.clone(),
                    issue_description: "LOS".into(),
                    reported_by: "NOC".into(),
                    contact_info: "noc@example.net".into(),
                    is_critical: false,
                    images: vec![],
                },
            )
            .unwrap();
        let err = h.engine.submit_rca(&fibre(), &submission(&e)).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { ref entity, .. } if entity == "report"));
        assert_eq!(
            h.store.get_report(&r.id).unwrap().unwrap().status,
            ReportStatus::InProgress
        );
        assert_eq!(
            h.engine.get_escalation(&e.id).unwrap().status,
            EscalationStatus::InProgress
        );
        assert!(h.store.list_rcas().unwrap().is_empty());
    }

    #[test]
    fn test_staff_cannot_submit() {
        let h = harness();
        let e = resolved_escalation(&h, "3");
        assert!(matches!(
            h.engine.submit_rca(&staff(), &submission(&e)),
            Err(Error::Forbidden { .. })
        ));
    }
}
