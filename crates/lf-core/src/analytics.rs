//! Analytics roll-ups over escalations, reports and RCA records.

use chrono::{DateTime, Utc};
use lf_common::{
    Actor, Escalation, EscalationStatus, MttrStatus, Provider, RcaRecord, Report,
};
use lf_config::Action;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::engine::alerting::evaluate;
use crate::engine::Engine;
use crate::store::EscalationFilter;

/// Per-provider breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderStats {
    pub total: usize,
    pub open: usize,
    pub urgent: usize,
    /// Share of open escalations past the breach threshold, 0 when none are open.
    pub breach_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub generated_at: Option<DateTime<Utc>>,
    pub total_escalations: usize,
    pub by_provider: BTreeMap<Provider, ProviderStats>,
    pub by_status: BTreeMap<EscalationStatus, usize>,
    pub open: usize,
    pub urgent: usize,
    pub rca_within: usize,
    pub rca_exceeded: usize,
    /// Mean of `mttr_used` over RCA records.
    pub mean_mttr_used_hours: Option<f64>,
    /// Mean hours from report creation to its resolve stage.
    pub mean_time_to_resolve_hours: Option<f64>,
}

/// Roll up the current tables.
pub fn summarize(
    escalations: &[Escalation],
    reports: &[Report],
    rcas: &[RcaRecord],
    now: DateTime<Utc>,
    breach_ratio: f64,
) -> AnalyticsSummary {
    let mut summary = AnalyticsSummary {
        generated_at: Some(now),
        total_escalations: escalations.len(),
        ..Default::default()
    };

    for provider in Provider::ALL {
        summary.by_provider.insert(provider, ProviderStats::default());
    }

    for e in escalations {
        *summary.by_status.entry(e.status).or_insert(0) += 1;
        let stats = summary.by_provider.entry(e.provider).or_default();
        stats.total += 1;
        if e.status.is_open() {
            stats.open += 1;
            summary.open += 1;
            if evaluate(e, now, breach_ratio).is_some() {
                stats.urgent += 1;
                summary.urgent += 1;
            }
        }
    }

    for stats in summary.by_provider.values_mut() {
        stats.breach_rate = if stats.open == 0 {
            0.0
        } else {
            stats.urgent as f64 / stats.open as f64
        };
    }

    for rca in rcas {
        match rca.mttr_status {
            MttrStatus::WithinMttr => summary.rca_within += 1,
            MttrStatus::ExceededMttr => summary.rca_exceeded += 1,
        }
    }
    summary.mean_mttr_used_hours = mean(rcas.iter().map(|r| r.mttr_used as f64));
    summary.mean_time_to_resolve_hours =
        mean(reports.iter().filter_map(Report::hours_to_resolve));

    summary
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

impl Engine {
    pub fn analytics(&self, actor: &Actor) -> lf_common::Result<AnalyticsSummary> {
        self.authorize(actor, Action::ViewAnalytics)?;
        let escalations = self.store().list_escalations(&EscalationFilter::default())?;
        let reports = self.store().list_reports()?;
        let rcas = self.store().list_rcas()?;
        Ok(summarize(
            &escalations,
            &reports,
            &rcas,
            self.now(),
            self.config().breach_ratio,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use lf_common::{
        CauseOfFailure, EscalationId, LinkType, RcaId, ReportId, ReportStatus, TicketId, UserId,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn escalation(provider: Provider, status: EscalationStatus, age_hours: i64) -> Escalation {
        let created = now() - Duration::hours(age_hours);
        Escalation {
            id: EscalationId::new(),
            provider,
            site_a_id: None,
            site_b_id: None,
            list_of_segment: Some("SEG".into()),
            link_id: "SEG".into(),
            ticket_id: TicketId::from_parts("ESC-", "000001"),
            mttr_hours: 10.0,
            description: "x".into(),
            status,
            has_report: false,
            is_critical: false,
            regional_manager: None,
            team_lead: None,
            cof: None,
            pof: None,
            created_by: UserId::new("u"),
            created_at: created,
            updated_at: created,
        }
    }

    fn rca(used: i64, status: MttrStatus) -> RcaRecord {
        RcaRecord {
            id: RcaId::new(),
            escalation_id: EscalationId::new(),
            link_type: LinkType::Access,
            start_time: now(),
            end_time: now(),
            mttr_used: used,
            mttr_status: status,
            cof: None,
            pof: None,
            actual_cof: CauseOfFailure::Other,
            detailed_cof: "d".into(),
            resolution: "r".into(),
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
            submitted_by: UserId::new("u"),
            created_at: now(),
            updated_at: now(),
        }
    }

    /// `updated_at` sits far past resolution, as it does once an RCA closes the report.
    fn report(status: ReportStatus, resolve_hours: Option<i64>) -> Report {
        Report {
            id: ReportId::new(),
            escalation_id: EscalationId::new(),
            issue_description: "i".into(),
            reported_by: "r".into(),
            contact_info: "c".into(),
            is_critical: false,
            status,
            status_notes: None,
            resolution_notes: None,
            cof: None,
            pof: None,
            initial_photos: vec![],
            progress_photos: vec![],
            resolution_photos: vec![],
            resolved_at: resolve_hours.map(|h| now() + Duration::hours(h)),
            created_at: now(),
            updated_at: now() + Duration::hours(200),
        }
    }

    #[test]
    fn test_counts_and_breach_rate() {
        let escalations = vec![
            escalation(Provider::Mtn, EscalationStatus::Pending, 8),
            escalation(Provider::Mtn, EscalationStatus::InProgress, 1),
            escalation(Provider::Glo, EscalationStatus::Resolved, 50),
        ];
        let s = summarize(&escalations, &[], &[], now(), 0.7);
        assert_eq!(s.total_escalations, 3);
        assert_eq!(s.open, 2);
        assert_eq!(s.urgent, 1);
        assert_eq!(s.by_provider[&Provider::Mtn].breach_rate, 0.5);
        assert_eq!(s.by_provider[&Provider::Glo].breach_rate, 0.0);
        assert_eq!(s.by_provider[&Provider::Airtel].total, 0);
        assert_eq!(s.by_status[&EscalationStatus::Resolved], 1);
    }

    #[test]
    fn test_rca_and_resolve_means() {
        let rcas = vec![rca(2, MttrStatus::WithinMttr), rca(6, MttrStatus::ExceededMttr)];
        let reports = vec![
            report(ReportStatus::Closed, Some(4)),
            report(ReportStatus::Resolved, Some(2)),
            report(ReportStatus::InProgress, None),
        ];
        let s = summarize(&[], &reports, &rcas, now(), 0.7);
        assert_eq!(s.rca_within, 1);
        assert_eq!(s.rca_exceeded, 1);
        assert_eq!(s.mean_mttr_used_hours, Some(4.0));
        assert_eq!(s.mean_time_to_resolve_hours, Some(3.0));
    }

    #[test]
    fn test_empty_tables() {
        let s = summarize(&[], &[], &[], now(), 0.7);
        assert_eq!(s.mean_mttr_used_hours, None);
        assert_eq!(s.urgent, 0);
    }
}
