//! No-mock lifecycle scenarios for lf-core.
//!
//! Drives a real engine over the in-memory store and the filesystem media
//! store through the full escalation → report → resolve → RCA → close walk.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lf_common::{
    Actor, CauseOfFailure, Error, EscalationStatus, LinkType, MttrStatus, NotificationKind,
    Provider, ReportStatus, Role,
};
use lf_config::LifecycleConfig;
use lf_core::blob::{FsObjectStore, ImageUpload};
use lf_core::engine::{
    FixedClock, NewEscalation, NewReport, ProgressUpdate, RcaSubmission, Resolution,
};
use lf_core::store::{EscalationFilter, MemoryStore, NotificationFilter, Store};
use lf_core::Engine;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    engine: Engine,
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    media: TempDir,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn fixture() -> Fixture {
    let media = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(t0()));
    let engine = Engine::new(
        store.clone(),
        Arc::new(FsObjectStore::new(media.path(), "https://media.example.net")),
        LifecycleConfig::default(),
    )
    .with_clock(clock.clone());
    Fixture {
        engine,
        store,
        clock,
        media,
    }
}

fn fibre() -> Actor {
    Actor::new("fibre-7", Role::FibreNetwork)
}

fn staff() -> Actor {
    Actor::new("staff-3", Role::Staff)
}

fn mtn_seg1() -> NewEscalation {
    NewEscalation {
        provider: Provider::Mtn,
        site_a: None,
        site_b: None,
        segment: Some("SEG-1".into()),
        mttr_hours: "3".into(),
        description: "Loss of light on SEG-1".into(),
        is_critical: true,
        regional_manager: Some("RM North".into()),
        team_lead: Some("TL Kano".into()),
    }
}

fn photo(name: &str) -> ImageUpload {
    ImageUpload::new(name, vec![0xFF, 0xD8, 0xFF, 0xE0])
}

fn fiber_cut_report(escalation_id: &lf_common::EscalationId) -> NewReport {
    NewReport {
        escalation_id: escalation_id.clone(),
        issue_description: "fiber cut".into(),
        reported_by: "NOC Lagos".into(),
        contact_info: "+234 800 000 0000".into(),
        is_critical: true,
        images: vec![photo("site.jpg")],
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn mtn_segment_escalation_gains_report() {
    let f = fixture();
    let escalation = f.engine.create_escalation(&fibre(), &mtn_seg1()).unwrap();
    assert_eq!(escalation.link_id, "SEG-1");
    assert_eq!(escalation.status, EscalationStatus::Pending);
    assert!(!escalation.has_report);

    let report = f
        .engine
        .create_report(&staff(), &fiber_cut_report(&escalation.id))
        .unwrap();
    assert_eq!(report.status, ReportStatus::InProgress);
    assert_eq!(report.initial_photos.len(), 1);
    assert!(report.initial_photos[0].starts_with("https://media.example.net/"));

    let stored = f.engine.get_escalation(&escalation.id).unwrap();
    assert!(stored.has_report);
    assert_eq!(stored.status, EscalationStatus::InProgress);
}

#[test]
fn resolving_mirrors_cause_and_notifies_creator() {
    let f = fixture();
    let escalation = f.engine.create_escalation(&fibre(), &mtn_seg1()).unwrap();
    let report = f
        .engine
        .create_report(&staff(), &fiber_cut_report(&escalation.id))
        .unwrap();

    f.clock.advance(Duration::minutes(90));
    let resolved = f
        .engine
        .resolve_report(
            &staff(),
            &Resolution {
                report_id: report.id.clone(),
                resolution_notes: "spliced fiber".into(),
                cof: "Core Break".into(),
                pof: "KM12".into(),
                images: vec![photo("splice.jpg")],
            },
        )
        .unwrap();
    assert_eq!(resolved.status, ReportStatus::Resolved);
    assert_eq!(resolved.resolution_notes.as_deref(), Some("spliced fiber"));

    let stored = f.engine.get_escalation(&escalation.id).unwrap();
    assert_eq!(stored.status, EscalationStatus::Resolved);
    assert_eq!(stored.cof.as_deref(), Some("Core Break"));
    assert_eq!(stored.pof.as_deref(), Some("KM12"));

    let log = f
        .store
        .notifications(&NotificationFilter {
            escalation_id: Some(escalation.id.clone()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, NotificationKind::ReportResolved);
    assert_eq!(log[0].recipient.as_ref(), Some(&escalation.created_by));
}

#[test]
fn rca_measures_window_and_closes_reports() {
    let f = fixture();
    let escalation = f.engine.create_escalation(&fibre(), &mtn_seg1()).unwrap();
    let report = f
        .engine
        .create_report(&staff(), &fiber_cut_report(&escalation.id))
        .unwrap();
    f.engine
        .resolve_report(
            &staff(),
            &Resolution {
                report_id: report.id.clone(),
                resolution_notes: "spliced fiber".into(),
                cof: "Core Break".into(),
                pof: "KM12".into(),
                images: vec![photo("splice.jpg")],
            },
        )
        .unwrap();

    let rca = f
        .engine
        .submit_rca(
            &fibre(),
            &RcaSubmission::new(
                escalation.id.clone(),
                LinkType::Backbone,
                "2024-01-01T00:00",
                "2024-01-01T05:30",
                CauseOfFailure::CoreBreak,
                "Excavator damage at KM12",
                "Re-spliced 48 cores",
            ),
        )
        .unwrap();
    assert_eq!(rca.mttr_used, 5);
    assert_eq!(rca.mttr_status, MttrStatus::ExceededMttr);

    let reports = f.engine.reports_for(&escalation.id).unwrap();
    assert!(reports.iter().all(|r| r.status == ReportStatus::Closed));

    // Escalation stays resolved until explicitly closed.
    let stored = f.engine.get_escalation(&escalation.id).unwrap();
    assert_eq!(stored.status, EscalationStatus::Resolved);

    let closed = f.engine.close_escalation(&fibre(), &escalation.id).unwrap();
    assert_eq!(closed.status, EscalationStatus::Closed);
}

#[test]
fn progress_updates_replace_latest_notes() {
    let f = fixture();
    let escalation = f.engine.create_escalation(&fibre(), &mtn_seg1()).unwrap();
    let report = f
        .engine
        .create_report(&staff(), &fiber_cut_report(&escalation.id))
        .unwrap();

    for (i, notes) in ["team dispatched", "fault located at KM12"].iter().enumerate() {
        f.engine
            .update_in_progress(
                &staff(),
                &ProgressUpdate {
                    report_id: report.id.clone(),
                    status_notes: notes.to_string(),
                    images: vec![photo(&format!("progress-{}.jpg", i))],
                },
            )
            .unwrap();
    }

    let stored = f.engine.get_report(&report.id).unwrap();
    assert_eq!(stored.status, ReportStatus::InProgress);
    assert_eq!(stored.status_notes.as_deref(), Some("fault located at KM12"));
    assert_eq!(stored.progress_photos.len(), 1);
    assert!(f.media.path().join("in_progress").exists());
}

#[test]
fn rejected_escalation_writes_nothing() {
    let f = fixture();
    let mut input = mtn_seg1();
    input.mttr_hours = "0.05".into();
    assert!(f.engine.create_escalation(&fibre(), &input).is_err());
    assert!(f
        .store
        .list_escalations(&EscalationFilter::default())
        .unwrap()
        .is_empty());
}

#[test]
fn second_report_is_rejected_and_flag_sticks() {
    let f = fixture();
    let escalation = f.engine.create_escalation(&fibre(), &mtn_seg1()).unwrap();
    f.engine
        .create_report(&staff(), &fiber_cut_report(&escalation.id))
        .unwrap();
    let err = f
        .engine
        .create_report(&staff(), &fiber_cut_report(&escalation.id))
        .unwrap_err();
    assert!(matches!(err, Error::ReportAlreadyAttached { .. }));
    assert!(f.engine.get_escalation(&escalation.id).unwrap().has_report);
}

#[test]
fn roles_are_enforced_at_each_stage() {
    let f = fixture();
    assert!(matches!(
        f.engine.create_escalation(&staff(), &mtn_seg1()),
        Err(Error::Forbidden { .. })
    ));
    let escalation = f.engine.create_escalation(&fibre(), &mtn_seg1()).unwrap();
    assert!(matches!(
        f.engine.create_report(&fibre(), &fiber_cut_report(&escalation.id)),
        Err(Error::Forbidden { .. })
    ));
    let rca = RcaSubmission::new(
        escalation.id.clone(),
        LinkType::Metro,
        "2024-01-01T00:00",
        "2024-01-01T01:00",
        CauseOfFailure::FibreCut,
        "cut",
        "spliced",
    );
    assert!(matches!(
        f.engine.submit_rca(&staff(), &rca),
        Err(Error::Forbidden { .. })
    ));
}
