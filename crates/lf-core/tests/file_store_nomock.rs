//! No-mock file store tests.
//!
//! Covers:
//! - Data dir resolution order (CLI > LINK_FAULT_DATA > XDG_DATA_HOME)
//! - Tables surviving a reopen
//! - Incompatible table files being refused
//! - Failed batches leaving the file untouched
//! - Two handles on one data dir keeping each other's rows

use chrono::{TimeZone, Utc};
use lf_common::{Actor, EscalationStatus, Profile, Provider, Role, UserId};
use lf_config::LifecycleConfig;
use lf_core::blob::FsObjectStore;
use lf_core::engine::{FixedClock, NewEscalation, NewReport};
use lf_core::store::{
    media_root, resolve_data_dir, EscalationFilter, FileStore, Store, StoreError, WriteBatch,
    WriteOp,
};
use lf_core::Engine;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

struct EnvGuard {
    keys: Vec<String>,
    saved: Vec<Option<String>>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let saved = keys.iter().map(|k| env::var(k).ok()).collect();
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            saved,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.keys.iter().zip(&self.saved) {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env lock poisoned");
    f()
}

fn engine_at(data_dir: &Path) -> Engine {
    let store = FileStore::open(data_dir).expect("open store");
    Engine::new(
        Arc::new(store),
        Arc::new(FsObjectStore::new(media_root(data_dir), "file:///media")),
        LifecycleConfig::default(),
    )
    .with_clock(Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap(),
    )))
}

fn mtn(segment: &str) -> NewEscalation {
    NewEscalation {
        provider: Provider::Mtn,
        site_a: None,
        site_b: None,
        segment: Some(segment.into()),
        mttr_hours: "6".into(),
        description: "Span flapping".into(),
        is_critical: false,
        regional_manager: None,
        team_lead: None,
    }
}

#[test]
fn resolution_prefers_cli_then_env_then_xdg() {
    with_env_lock(|| {
        let _env = EnvGuard::new(&["LINK_FAULT_DATA", "XDG_DATA_HOME"]);
        let cli = TempDir::new().unwrap();
        let from_env = TempDir::new().unwrap();
        let xdg = TempDir::new().unwrap();

        env::set_var("LINK_FAULT_DATA", from_env.path());
        env::set_var("XDG_DATA_HOME", xdg.path());
        assert_eq!(resolve_data_dir(Some(cli.path())).unwrap(), cli.path());
        assert_eq!(resolve_data_dir(None).unwrap(), from_env.path());

        env::remove_var("LINK_FAULT_DATA");
        assert_eq!(
            resolve_data_dir(None).unwrap(),
            xdg.path().join("link_fault")
        );
    });
}

#[test]
fn tables_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let admin = Actor::new("admin-1", Role::Admin);

    let created = {
        let engine = engine_at(dir.path());
        engine
            .put_profile(Profile {
                id: UserId::new("fibre-9"),
                role: Role::FibreNetwork,
                display_name: Some("Field Ops".into()),
            })
            .unwrap();
        engine.create_escalation(&admin, &mtn("SEG-77")).unwrap()
    };
    assert!(dir.path().join("tables.json").exists());

    let reopened = engine_at(dir.path());
    let loaded = reopened.get_escalation(&created.id).unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.status, EscalationStatus::Pending);

    let actor = reopened
        .actor_from_profile(&UserId::new("fibre-9"))
        .unwrap();
    assert_eq!(actor.role, Role::FibreNetwork);
}

#[test]
fn incompatible_schema_is_refused() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("tables.json"),
        r#"{"schema_version": "9.0.0"}"#,
    )
    .unwrap();
    assert!(matches!(
        FileStore::open(dir.path()),
        Err(StoreError::IncompatibleSchema { .. })
    ));
}

#[test]
fn failed_batch_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let admin = Actor::new("admin-1", Role::Admin);
    let engine = engine_at(dir.path());
    let e = engine.create_escalation(&admin, &mtn("SEG-5")).unwrap();
    let before = fs::read_to_string(dir.path().join("tables.json")).unwrap();

    let store = FileStore::open(dir.path()).unwrap();
    let mut clash = e.clone();
    clash.id = lf_common::EscalationId::new();
    let err = store
        .commit(
            WriteBatch::new()
                .with(WriteOp::PutProfile(Profile {
                    id: UserId::new("ghost"),
                    role: Role::Staff,
                    display_name: None,
                }))
                .with(WriteOp::InsertEscalation(clash)),
        )
        .unwrap_err();
    assert!(err.is_unique_violation());

    let after = fs::read_to_string(dir.path().join("tables.json")).unwrap();
    assert_eq!(before, after);
    assert_eq!(
        store
            .list_escalations(&EscalationFilter::default())
            .unwrap()
            .len(),
        1
    );
    assert!(store.profile(&UserId::new("ghost")).unwrap().is_none());
}

#[test]
fn interleaved_handles_keep_each_others_rows() {
    let dir = TempDir::new().unwrap();
    let admin = Actor::new("admin-1", Role::Admin);
    let staff = Actor::new("staff-1", Role::Staff);

    // Both handles load the file before either writes the rows below.
    let first = engine_at(dir.path());
    let seeded = first.create_escalation(&admin, &mtn("SEG-10")).unwrap();
    let second = engine_at(dir.path());

    let report = second
        .create_report(
            &staff,
            &NewReport {
                escalation_id: seeded.id.clone(),
                issue_description: "LOS alarm".into(),
                reported_by: "NOC".into(),
                contact_info: "noc@example.com".into(),
                is_critical: false,
                images: Vec::new(),
            },
        )
        .unwrap();
    let other = first.create_escalation(&admin, &mtn("SEG-11")).unwrap();

    // The stale handle sees the other handle's report.
    assert!(first.get_escalation(&seeded.id).unwrap().has_report);

    let store = FileStore::open(dir.path()).unwrap();
    let escalations = store
        .list_escalations(&EscalationFilter::default())
        .unwrap();
    assert_eq!(escalations.len(), 2);
    assert!(escalations.iter().any(|e| e.id == other.id));
    let kept = store.get_escalation(&seeded.id).unwrap().unwrap();
    assert!(kept.has_report);
    let reports = store.reports_for(&seeded.id).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].id, report.id);
}

#[test]
fn duplicate_ticket_rejected_across_handles() {
    let dir = TempDir::new().unwrap();
    let admin = Actor::new("admin-1", Role::Admin);
    let engine = engine_at(dir.path());
    let late = FileStore::open(dir.path()).unwrap();
    let e = engine.create_escalation(&admin, &mtn("SEG-12")).unwrap();

    let mut clash = e.clone();
    clash.id = lf_common::EscalationId::new();
    let err = late
        .commit(WriteBatch::new().with(WriteOp::InsertEscalation(clash)))
        .unwrap_err();
    assert!(err.is_unique_violation());
}
