//! Single-file JSON store backend.
//!
//! All tables live in `<data_dir>/tables.json`. Each commit rewrites the
//! file through a temp file and rename, so readers in other processes see
//! either the old or the new table set. Writers hold an exclusive `flock`
//! on `tables.json.lock` and re-read the file under it before staging, so
//! concurrent processes never overwrite each other's rows.

use lf_common::schema::is_compatible;
use lf_common::{
    Escalation, EscalationId, NotificationEntry, Profile, Provider, RcaRecord, Report, ReportId,
    Site, UserId,
};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    EscalationFilter, NotificationFilter, Store, StoreError, Tables, WriteBatch, ENV_DATA_DIR,
};
use crate::events::{ChangeEmitter, ChangeEvent};
use crate::logging::{event_names, Stage};

const DIR_NAME: &str = "link_fault";
const TABLES_FILE: &str = "tables.json";
const LOCK_FILE: &str = "tables.json.lock";
const MEDIA_DIR: &str = "media";

/// Resolve the data directory.
///
/// Order: explicit path, `LINK_FAULT_DATA`, `XDG_DATA_HOME/link_fault`,
/// then the platform data dir.
pub fn resolve_data_dir(cli: Option<&Path>) -> Result<PathBuf, StoreError> {
    if let Some(dir) = cli {
        return Ok(dir.to_path_buf());
    }

    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        return Ok(PathBuf::from(dir));
    }

    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return Ok(PathBuf::from(xdg).join(DIR_NAME));
    }

    if let Some(base) = dirs::data_dir() {
        return Ok(base.join(DIR_NAME));
    }

    Err(StoreError::DataDirUnavailable)
}

/// Root directory for uploaded report photos under a data dir.
pub fn media_root(data_dir: &Path) -> PathBuf {
    data_dir.join(MEDIA_DIR)
}

pub struct FileStore {
    path: PathBuf,
    inner: Mutex<Tables>,
    emitter: Option<Arc<dyn ChangeEmitter>>,
}

impl FileStore {
    /// Open (or lazily create) the table file under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join(TABLES_FILE);
        let tables = load_tables(&path)?;
        Ok(FileStore {
            path,
            inner: Mutex::new(tables),
            emitter: None,
        })
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn ChangeEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Cached tables, reloaded from disk so other processes' commits show.
    fn fresh(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        let mut guard = self.lock()?;
        *guard = load_tables(&self.path)?;
        Ok(guard)
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_file_name(LOCK_FILE)
    }
}

impl Store for FileStore {
    fn get_escalation(&self, id: &EscalationId) -> Result<Option<Escalation>, StoreError> {
        Ok(self.fresh()?.get_escalation(id))
    }

    fn list_escalations(&self, filter: &EscalationFilter) -> Result<Vec<Escalation>, StoreError> {
        Ok(self.fresh()?.list_escalations(filter))
    }

    fn get_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError> {
        Ok(self.fresh()?.get_report(id))
    }

    fn reports_for(&self, escalation_id: &EscalationId) -> Result<Vec<Report>, StoreError> {
        Ok(self.fresh()?.reports_for(escalation_id))
    }

    fn list_reports(&self) -> Result<Vec<Report>, StoreError> {
        Ok(self.fresh()?.list_reports())
    }

    fn find_rca(&self, escalation_id: &EscalationId) -> Result<Option<RcaRecord>, StoreError> {
        Ok(self.fresh()?.find_rca(escalation_id))
    }

    fn list_rcas(&self) -> Result<Vec<RcaRecord>, StoreError> {
        Ok(self.fresh()?.list_rcas())
    }

    fn notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<NotificationEntry>, StoreError> {
        Ok(self.fresh()?.notifications(filter))
    }

    fn sites(&self, provider: Option<Provider>) -> Result<Vec<Site>, StoreError> {
        Ok(self.fresh()?.sites(provider))
    }

    fn profile(&self, id: &UserId) -> Result<Option<Profile>, StoreError> {
        Ok(self.fresh()?.profile(id))
    }

    fn commit(&self, batch: WriteBatch) -> Result<Vec<ChangeEvent>, StoreError> {
        let changes = {
            let mut guard = self.lock()?;
            let _file_lock = TablesLock::acquire(&self.lock_path())?;
            let current = load_tables(&self.path)?;
            let (next, changes) = current.staged(&batch)?;
            write_json_pretty_atomic(&self.path, &next)?;
            *guard = next;
            changes
        };
        tracing::debug!(
            target: event_names::STORE_COMMITTED,
            stage = %Stage::Store,
            path = %self.path.display(),
            rows = changes.len(),
            "table file rewritten"
        );
        if let Some(emitter) = &self.emitter {
            for change in &changes {
                emitter.emit(change.clone());
            }
        }
        Ok(changes)
    }
}

/// Read `tables.json`, or an empty table set when it does not exist yet.
fn load_tables(path: &Path) -> Result<Tables, StoreError> {
    if !path.exists() {
        return Ok(Tables::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let tables: Tables = serde_json::from_str(&content).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    if !is_compatible(&tables.schema_version) {
        return Err(StoreError::IncompatibleSchema {
            path: path.to_path_buf(),
            version: tables.schema_version,
        });
    }
    Ok(tables)
}

/// Exclusive advisory lock on the table file, held for one commit.
struct TablesLock {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: std::fs::File,
}

impl TablesLock {
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        let io_err = |e: std::io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // Blocks until the other writer releases.
            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if result != 0 {
                return Err(io_err(std::io::Error::last_os_error()));
            }
        }

        Ok(Self { file })
    }
}

impl Drop for TablesLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        // The lock file stays; unlinking it would let a waiter lock a dead inode.
    }
}

fn write_json_pretty_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let content = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(TABLES_FILE);
    let tmp_path = path.with_file_name(format!("{}.tmp.{}", file_name, std::process::id()));
    {
        use std::io::Write;
        let mut file = std::fs::File::create(&tmp_path).map_err(|e| StoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        file.write_all(&content).map_err(|e| StoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        let _ = file.sync_all();
    }
    std::fs::rename(&tmp_path, path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::WriteOp;
    use lf_common::Role;
    use tempfile::tempdir;

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.list_rcas().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_commit_writes_file_without_tmp_leftovers() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let profile = Profile {
            id: UserId::new("u-1"),
            role: Role::Admin,
            display_name: Some("Ops".into()),
        };
        store
            .commit(WriteBatch::new().with(WriteOp::PutProfile(profile)))
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec![TABLES_FILE.to_string(), LOCK_FILE.to_string()]);
    }

    #[test]
    fn test_commit_merges_rows_from_another_handle() {
        let dir = tempdir().unwrap();
        let first = FileStore::open(dir.path()).unwrap();
        let second = FileStore::open(dir.path()).unwrap();
        let profile = |id: &str| Profile {
            id: UserId::new(id),
            role: Role::Staff,
            display_name: None,
        };

        first
            .commit(WriteBatch::new().with(WriteOp::PutProfile(profile("u-1"))))
            .unwrap();
        second
            .commit(WriteBatch::new().with(WriteOp::PutProfile(profile("u-2"))))
            .unwrap();

        assert!(first.profile(&UserId::new("u-1")).unwrap().is_some());
        assert!(first.profile(&UserId::new("u-2")).unwrap().is_some());
        let reopened = FileStore::open(dir.path()).unwrap();
        assert!(reopened.profile(&UserId::new("u-1")).unwrap().is_some());
        assert!(reopened.profile(&UserId::new("u-2")).unwrap().is_some());
    }

    #[test]
    fn test_incompatible_schema_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(TABLES_FILE),
            r#"{"schema_version":"9.0.0"}"#,
        )
        .unwrap();
        let err = FileStore::open(dir.path()).err().expect("must fail");
        assert!(matches!(err, StoreError::IncompatibleSchema { .. }));
    }

    #[test]
    fn test_explicit_dir_wins() {
        let dir = tempdir().unwrap();
        assert_eq!(resolve_data_dir(Some(dir.path())).unwrap(), dir.path());
        assert_eq!(media_root(dir.path()), dir.path().join("media"));
    }
}
