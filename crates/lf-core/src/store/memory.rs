//! Process-local store backend.

use lf_common::{
    Escalation, EscalationId, NotificationEntry, Profile, Provider, RcaRecord, Report, ReportId,
    Site, UserId,
};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use super::{EscalationFilter, NotificationFilter, Store, StoreError, Tables, WriteBatch};
use crate::events::{ChangeEmitter, ChangeEvent};

/// Store that keeps every table in memory behind a read/write lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    emitter: Option<Arc<dyn ChangeEmitter>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from an existing table set.
    pub fn from_tables(tables: Tables) -> Self {
        MemoryStore {
            tables: RwLock::new(tables),
            emitter: None,
        }
    }

    /// Publish change events to `emitter` after each successful commit.
    pub fn with_emitter(mut self, emitter: Arc<dyn ChangeEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Copy of the current tables.
    pub fn snapshot(&self) -> Result<Tables, StoreError> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }
}

impl Store for MemoryStore {
    fn get_escalation(&self, id: &EscalationId) -> Result<Option<Escalation>, StoreError> {
        Ok(self.read()?.get_escalation(id))
    }

    fn list_escalations(&self, filter: &EscalationFilter) -> Result<Vec<Escalation>, StoreError> {
        Ok(self.read()?.list_escalations(filter))
    }

    fn get_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError> {
        Ok(self.read()?.get_report(id))
    }

    fn reports_for(&self, escalation_id: &EscalationId) -> Result<Vec<Report>, StoreError> {
        Ok(self.read()?.reports_for(escalation_id))
    }

    fn list_reports(&self) -> Result<Vec<Report>, StoreError> {
        Ok(self.read()?.list_reports())
    }

    fn find_rca(&self, escalation_id: &EscalationId) -> Result<Option<RcaRecord>, StoreError> {
        Ok(self.read()?.find_rca(escalation_id))
    }

    fn list_rcas(&self) -> Result<Vec<RcaRecord>, StoreError> {
        Ok(self.read()?.list_rcas())
    }

    fn notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<NotificationEntry>, StoreError> {
        Ok(self.read()?.notifications(filter))
    }

    fn sites(&self, provider: Option<Provider>) -> Result<Vec<Site>, StoreError> {
        Ok(self.read()?.sites(provider))
    }

    fn profile(&self, id: &UserId) -> Result<Option<Profile>, StoreError> {
        Ok(self.read()?.profile(id))
    }

    fn commit(&self, batch: WriteBatch) -> Result<Vec<ChangeEvent>, StoreError> {
        let changes = {
            let mut guard = self.tables.write().map_err(|_| StoreError::Poisoned)?;
            let (next, changes) = guard.staged(&batch)?;
            *guard = next;
            changes
        };
        if let Some(emitter) = &self.emitter {
            for change in &changes {
                emitter.emit(change.clone());
            }
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeFeed;
    use crate::store::WriteOp;
    use lf_common::Role;

    #[test]
    fn test_commit_publishes_after_apply() {
        let feed = Arc::new(ChangeFeed::new());
        let rx = feed.subscribe();
        let store = MemoryStore::new().with_emitter(feed.clone());

        let profile = Profile {
            id: UserId::new("u-7"),
            role: Role::Staff,
            display_name: None,
        };
        store
            .commit(WriteBatch::new().with(WriteOp::PutProfile(profile)))
            .unwrap();

        let event = rx.try_recv().expect("one change event");
        assert_eq!(event.row_id, "u-7");
        assert!(store.profile(&UserId::new("u-7")).unwrap().is_some());
    }

    #[test]
    fn test_failed_commit_publishes_nothing() {
        let feed = Arc::new(ChangeFeed::new());
        let rx = feed.subscribe();
        let store = MemoryStore::new().with_emitter(feed.clone());

        let err = store
            .commit(WriteBatch::new().with(WriteOp::DeleteEscalation(EscalationId::new())))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(rx.try_recv().is_err());
    }
}
