//! Escalation lifecycle engine.
//!
//! Owns the state machine spanning an escalation, its reports and its RCA
//! record:
//!
//! ```text
//! escalation: pending ──report──▶ in_progress ──resolve──▶ resolved ──close──▶ closed
//! report:                 in_progress ──resolve──▶ resolved ──rca──▶ closed
//! ```
//!
//! Every entry point authorizes the actor first, validates input second and
//! only then uploads media or writes. Each mutation is a single atomic
//! [`WriteBatch`](crate::store::WriteBatch), and the escalation status is
//! re-projected from the report set inside the same batch.

pub mod alerting;
pub mod clock;
pub mod creator;
pub mod directory;
pub mod lifecycle;
pub mod mttr;
pub mod rca;
pub mod report;
pub mod status;
pub mod ticket;

pub use alerting::{BreachEntry, BreachReport};
pub use clock::{Clock, FixedClock, SystemClock};
pub use creator::NewEscalation;
pub use rca::{RcaFormMode, RcaSubmission};
pub use report::{NewReport, ProgressUpdate, Resolution};
pub use status::project_escalation_status;
pub use ticket::TicketGenerator;

use lf_common::{Actor, Error, Escalation, EscalationId, Report, ReportId};
use lf_config::{Action, CapabilityTable, LifecycleConfig};
use std::sync::Arc;

use crate::blob::ObjectStore;
use crate::logging::{event_names, Stage};
use crate::store::Store;

pub struct Engine {
    store: Arc<dyn Store>,
    media: Arc<dyn ObjectStore>,
    config: LifecycleConfig,
    capabilities: CapabilityTable,
    clock: Arc<dyn Clock>,
    tickets: TicketGenerator,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        media: Arc<dyn ObjectStore>,
        config: LifecycleConfig,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let tickets = TicketGenerator::new(config.ticket_prefix.clone(), clock.now().timestamp());
        let capabilities = config.capability_table();
        Engine {
            store,
            media,
            config,
            capabilities,
            clock,
            tickets,
        }
    }

    /// Replace the clock and reseed the ticket generator from it.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.tickets =
            TicketGenerator::new(self.config.ticket_prefix.clone(), clock.now().timestamp());
        self.clock = clock;
        self
    }

    pub fn with_tickets(mut self, tickets: TicketGenerator) -> Self {
        self.tickets = tickets;
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn media(&self) -> &dyn ObjectStore {
        self.media.as_ref()
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Check the capability table; denials are logged and returned as
    /// [`Error::Forbidden`].
    pub fn authorize(&self, actor: &Actor, action: Action) -> lf_common::Result<()> {
        if self.capabilities.allows(actor.role, action) {
            return Ok(());
        }
        tracing::warn!(
            target: event_names::ACCESS_DENIED,
            stage = %Stage::Init,
            actor = %actor.id,
            role = %actor.role,
            action = %action,
            "action not permitted for role"
        );
        Err(Error::Forbidden {
            role: actor.role.to_string(),
            action: action.to_string(),
        })
    }

    pub fn get_escalation(&self, id: &EscalationId) -> lf_common::Result<Escalation> {
        self.store
            .get_escalation(id)?
            .ok_or_else(|| Error::not_found("escalation", id))
    }

    pub fn get_report(&self, id: &ReportId) -> lf_common::Result<Report> {
        self.store
            .get_report(id)?
            .ok_or_else(|| Error::not_found("report", id))
    }

    pub fn reports_for(&self, id: &EscalationId) -> lf_common::Result<Vec<Report>> {
        Ok(self.store.reports_for(id)?)
    }
}

/// Trimmed value of a required text field.
pub(crate) fn required(field: &str, value: &str) -> lf_common::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::missing(field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Trimmed optional text; blank collapses to None.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::*;
    use crate::blob::FsObjectStore;
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use lf_common::{Provider, Role};
    use tempfile::TempDir;

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    pub struct Harness {
        pub engine: Engine,
        pub store: Arc<MemoryStore>,
        pub clock: Arc<FixedClock>,
        pub _media: TempDir,
    }

    pub fn harness() -> Harness {
        let media = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let engine = Engine::new(
            store.clone(),
            Arc::new(FsObjectStore::new(media.path(), "file:///media")),
            LifecycleConfig::default(),
        )
        .with_clock(clock.clone());
        Harness {
            engine,
            store,
            clock,
            _media: media,
        }
    }

    pub fn admin() -> Actor {
        Actor::new("admin-1", Role::Admin)
    }

    pub fn staff() -> Actor {
        Actor::new("staff-1", Role::Staff)
    }

    pub fn fibre() -> Actor {
        Actor::new("fibre-1", Role::FibreNetwork)
    }

    pub fn glo_input(mttr: &str) -> NewEscalation {
        NewEscalation {
            provider: Provider::Glo,
            site_a: Some("LAG01".into()),
            site_b: Some("IBD02".into()),
            segment: None,
            mttr_hours: mttr.into(),
            description: "Loss of light on LAG01-IBD02".into(),
            is_critical: false,
            regional_manager: Some("RM West".into()),
            team_lead: Some("TL Lagos".into()),
        }
    }

    pub fn jpg(name: &str) -> crate::blob::ImageUpload {
        crate::blob::ImageUpload::new(name, vec![0xFF, 0xD8, 0xFF])
    }
}
