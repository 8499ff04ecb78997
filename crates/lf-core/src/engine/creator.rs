//! Escalation creation.

use lf_common::{Actor, Error, Escalation, EscalationId, EscalationStatus, Provider, Role};
use lf_config::Action;
use serde::{Deserialize, Serialize};

use super::{optional, required, Engine};
use crate::logging::{event_names, Stage};
use crate::store::{StoreError, WriteBatch, WriteOp};

/// Form input for a new escalation.
///
/// `mttr_hours` is the raw text the operator typed; it must parse as a
/// finite number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEscalation {
    pub provider: Provider,
    pub site_a: Option<String>,
    pub site_b: Option<String>,
    pub segment: Option<String>,
    pub mttr_hours: String,
    pub description: String,
    #[serde(default)]
    pub is_critical: bool,
    pub regional_manager: Option<String>,
    pub team_lead: Option<String>,
}

/// Validated, normalized escalation fields.
struct Checked {
    site_a: Option<String>,
    site_b: Option<String>,
    segment: Option<String>,
    link_id: String,
    mttr_hours: f64,
    description: String,
    regional_manager: Option<String>,
    team_lead: Option<String>,
}

impl Engine {
    /// Validate and persist a new escalation in `pending`.
    ///
    /// A ticket clash with an existing row is retried with a fresh code up
    /// to `ticket_retry_attempts` times.
    pub fn create_escalation(
        &self,
        actor: &Actor,
        input: &NewEscalation,
    ) -> lf_common::Result<Escalation> {
        self.authorize(actor, Action::CreateEscalation)?;
        let checked = self.check_new_escalation(actor, input)?;

        let now = self.now();
        let mut escalation = Escalation {
            id: EscalationId::new(),
            provider: input.provider,
            site_a_id: checked.site_a,
            site_b_id: checked.site_b,
            list_of_segment: checked.segment,
            link_id: checked.link_id,
            ticket_id: self.tickets.next_ticket(),
            mttr_hours: checked.mttr_hours,
            description: checked.description,
            status: EscalationStatus::Pending,
            has_report: false,
            is_critical: input.is_critical,
            regional_manager: checked.regional_manager,
            team_lead: checked.team_lead,
            cof: None,
            pof: None,
            created_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
        };

        let attempts = self.config.ticket_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            let batch = WriteBatch::new().with(WriteOp::InsertEscalation(escalation.clone()));
            match self.store.commit(batch) {
                Ok(_) => break,
                Err(StoreError::UniqueViolation {
                    key: "ticket_id", ..
                }) if attempt < attempts => {
                    tracing::warn!(
                        target: event_names::ESCALATION_TICKET_CONFLICT,
                        stage = %Stage::Escalation,
                        ticket_id = %escalation.ticket_id,
                        attempt,
                        "ticket code already taken; drawing another"
                    );
                    escalation.ticket_id = self.tickets.next_ticket();
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        tracing::info!(
            target: event_names::ESCALATION_CREATED,
            stage = %Stage::Escalation,
            escalation_id = %escalation.id,
            ticket_id = %escalation.ticket_id,
            provider = %escalation.provider,
            link_id = %escalation.link_id,
            mttr_hours = escalation.mttr_hours,
            "escalation created"
        );
        Ok(escalation)
    }

    fn check_new_escalation(
        &self,
        actor: &Actor,
        input: &NewEscalation,
    ) -> lf_common::Result<Checked> {
        let (site_a, site_b, segment) = if input.provider.uses_segment() {
            let segment = optional(input.segment.as_deref()).ok_or_else(|| Error::missing("segment"))?;
            if segment.contains(',') {
                return Err(Error::invalid("segment", "select exactly one segment"));
            }
            if optional(input.site_b.as_deref()).is_some() {
                return Err(Error::invalid(
                    "site_b",
                    format!("not applicable for provider {}", input.provider),
                ));
            }
            (optional(input.site_a.as_deref()), None, Some(segment))
        } else {
            let a = optional(input.site_a.as_deref()).ok_or_else(|| Error::missing("site_a"))?;
            let b = optional(input.site_b.as_deref()).ok_or_else(|| Error::missing("site_b"))?;
            if a == b {
                return Err(Error::DuplicateSites { site: a });
            }
            (Some(a), Some(b), None)
        };

        let link_id = Escalation::derive_link_id(
            input.provider,
            site_a.as_deref(),
            site_b.as_deref(),
            segment.as_deref(),
        )
        .ok_or_else(|| Error::invalid("link_id", "site selection is incomplete"))?;

        let mttr_hours = parse_mttr(&input.mttr_hours, self.config.min_mttr_hours)?;
        let description = required("description", &input.description)?;

        let regional_manager = optional(input.regional_manager.as_deref());
        let team_lead = optional(input.team_lead.as_deref());
        if actor.role == Role::FibreNetwork {
            if regional_manager.is_none() {
                return Err(Error::missing("regional_manager"));
            }
            if team_lead.is_none() {
                return Err(Error::missing("team_lead"));
            }
        }

        Ok(Checked {
            site_a,
            site_b,
            segment,
            link_id,
            mttr_hours,
            description,
            regional_manager,
            team_lead,
        })
    }
}

fn parse_mttr(raw: &str, min: f64) -> lf_common::Result<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::missing("mttr_hours"));
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| Error::invalid("mttr_hours", format!("not a number: {:?}", raw)))?;
    if !value.is_finite() {
        return Err(Error::invalid("mttr_hours", "must be a finite number"));
    }
    if value < min {
        return Err(Error::invalid(
            "mttr_hours",
            format!("must be at least {}, got {}", min, value),
        ));
    }
    Ok(value)
}
