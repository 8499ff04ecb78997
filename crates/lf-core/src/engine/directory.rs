//! Site reference data and user profiles.

use lf_common::{Actor, Error, Escalation, Profile, Provider, Site, UserId};
use lf_config::Action;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::Engine;
use crate::store::{WriteBatch, WriteOp};

/// Display labels for an escalation's endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkLabel {
    pub link_id: String,
    /// `"{site A name} - {site B name}"` when both names are known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Engine {
    /// Replace every site of `provider` with `sites`.
    pub fn import_sites(
        &self,
        actor: &Actor,
        provider: Provider,
        sites: Vec<Site>,
    ) -> lf_common::Result<usize> {
        self.authorize(actor, Action::ManageSites)?;
        let mut seen = BTreeSet::new();
        for site in &sites {
            if site.provider != provider {
                return Err(Error::invalid(
                    "provider",
                    format!("site {} belongs to {}, not {}", site.id, site.provider, provider),
                ));
            }
            if site.id.trim().is_empty() {
                return Err(Error::missing("site.id"));
            }
            if site.name.trim().is_empty() {
                return Err(Error::missing("site.name"));
            }
            if !seen.insert(site.id.as_str()) {
                return Err(Error::invalid("site.id", format!("duplicate id {}", site.id)));
            }
        }
        let count = sites.len();
        self.store
            .commit(WriteBatch::new().with(WriteOp::ReplaceSites { provider, sites }))?;
        Ok(count)
    }

    pub fn sites(&self, provider: Option<Provider>) -> lf_common::Result<Vec<Site>> {
        Ok(self.store.sites(provider)?)
    }

    /// Resolve display labels for a batch of escalations.
    pub fn link_labels(&self, escalations: &[Escalation]) -> lf_common::Result<Vec<LinkLabel>> {
        let sites = self.store.sites(None)?;
        let names: HashMap<(Provider, &str), &str> = sites
            .iter()
            .map(|s| ((s.provider, s.id.as_str()), s.name.as_str()))
            .collect();
        Ok(escalations
            .iter()
            .map(|e| {
                let lookup = |id: &Option<String>| {
                    id.as_deref()
                        .and_then(|id| names.get(&(e.provider, id)).copied())
                };
                let display = match (lookup(&e.site_a_id), lookup(&e.site_b_id)) {
                    (Some(a), Some(b)) => Some(format!("{} - {}", a, b)),
                    _ => None,
                };
                LinkLabel {
                    link_id: e.link_id.clone(),
                    display,
                }
            })
            .collect())
    }

    /// Upsert a profile row.
    ///
    /// Profiles are written by the operator seeding a local store; the
    /// engine itself only reads them.
    pub fn put_profile(&self, profile: Profile) -> lf_common::Result<Profile> {
        if profile.id.as_str().trim().is_empty() {
            return Err(Error::missing("id"));
        }
        self.store
            .commit(WriteBatch::new().with(WriteOp::PutProfile(profile.clone())))?;
        Ok(profile)
    }

    /// Actor for a user, taking the role from the profiles table.
    pub fn actor_from_profile(&self, id: &UserId) -> lf_common::Result<Actor> {
        self.store
            .profile(id)?
            .map(|p| p.actor())
            .ok_or_else(|| Error::not_found("profile", id))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testkit::*;
    use super::*;
    use lf_common::Role;

    fn site(provider: Provider, id: &str, name: &str) -> Site {
        Site {
            provider,
            id: id.into(),
            name: name.into(),
            region: None,
        }
    }

    #[test]
    fn test_import_replaces_provider_sites() {
        let h = harness();
        let glo = vec![site(Provider::Glo, "LAG01", "Lagos"), site(Provider::Glo, "IBD02", "Ibadan")];
        assert_eq!(h.engine.import_sites(&admin(), Provider::Glo, glo).unwrap(), 2);
        h.engine
            .import_sites(&admin(), Provider::Glo, vec![site(Provider::Glo, "ABJ", "Abuja")])
            .unwrap();
        let names: Vec<String> = h
            .engine
            .sites(Some(Provider::Glo))
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(names, vec!["ABJ".to_string()]);
    }

    #[test]
    fn test_import_requires_manage_sites() {
        let h = harness();
        assert!(matches!(
            h.engine.import_sites(&fibre(), Provider::Glo, vec![]),
            Err(Error::Forbidden { .. })
        ));
    }

    #[test]
    fn test_import_rejects_foreign_provider() {
        let h = harness();
        let err = h
            .engine
            .import_sites(&admin(), Provider::Mtn, vec![site(Provider::Glo, "LAG01", "Lagos")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn test_link_labels_use_names() {
        let h = harness();
        h.engine
            .import_sites(
                &admin(),
                Provider::Glo,
                vec![site(Provider::Glo, "LAG01", "Lagos"), site(Provider::Glo, "IBD02", "Ibadan")],
            )
            .unwrap();
        let e = h.engine.create_escalation(&fibre(), &glo_input("4")).unwrap();
        let labels = h.engine.link_labels(&[e]).unwrap();
        assert_eq!(labels[0].display.as_deref(), Some("Lagos - Ibadan"));
    }

    #[test]
    fn test_actor_from_profile() {
        let h = harness();
        h.engine
            .put_profile(Profile {
                id: UserId::new("u-9"),
                role: Role::Staff,
                display_name: None,
            })
            .unwrap();
        let actor = h.engine.actor_from_profile(&UserId::new("u-9")).unwrap();
        assert_eq!(actor.role, Role::Staff);
        assert!(h.engine.actor_from_profile(&UserId::new("nobody")).is_err());
    }
}
