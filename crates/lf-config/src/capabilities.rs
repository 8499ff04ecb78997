//! Role/action capability table.
//!
//! Every engine entry point asks the table whether the caller's role may
//! perform the action before it validates input or touches the store.

use lf_common::Role;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// A guarded lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateEscalation,
    DeleteEscalation,
    CreateReport,
    UpdateInProgress,
    ResolveReport,
    SubmitRca,
    CloseEscalation,
    ScanBreaches,
    ReadNotifications,
    ViewAnalytics,
    ManageSites,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::CreateEscalation,
        Action::DeleteEscalation,
        Action::CreateReport,
        Action::UpdateInProgress,
        Action::ResolveReport,
        Action::SubmitRca,
        Action::CloseEscalation,
        Action::ScanBreaches,
        Action::ReadNotifications,
        Action::ViewAnalytics,
        Action::ManageSites,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::CreateEscalation => "create_escalation",
            Action::DeleteEscalation => "delete_escalation",
            Action::CreateReport => "create_report",
            Action::UpdateInProgress => "update_in_progress",
            Action::ResolveReport => "resolve_report",
            Action::SubmitRca => "submit_rca",
            Action::CloseEscalation => "close_escalation",
            Action::ScanBreaches => "scan_breaches",
            Action::ReadNotifications => "read_notifications",
            Action::ViewAnalytics => "view_analytics",
            Action::ManageSites => "manage_sites",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase().replace('-', "_");
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == needle)
            .ok_or_else(|| format!("unknown action: {}", s))
    }
}

/// Resolved `(Role, Action) → allowed` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityTable {
    grants: BTreeMap<Role, BTreeSet<Action>>,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        let mut grants = BTreeMap::new();

        grants.insert(Role::Admin, Action::ALL.iter().copied().collect());

        grants.insert(
            Role::FibreNetwork,
            [
                Action::CreateEscalation,
                Action::DeleteEscalation,
                Action::SubmitRca,
                Action::CloseEscalation,
                Action::ScanBreaches,
                Action::ReadNotifications,
                Action::ViewAnalytics,
            ]
            .into_iter()
            .collect(),
        );

        grants.insert(
            Role::Staff,
            [
                Action::CreateReport,
                Action::UpdateInProgress,
                Action::ResolveReport,
                Action::ScanBreaches,
                Action::ReadNotifications,
                Action::ViewAnalytics,
            ]
            .into_iter()
            .collect(),
        );

        CapabilityTable { grants }
    }
}

impl CapabilityTable {
    /// Build a table from the defaults with per-role overrides applied.
    ///
    /// An override replaces that role's whole grant set.
    pub fn with_overrides(overrides: &BTreeMap<Role, BTreeSet<Action>>) -> Self {
        let mut table = CapabilityTable::default();
        for (role, actions) in overrides {
            table.grants.insert(*role, actions.clone());
        }
        table
    }

    pub fn allows(&self, role: Role, action: Action) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|actions| actions.contains(&action))
    }

    /// Actions granted to a role, in declaration order.
    pub fn actions_for(&self, role: Role) -> Vec<Action> {
        self.grants
            .get(&role)
            .map(|actions| actions.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Roles allowed to perform an action.
    pub fn roles_for(&self, action: Action) -> Vec<Role> {
        Role::ALL
            .iter()
            .copied()
            .filter(|role| self.allows(*role, action))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_has_everything() {
        let table = CapabilityTable::default();
        for action in Action::ALL {
            assert!(table.allows(Role::Admin, action), "{}", action);
        }
    }

    #[test]
    fn test_default_role_split() {
        let table = CapabilityTable::default();
        assert!(!table.allows(Role::Staff, Action::SubmitRca));
        assert!(!table.allows(Role::Staff, Action::CreateEscalation));
        assert!(!table.allows(Role::FibreNetwork, Action::CreateReport));
        assert!(!table.allows(Role::FibreNetwork, Action::ManageSites));
        assert!(table.allows(Role::FibreNetwork, Action::SubmitRca));
        assert!(table.allows(Role::Staff, Action::ResolveReport));
    }

    #[test]
    fn test_override_replaces_role_grants() {
        let mut overrides = BTreeMap::new();
        overrides.insert(Role::Staff, BTreeSet::from([Action::ViewAnalytics]));
        let table = CapabilityTable::with_overrides(&overrides);

        assert!(!table.allows(Role::Staff, Action::CreateReport));
        assert!(table.allows(Role::Staff, Action::ViewAnalytics));
        assert!(table.allows(Role::FibreNetwork, Action::SubmitRca));
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("submit-rca".parse::<Action>(), Ok(Action::SubmitRca));
        assert_eq!("MANAGE_SITES".parse::<Action>(), Ok(Action::ManageSites));
        assert!("fly".parse::<Action>().is_err());
    }

    #[test]
    fn test_roles_for() {
        let table = CapabilityTable::default();
        assert_eq!(table.roles_for(Action::ManageSites), vec![Role::Admin]);
        assert_eq!(table.roles_for(Action::ScanBreaches).len(), 3);
    }
}
