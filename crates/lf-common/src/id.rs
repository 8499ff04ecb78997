//! Record identity types.
//!
//! Row identifiers are opaque UUID strings wrapped in newtypes so an
//! escalation ID can never be passed where a report ID is expected.
//! Ticket codes are the short human-facing labels printed on escalations.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            /// Parse an identifier, accepting only UUID-formatted strings.
            pub fn parse(s: &str) -> Option<Self> {
                uuid::Uuid::parse_str(s.trim())
                    .ok()
                    .map(|u| $name(u.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Escalation row ID (root aggregate).
    EscalationId
);
uuid_id!(
    /// Report row ID.
    ReportId
);
uuid_id!(
    /// RCA form row ID.
    RcaId
);
uuid_id!(
    /// Notification-log row ID.
    NotificationId
);

/// Identity-provider user reference.
///
/// Opaque: the auth provider decides the format, we only compare for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

/// Number of alphanumeric characters following the ticket prefix.
pub const TICKET_CODE_LEN: usize = 6;

/// Short ticket code printed on an escalation.
///
/// Format: `<prefix><6 x [0-9A-Z]>`
/// Example: `ESC-7Q2K9D`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TicketId(pub String);

impl TicketId {
    /// Build a ticket from a prefix and an already-rendered code.
    pub fn from_parts(prefix: &str, code: &str) -> Self {
        TicketId(format!("{}{}", prefix, code))
    }

    /// Parse a ticket string against the expected prefix.
    pub fn parse(s: &str, prefix: &str) -> Option<Self> {
        let code = s.strip_prefix(prefix)?;
        if code.len() != TICKET_CODE_LEN {
            return None;
        }
        if !code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        {
            return None;
        }
        Some(TicketId(s.to_string()))
    }

    /// The trailing alphanumeric code without the prefix.
    pub fn code(&self) -> &str {
        let len = self.0.len();
        &self.0[len.saturating_sub(TICKET_CODE_LEN)..]
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
