//! Principals: the accounts subject to deletion.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role that can never be deleted through this crate.
pub const PROTECTED_ROLE: &str = "administrator";

/// Unique identifier of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub i64);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PrincipalId {
    fn from(id: i64) -> Self {
        PrincipalId(id)
    }
}

/// An account as reported by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

impl Principal {
    /// Returns true if the principal holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns true if the principal holds the protected privilege tier.
    pub fn is_protected(&self) -> bool {
        self.has_role(PROTECTED_ROLE)
    }

    /// Returns true if any of the principal's roles is in `allowed`.
    pub fn has_any_role(&self, allowed: &[String]) -> bool {
        self.roles.iter().any(|r| allowed.contains(r))
    }

    /// Captures the principal's record before it is deleted.
    pub fn snapshot(&self) -> PrincipalSnapshot {
        PrincipalSnapshot {
            id: self.id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// A copy of a principal taken before deletion.
///
/// Once the account is deleted this is the only authoritative record of who
/// it belonged to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalSnapshot {
    pub id: PrincipalId,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

/// Who becomes the owner of content that survives its author's deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentOwner {
    /// Leave the content unattributed.
    #[default]
    NoOwner,
    /// Hand the content to another account.
    Principal(PrincipalId),
}

impl From<Option<i64>> for ContentOwner {
    fn from(id: Option<i64>) -> Self {
        match id {
            Some(id) => ContentOwner::Principal(PrincipalId(id)),
            None => ContentOwner::NoOwner,
        }
    }
}
