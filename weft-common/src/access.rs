//! Access-control capability carried by every caller-facing operation
//!
//! An `Access` value describes what the caller may touch: which accounts
//! it belongs to and which roles it holds there. A top-level (internal)
//! capability bypasses account checks entirely — the engine's own work
//! loop runs with one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Roles a capability may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    Engineer,
    Artist,
    User,
    /// Internal service-to-service role; implies top-level access.
    Internal,
}

/// Caller capability: account membership plus role claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Access {
    /// Accounts this capability may act on
    pub account_ids: Vec<Uuid>,
    /// Roles held (across all listed accounts)
    pub roles: Vec<UserRole>,
    /// Top-level capability bypasses all account checks
    pub is_top_level: bool,
}

impl Access {
    /// Capability for internal engine operations; passes every check.
    pub fn internal() -> Self {
        Self {
            account_ids: Vec::new(),
            roles: vec![UserRole::Internal],
            is_top_level: true,
        }
    }

    /// Capability for an external user with the given accounts and roles.
    pub fn user(account_ids: Vec<Uuid>, roles: Vec<UserRole>) -> Self {
        Self {
            account_ids,
            roles,
            is_top_level: false,
        }
    }

    /// Whether this capability may act on the given account at all.
    pub fn has_account(&self, account_id: Uuid) -> bool {
        self.is_top_level || self.account_ids.contains(&account_id)
    }

    /// Whether this capability holds the given role.
    pub fn has_role(&self, role: UserRole) -> bool {
        self.is_top_level || self.roles.contains(&role)
    }

    /// Require membership in the given account.
    pub fn require_account(&self, account_id: Uuid) -> Result<()> {
        if self.has_account(account_id) {
            Ok(())
        } else {
            Err(Error::Privilege(format!(
                "capability has no access to account {account_id}"
            )))
        }
    }

    /// Require membership in the account *and* the given role there.
    pub fn require_role(&self, account_id: Uuid, role: UserRole) -> Result<()> {
        self.require_account(account_id)?;
        if self.has_role(role) {
            Ok(())
        } else {
            Err(Error::Privilege(format!("capability lacks role {role:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_capability_passes_all_checks() {
        let access = Access::internal();
        let account = Uuid::new_v4();
        assert!(access.require_account(account).is_ok());
        assert!(access.require_role(account, UserRole::Engineer).is_ok());
    }

    #[test]
    fn user_capability_checks_account_and_role() {
        let account = Uuid::new_v4();
        let other = Uuid::new_v4();
        let access = Access::user(vec![account], vec![UserRole::Artist]);

        assert!(access.require_account(account).is_ok());
        assert!(access.require_account(other).is_err());
        assert!(access.require_role(account, UserRole::Artist).is_ok());
        assert!(access.require_role(account, UserRole::Engineer).is_err());
    }
}
