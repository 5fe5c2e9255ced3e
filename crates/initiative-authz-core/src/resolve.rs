//! Permission resolution.
//!
//! The effective level of a principal on a resource is the greater of its
//! direct grant and the grant held by the role it *currently* has in the
//! resource's initiative. Neither present means no access.
//!
//! Nothing in this module knows about tenant or platform administrators.
//! Reachability is settled by [`crate::isolation`] before resolution runs,
//! and no administrative role ever elevates a DAC decision.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoreError, Result};
use crate::level::PermissionLevel;
use crate::model::{Resource, ResourcePermission, ResourceRolePermission};
use crate::types::{PrincipalId, RoleId};

/// Every grant attached to one resource.
///
/// Built from the grant rows of a single resource. Role grants are keyed by
/// role, never by principal, so changing a principal's membership changes
/// what they resolve to without touching this structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAcl {
    resource: Resource,

    /// Direct grants: principal -> level.
    user_grants: BTreeMap<PrincipalId, PermissionLevel>,

    /// Role grants: role -> level.
    role_grants: BTreeMap<RoleId, PermissionLevel>,
}

impl ResourceAcl {
    /// An ACL with no grants. Inaccessible to everyone.
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            user_grants: BTreeMap::new(),
            role_grants: BTreeMap::new(),
        }
    }

    /// Build from persisted grant rows.
    ///
    /// Rows that belong to another resource or tenant are rejected.
    pub fn from_rows(
        resource: Resource,
        user_rows: impl IntoIterator<Item = ResourcePermission>,
        role_rows: impl IntoIterator<Item = ResourceRolePermission>,
    ) -> Result<Self> {
        let mut acl = Self::new(resource);

        for row in user_rows {
            if row.resource_id != acl.resource.id || row.tenant_id != acl.resource.tenant_id {
                return Err(CoreError::InvalidReference(format!(
                    "user grant for {} does not belong to resource {}",
                    row.principal_id, acl.resource.id
                )));
            }
            acl.user_grants.insert(row.principal_id, row.level);
        }

        for row in role_rows {
            if row.resource_id != acl.resource.id || row.tenant_id != acl.resource.tenant_id {
                return Err(CoreError::InvalidReference(format!(
                    "role grant for {} does not belong to resource {}",
                    row.role_id, acl.resource.id
                )));
            }
            acl.role_grants.insert(row.role_id, row.level);
        }

        Ok(acl)
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Set the direct grant for `principal`, replacing any previous level.
    pub fn apply_user_grant(&mut self, principal: PrincipalId, level: PermissionLevel) {
        self.user_grants.insert(principal, level);
    }

    /// Set the grant for `role`, replacing any previous level.
    pub fn apply_role_grant(&mut self, role: RoleId, level: PermissionLevel) {
        self.role_grants.insert(role, level);
    }

    /// Remove the direct grant for `principal`, returning the old level.
    pub fn revoke_user(&mut self, principal: &PrincipalId) -> Option<PermissionLevel> {
        self.user_grants.remove(principal)
    }

    /// Remove the grant for `role`, returning the old level.
    pub fn revoke_role(&mut self, role: &RoleId) -> Option<PermissionLevel> {
        self.role_grants.remove(role)
    }

    pub fn direct_level(&self, principal: &PrincipalId) -> Option<PermissionLevel> {
        self.user_grants.get(principal).copied()
    }

    pub fn role_level(&self, role: &RoleId) -> Option<PermissionLevel> {
        self.role_grants.get(role).copied()
    }

    pub fn user_grants(&self) -> impl Iterator<Item = (&PrincipalId, &PermissionLevel)> {
        self.user_grants.iter()
    }

    pub fn role_grants(&self) -> impl Iterator<Item = (&RoleId, &PermissionLevel)> {
        self.role_grants.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.user_grants.is_empty() && self.role_grants.is_empty()
    }

    /// Effective level for `principal` holding `current_role` (if any) in
    /// the resource's initiative.
    pub fn resolve(
        &self,
        principal: &PrincipalId,
        current_role: Option<&RoleId>,
    ) -> Option<PermissionLevel> {
        let direct = self.direct_level(principal);
        let derived = current_role.and_then(|role| self.role_level(role));

        // Option's ordering puts None below every Some, which is exactly
        // "grants only add".
        direct.max(derived)
    }

    /// Principals whose effective level is `owner`.
    ///
    /// `members` maps every current member of the resource's initiative to
    /// their role. Direct-grant holders are counted whether or not they are
    /// members; role-derived ownership only reaches members.
    pub fn owners(&self, members: &BTreeMap<PrincipalId, RoleId>) -> BTreeSet<PrincipalId> {
        let mut owners: BTreeSet<PrincipalId> = self
            .user_grants
            .iter()
            .filter(|(_, level)| **level == PermissionLevel::Owner)
            .map(|(principal, _)| *principal)
            .collect();

        for (principal, role) in members {
            if self.role_level(role) == Some(PermissionLevel::Owner) {
                owners.insert(*principal);
            }
        }

        owners
    }
}

/// Resolve the effective level of `principal` on the resource behind `acl`.
///
/// `None` is a hard denial. Callers must not fall back to partial data.
pub fn resolve(
    acl: &ResourceAcl,
    principal: &PrincipalId,
    current_role: Option<&RoleId>,
) -> Option<PermissionLevel> {
    acl.resolve(principal, current_role)
}

/// Resolve and compare against `minimum`.
///
/// Returns the effective level on success and `CoreError::AccessDenied`
/// otherwise. Only call this once the resource is known to be reachable.
pub fn require(
    acl: &ResourceAcl,
    principal: &PrincipalId,
    current_role: Option<&RoleId>,
    minimum: PermissionLevel,
) -> Result<PermissionLevel> {
    match acl.resolve(principal, current_role) {
        Some(level) if level.satisfies(minimum) => Ok(level),
        effective => Err(CoreError::AccessDenied {
            required: minimum,
            effective,
        }),
    }
}
