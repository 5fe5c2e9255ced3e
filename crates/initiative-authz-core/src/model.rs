//! Tenant directory, initiative role registry and grant rows.
//!
//! These are plain records. Behaviour lives in [`crate::resolve`],
//! [`crate::capability`] and [`crate::isolation`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityKey;
use crate::error::CoreError;
use crate::level::{PermissionLevel, PlatformRole, TenantRole};
use crate::types::{InitiativeId, PrincipalId, ResourceId, RoleId, TenantId};

/// Name of the built-in manager role seeded into every initiative.
pub const PROJECT_MANAGER_ROLE: &str = "project_manager";

/// Name of the built-in non-manager role seeded into every initiative.
pub const MEMBER_ROLE: &str = "member";

/// Root isolation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
}

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TenantId::generate(),
            name: name.into(),
        }
    }
}

/// An authenticated actor as recorded by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub display_name: String,
    pub platform_role: PlatformRole,
}

impl Principal {
    pub fn new(display_name: impl Into<String>, platform_role: PlatformRole) -> Self {
        Self {
            id: PrincipalId::generate(),
            display_name: display_name.into(),
            platform_role,
        }
    }

    /// Platform administrators are the only superadmins.
    pub fn is_superadmin(&self) -> bool {
        self.platform_role.is_admin()
    }
}

/// `(tenant, principal) -> tenant role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub principal_id: PrincipalId,
    pub role: TenantRole,
}

/// A grouping of DAC resources inside one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initiative {
    pub id: InitiativeId,
    pub tenant_id: TenantId,
    pub name: String,
}

impl Initiative {
    pub fn new(tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self {
            id: InitiativeId::generate(),
            tenant_id,
            name: name.into(),
        }
    }
}

/// `(role, capability) -> enabled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissionToggle {
    pub role_id: RoleId,
    pub capability: CapabilityKey,
    pub enabled: bool,
}

/// A role scoped to one initiative.
///
/// `toggles` is ordered by capability key and holds at most one entry per
/// key. Keys without an entry fall back to [`CapabilityKey::default_enabled`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeRole {
    pub id: RoleId,
    pub initiative_id: InitiativeId,
    pub name: String,
    pub is_manager: bool,
    pub position: u32,
    pub toggles: Vec<RolePermissionToggle>,
}

impl InitiativeRole {
    /// A new custom role with no toggle rows.
    pub fn new(
        initiative_id: InitiativeId,
        name: impl Into<String>,
        is_manager: bool,
        position: u32,
    ) -> Self {
        Self {
            id: RoleId::generate(),
            initiative_id,
            name: name.into(),
            is_manager,
            position,
            toggles: Vec::new(),
        }
    }

    /// The two roles seeded into every initiative, manager first.
    pub fn builtin(initiative_id: InitiativeId) -> [InitiativeRole; 2] {
        [
            Self::new(initiative_id, PROJECT_MANAGER_ROLE, true, 0),
            Self::new(initiative_id, MEMBER_ROLE, false, 1),
        ]
    }

    /// Built-in roles may not be renamed or deleted.
    pub fn is_builtin(&self) -> bool {
        self.name == PROJECT_MANAGER_ROLE || self.name == MEMBER_ROLE
    }

    /// The stored toggle for `key`, if any.
    pub fn toggle(&self, key: CapabilityKey) -> Option<bool> {
        self.toggles
            .iter()
            .find(|t| t.capability == key)
            .map(|t| t.enabled)
    }

    /// Insert or replace the toggle for `key`, keeping `toggles` ordered.
    pub fn set_toggle(&mut self, key: CapabilityKey, enabled: bool) {
        match self.toggles.binary_search_by(|t| t.capability.cmp(&key)) {
            Ok(idx) => self.toggles[idx].enabled = enabled,
            Err(idx) => self.toggles.insert(
                idx,
                RolePermissionToggle {
                    role_id: self.id,
                    capability: key,
                    enabled,
                },
            ),
        }
    }
}

/// `(initiative, principal) -> role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeMembership {
    pub initiative_id: InitiativeId,
    pub principal_id: PrincipalId,
    pub role_id: RoleId,
}

/// Kinds of resource governed by discretionary grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Project,
    Document,
    Queue,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Document => "document",
            Self::Queue => "queue",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "document" => Ok(Self::Document),
            "queue" => Ok(Self::Queue),
            other => Err(CoreError::UnknownValue {
                kind: "resource kind",
                value: other.to_string(),
            }),
        }
    }
}

/// A DAC resource. Belongs to exactly one initiative, and through it to one
/// tenant; `tenant_id` is denormalized from the initiative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub initiative_id: InitiativeId,
    pub tenant_id: TenantId,
    pub name: String,
}

impl Resource {
    pub fn new(kind: ResourceKind, initiative: &Initiative, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::generate(),
            kind,
            initiative_id: initiative.id,
            tenant_id: initiative.tenant_id,
            name: name.into(),
        }
    }
}

/// Direct grant: `(resource, principal) -> level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePermission {
    pub resource_id: ResourceId,
    pub principal_id: PrincipalId,
    pub level: PermissionLevel,
    pub tenant_id: TenantId,
}

/// Role grant: `(resource, role) -> level`, inherited by every holder of the
/// role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRolePermission {
    pub resource_id: ResourceId,
    pub role_id: RoleId,
    pub level: PermissionLevel,
    pub tenant_id: TenantId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roles() {
        let initiative = InitiativeId::generate();
        let [pm, member] = InitiativeRole::builtin(initiative);

        assert!(pm.is_manager);
        assert_eq!(pm.name, PROJECT_MANAGER_ROLE);
        assert!(!member.is_manager);
        assert!(pm.is_builtin() && member.is_builtin());
        assert!(member.toggles.is_empty());
    }

    #[test]
    fn test_set_toggle_keeps_one_row_per_key() {
        let mut role = InitiativeRole::new(InitiativeId::generate(), "editor", false, 2);
        role.set_toggle(CapabilityKey::CreateProjects, true);
        role.set_toggle(CapabilityKey::DocsEnabled, false);
        role.set_toggle(CapabilityKey::CreateProjects, false);

        assert_eq!(role.toggles.len(), 2);
        assert_eq!(role.toggle(CapabilityKey::CreateProjects), Some(false));
        assert_eq!(role.toggle(CapabilityKey::DocsEnabled), Some(false));
        assert_eq!(role.toggle(CapabilityKey::CreateDocs), None);
        assert!(role.toggles.windows(2).all(|w| w[0].capability < w[1].capability));
    }

    #[test]
    fn test_resource_inherits_tenant() {
        let initiative = Initiative::new(TenantId::generate(), "roadmap");
        let resource = Resource::new(ResourceKind::Queue, &initiative, "triage");
        assert_eq!(resource.tenant_id, initiative.tenant_id);
        assert_eq!(resource.initiative_id, initiative.id);
    }
}
