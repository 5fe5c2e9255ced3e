//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite,
//! including cascades and reference checks, but keeps everything in memory
//! with no persistence.
//!
//! Transactions are copy-on-write: [`Store::atomic`] clones the state, runs
//! the closure on the clone and swaps it in only on success.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use initiative_authz_core::{
    Initiative, InitiativeId, InitiativeMembership, InitiativeRole, Principal, PrincipalId,
    Resource, ResourceId, ResourcePermission, ResourceRolePermission, RoleId,
    RolePermissionToggle, Tenant, TenantId, TenantMembership,
};

use crate::error::{Result, StoreError};
use crate::traits::{Store, StoreTx};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryState>,
}

/// The full table set. Cloned once per transaction.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    tenants: BTreeMap<TenantId, Tenant>,
    principals: BTreeMap<PrincipalId, Principal>,
    tenant_memberships: BTreeMap<(TenantId, PrincipalId), TenantMembership>,
    initiatives: BTreeMap<InitiativeId, Initiative>,

    /// Roles with their toggles embedded.
    roles: BTreeMap<RoleId, InitiativeRole>,

    memberships: BTreeMap<(InitiativeId, PrincipalId), InitiativeMembership>,
    resources: BTreeMap<ResourceId, Resource>,
    user_grants: BTreeMap<(ResourceId, PrincipalId), ResourcePermission>,
    role_grants: BTreeMap<(ResourceId, RoleId), ResourceRolePermission>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Poisoned(e.to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let inner = self.inner.read().map_err(poisoned)?;
        f(&*inner)
    }

    async fn atomic<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let mut inner = self.inner.write().map_err(poisoned)?;

        let mut next = inner.clone();
        let out = f(&mut next)?;
        *inner = next;

        Ok(out)
    }
}

impl MemoryState {
    fn require_tenant(&self, id: &TenantId) -> Result<()> {
        if !self.tenants.contains_key(id) {
            return Err(StoreError::Constraint(format!("unknown tenant {}", id)));
        }
        Ok(())
    }

    fn require_principal(&self, id: &PrincipalId) -> Result<()> {
        if !self.principals.contains_key(id) {
            return Err(StoreError::Constraint(format!("unknown principal {}", id)));
        }
        Ok(())
    }

    fn require_initiative(&self, id: &InitiativeId) -> Result<()> {
        if !self.initiatives.contains_key(id) {
            return Err(StoreError::Constraint(format!("unknown initiative {}", id)));
        }
        Ok(())
    }

    fn require_role(&self, id: &RoleId) -> Result<()> {
        if !self.roles.contains_key(id) {
            return Err(StoreError::Constraint(format!("unknown role {}", id)));
        }
        Ok(())
    }

    fn require_resource(&self, id: &ResourceId) -> Result<()> {
        if !self.resources.contains_key(id) {
            return Err(StoreError::Constraint(format!("unknown resource {}", id)));
        }
        Ok(())
    }
}

impl StoreTx for MemoryState {
    fn insert_tenant(&mut self, tenant: &Tenant) -> Result<()> {
        if self.tenants.contains_key(&tenant.id) {
            return Err(StoreError::Constraint(format!("tenant {} exists", tenant.id)));
        }
        self.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>> {
        Ok(self.tenants.get(id).cloned())
    }

    fn upsert_principal(&mut self, principal: &Principal) -> Result<()> {
        self.principals.insert(principal.id, principal.clone());
        Ok(())
    }

    fn get_principal(&self, id: &PrincipalId) -> Result<Option<Principal>> {
        Ok(self.principals.get(id).cloned())
    }

    fn upsert_tenant_membership(&mut self, membership: &TenantMembership) -> Result<()> {
        self.require_tenant(&membership.tenant_id)?;
        self.require_principal(&membership.principal_id)?;
        self.tenant_memberships.insert(
            (membership.tenant_id, membership.principal_id),
            membership.clone(),
        );
        Ok(())
    }

    fn get_tenant_membership(
        &self,
        tenant: &TenantId,
        principal: &PrincipalId,
    ) -> Result<Option<TenantMembership>> {
        Ok(self.tenant_memberships.get(&(*tenant, *principal)).cloned())
    }

    fn delete_tenant_membership(
        &mut self,
        tenant: &TenantId,
        principal: &PrincipalId,
    ) -> Result<bool> {
        Ok(self.tenant_memberships.remove(&(*tenant, *principal)).is_some())
    }

    fn tenant_memberships_of(&self, principal: &PrincipalId) -> Result<Vec<TenantMembership>> {
        Ok(self
            .tenant_memberships
            .values()
            .filter(|m| m.principal_id == *principal)
            .cloned()
            .collect())
    }

    fn insert_initiative(&mut self, initiative: &Initiative) -> Result<()> {
        self.require_tenant(&initiative.tenant_id)?;
        if self.initiatives.contains_key(&initiative.id) {
            return Err(StoreError::Constraint(format!(
                "initiative {} exists",
                initiative.id
            )));
        }
        self.initiatives.insert(initiative.id, initiative.clone());
        Ok(())
    }

    fn get_initiative(&self, id: &InitiativeId) -> Result<Option<Initiative>> {
        Ok(self.initiatives.get(id).cloned())
    }

    fn initiatives_in_tenant(&self, tenant: &TenantId) -> Result<Vec<Initiative>> {
        Ok(self
            .initiatives
            .values()
            .filter(|i| i.tenant_id == *tenant)
            .cloned()
            .collect())
    }

    fn upsert_role(&mut self, role: &InitiativeRole) -> Result<()> {
        self.require_initiative(&role.initiative_id)?;

        let name_taken = self.roles.values().any(|r| {
            r.initiative_id == role.initiative_id && r.name == role.name && r.id != role.id
        });
        if name_taken {
            return Err(StoreError::Constraint(format!(
                "role name {} already used in initiative {}",
                role.name, role.initiative_id
            )));
        }

        self.roles.insert(role.id, role.clone());
        Ok(())
    }

    fn get_role(&self, id: &RoleId) -> Result<Option<InitiativeRole>> {
        Ok(self.roles.get(id).cloned())
    }

    fn roles_in_initiative(&self, initiative: &InitiativeId) -> Result<Vec<InitiativeRole>> {
        let mut roles: Vec<InitiativeRole> = self
            .roles
            .values()
            .filter(|r| r.initiative_id == *initiative)
            .cloned()
            .collect();
        roles.sort_by_key(|r| r.position);
        Ok(roles)
    }

    fn delete_role(&mut self, id: &RoleId) -> Result<bool> {
        if self.memberships.values().any(|m| m.role_id == *id) {
            return Err(StoreError::Constraint(format!(
                "role {} is still assigned",
                id
            )));
        }
        if self.roles.remove(id).is_none() {
            return Ok(false);
        }
        self.role_grants.retain(|(_, role), _| role != id);
        Ok(true)
    }

    fn set_toggle(&mut self, toggle: &RolePermissionToggle) -> Result<()> {
        let role = self
            .roles
            .get_mut(&toggle.role_id)
            .ok_or_else(|| StoreError::Constraint(format!("unknown role {}", toggle.role_id)))?;
        role.set_toggle(toggle.capability, toggle.enabled);
        Ok(())
    }

    fn upsert_membership(&mut self, membership: &InitiativeMembership) -> Result<()> {
        self.require_initiative(&membership.initiative_id)?;
        self.require_principal(&membership.principal_id)?;
        self.require_role(&membership.role_id)?;
        self.memberships.insert(
            (membership.initiative_id, membership.principal_id),
            membership.clone(),
        );
        Ok(())
    }

    fn get_membership(
        &self,
        initiative: &InitiativeId,
        principal: &PrincipalId,
    ) -> Result<Option<InitiativeMembership>> {
        Ok(self.memberships.get(&(*initiative, *principal)).cloned())
    }

    fn delete_membership(
        &mut self,
        initiative: &InitiativeId,
        principal: &PrincipalId,
    ) -> Result<bool> {
        Ok(self.memberships.remove(&(*initiative, *principal)).is_some())
    }

    fn memberships_in_initiative(
        &self,
        initiative: &InitiativeId,
    ) -> Result<Vec<InitiativeMembership>> {
        Ok(self
            .memberships
            .range((*initiative, PrincipalId::from_bytes([0; 16]))..)
            .take_while(|((i, _), _)| i == initiative)
            .map(|(_, m)| m.clone())
            .collect())
    }

    fn memberships_of(&self, principal: &PrincipalId) -> Result<Vec<InitiativeMembership>> {
        Ok(self
            .memberships
            .values()
            .filter(|m| m.principal_id == *principal)
            .cloned()
            .collect())
    }

    fn insert_resource(&mut self, resource: &Resource) -> Result<()> {
        self.require_initiative(&resource.initiative_id)?;
        self.require_tenant(&resource.tenant_id)?;
        if self.resources.contains_key(&resource.id) {
            return Err(StoreError::Constraint(format!(
                "resource {} exists",
                resource.id
            )));
        }
        self.resources.insert(resource.id, resource.clone());
        Ok(())
    }

    fn get_resource(&self, id: &ResourceId) -> Result<Option<Resource>> {
        Ok(self.resources.get(id).cloned())
    }

    fn delete_resource(&mut self, id: &ResourceId) -> Result<bool> {
        if self.resources.remove(id).is_none() {
            return Ok(false);
        }
        self.user_grants.retain(|(resource, _), _| resource != id);
        self.role_grants.retain(|(resource, _), _| resource != id);
        Ok(true)
    }

    fn resources_in_initiative(&self, initiative: &InitiativeId) -> Result<Vec<Resource>> {
        Ok(self
            .resources
            .values()
            .filter(|r| r.initiative_id == *initiative)
            .cloned()
            .collect())
    }

    fn resources_in_tenants(&self, tenants: &[TenantId]) -> Result<Vec<Resource>> {
        Ok(self
            .resources
            .values()
            .filter(|r| tenants.contains(&r.tenant_id))
            .cloned()
            .collect())
    }

    fn all_resources(&self) -> Result<Vec<Resource>> {
        Ok(self.resources.values().cloned().collect())
    }

    fn upsert_user_grant(&mut self, grant: &ResourcePermission) -> Result<()> {
        self.require_resource(&grant.resource_id)?;
        self.require_principal(&grant.principal_id)?;
        self.user_grants
            .insert((grant.resource_id, grant.principal_id), grant.clone());
        Ok(())
    }

    fn delete_user_grant(
        &mut self,
        resource: &ResourceId,
        principal: &PrincipalId,
    ) -> Result<bool> {
        Ok(self.user_grants.remove(&(*resource, *principal)).is_some())
    }

    fn user_grants_on(&self, resource: &ResourceId) -> Result<Vec<ResourcePermission>> {
        Ok(self
            .user_grants
            .values()
            .filter(|g| g.resource_id == *resource)
            .cloned()
            .collect())
    }

    fn upsert_role_grant(&mut self, grant: &ResourceRolePermission) -> Result<()> {
        self.require_resource(&grant.resource_id)?;
        self.require_role(&grant.role_id)?;
        self.role_grants
            .insert((grant.resource_id, grant.role_id), grant.clone());
        Ok(())
    }

    fn delete_role_grant(&mut self, resource: &ResourceId, role: &RoleId) -> Result<bool> {
        Ok(self.role_grants.remove(&(*resource, *role)).is_some())
    }

    fn role_grants_on(&self, resource: &ResourceId) -> Result<Vec<ResourceRolePermission>> {
        Ok(self
            .role_grants
            .values()
            .filter(|g| g.resource_id == *resource)
            .cloned()
            .collect())
    }

    fn role_grants_for_role(&self, role: &RoleId) -> Result<Vec<ResourceRolePermission>> {
        Ok(self
            .role_grants
            .values()
            .filter(|g| g.role_id == *role)
            .cloned()
            .collect())
    }
}
