//! Store traits: the abstract interface for grant and membership persistence.
//!
//! [`StoreTx`] is a synchronous view over one transaction. [`Store`] hands
//! such a view to a closure, either read-only ([`Store::read`]) or inside a
//! transaction that commits only if the closure succeeds
//! ([`Store::atomic`]). All registry and ownership-transfer logic is written
//! once against `StoreTx` and runs unchanged on every backend.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use initiative_authz_core::{
    Initiative, InitiativeId, InitiativeMembership, InitiativeRole, Principal, PrincipalId,
    Resource, ResourceAcl, ResourceId, ResourcePermission, ResourceRolePermission, RoleId,
    RolePermissionToggle, Tenant, TenantId, TenantMembership,
};

use crate::error::{Result, StoreError};

/// Operations available inside a transaction.
///
/// Mutating methods take `&mut self`; a read-only view only hands out
/// `&dyn StoreTx`, so the type system keeps reads from writing.
pub trait StoreTx {
    // ─────────────────────────────────────────────────────────────────────────
    // Tenant Directory
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_tenant(&mut self, tenant: &Tenant) -> Result<()>;

    fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>>;

    /// Insert a principal or update its name and platform role.
    fn upsert_principal(&mut self, principal: &Principal) -> Result<()>;

    fn get_principal(&self, id: &PrincipalId) -> Result<Option<Principal>>;

    fn upsert_tenant_membership(&mut self, membership: &TenantMembership) -> Result<()>;

    fn get_tenant_membership(
        &self,
        tenant: &TenantId,
        principal: &PrincipalId,
    ) -> Result<Option<TenantMembership>>;

    /// Returns whether a row was deleted.
    fn delete_tenant_membership(&mut self, tenant: &TenantId, principal: &PrincipalId)
        -> Result<bool>;

    /// Every tenant membership held by `principal`.
    fn tenant_memberships_of(&self, principal: &PrincipalId) -> Result<Vec<TenantMembership>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Initiatives and Roles
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_initiative(&mut self, initiative: &Initiative) -> Result<()>;

    fn get_initiative(&self, id: &InitiativeId) -> Result<Option<Initiative>>;

    fn initiatives_in_tenant(&self, tenant: &TenantId) -> Result<Vec<Initiative>>;

    /// Insert or update a role, replacing its toggle rows with
    /// `role.toggles`.
    fn upsert_role(&mut self, role: &InitiativeRole) -> Result<()>;

    /// A role with its toggles.
    fn get_role(&self, id: &RoleId) -> Result<Option<InitiativeRole>>;

    /// Roles of an initiative ordered by position.
    fn roles_in_initiative(&self, initiative: &InitiativeId) -> Result<Vec<InitiativeRole>>;

    /// Delete a role with its toggles and role grants.
    ///
    /// Fails with a constraint error while a membership references it.
    fn delete_role(&mut self, id: &RoleId) -> Result<bool>;

    /// Insert or replace a single toggle row.
    fn set_toggle(&mut self, toggle: &RolePermissionToggle) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Initiative Memberships
    // ─────────────────────────────────────────────────────────────────────────

    fn upsert_membership(&mut self, membership: &InitiativeMembership) -> Result<()>;

    fn get_membership(
        &self,
        initiative: &InitiativeId,
        principal: &PrincipalId,
    ) -> Result<Option<InitiativeMembership>>;

    fn delete_membership(&mut self, initiative: &InitiativeId, principal: &PrincipalId)
        -> Result<bool>;

    fn memberships_in_initiative(
        &self,
        initiative: &InitiativeId,
    ) -> Result<Vec<InitiativeMembership>>;

    fn memberships_of(&self, principal: &PrincipalId) -> Result<Vec<InitiativeMembership>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_resource(&mut self, resource: &Resource) -> Result<()>;

    fn get_resource(&self, id: &ResourceId) -> Result<Option<Resource>>;

    /// Delete a resource and every grant on it.
    fn delete_resource(&mut self, id: &ResourceId) -> Result<bool>;

    fn resources_in_initiative(&self, initiative: &InitiativeId) -> Result<Vec<Resource>>;

    /// Resources whose denormalized tenant is one of `tenants`.
    fn resources_in_tenants(&self, tenants: &[TenantId]) -> Result<Vec<Resource>>;

    fn all_resources(&self) -> Result<Vec<Resource>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Grants
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace the direct grant for `(resource, principal)`.
    fn upsert_user_grant(&mut self, grant: &ResourcePermission) -> Result<()>;

    fn delete_user_grant(&mut self, resource: &ResourceId, principal: &PrincipalId)
        -> Result<bool>;

    fn user_grants_on(&self, resource: &ResourceId) -> Result<Vec<ResourcePermission>>;

    /// Insert or replace the role grant for `(resource, role)`.
    fn upsert_role_grant(&mut self, grant: &ResourceRolePermission) -> Result<()>;

    fn delete_role_grant(&mut self, resource: &ResourceId, role: &RoleId) -> Result<bool>;

    fn role_grants_on(&self, resource: &ResourceId) -> Result<Vec<ResourceRolePermission>>;

    fn role_grants_for_role(&self, role: &RoleId) -> Result<Vec<ResourceRolePermission>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Derived Views
    // ─────────────────────────────────────────────────────────────────────────

    /// Load every grant on `resource`.
    fn load_acl(&self, resource: Resource) -> Result<ResourceAcl> {
        let users = self.user_grants_on(&resource.id)?;
        let roles = self.role_grants_on(&resource.id)?;
        ResourceAcl::from_rows(resource, users, roles)
            .map_err(|e| StoreError::InvalidData(e.to_string()))
    }

    /// Current members of an initiative mapped to their role.
    fn member_roles(&self, initiative: &InitiativeId) -> Result<BTreeMap<PrincipalId, RoleId>> {
        Ok(self
            .memberships_in_initiative(initiative)?
            .into_iter()
            .map(|m| (m.principal_id, m.role_id))
            .collect())
    }

    /// Roles of an initiative flagged `is_manager`.
    fn manager_roles(&self, initiative: &InitiativeId) -> Result<BTreeSet<RoleId>> {
        Ok(self
            .roles_in_initiative(initiative)?
            .into_iter()
            .filter(|r| r.is_manager)
            .map(|r| r.id)
            .collect())
    }

    /// The role `principal` currently holds in `initiative`, with toggles.
    fn current_role(
        &self,
        initiative: &InitiativeId,
        principal: &PrincipalId,
    ) -> Result<Option<InitiativeRole>> {
        match self.get_membership(initiative, principal)? {
            Some(m) => self.get_role(&m.role_id),
            None => Ok(None),
        }
    }
}

/// The Store trait: async entry point to a backend.
///
/// Closures run on the backend's own thread of control to completion;
/// dropping the returned future never leaves a transaction half-applied.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run `f` against a consistent read-only view.
    async fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static;

    /// Run `f` inside a transaction.
    ///
    /// Commits if `f` returns `Ok`, rolls back every change otherwise.
    async fn atomic<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static;
}
