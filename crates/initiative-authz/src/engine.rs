//! The Engine: unified async API over a [`Store`].
//!
//! Each call opens exactly one store transaction, validates the request
//! identity inside it, and runs the read-side or registry logic against the
//! same view. Nothing is cached between calls, so role-derived grants are
//! always resolved through the current membership row.

use std::collections::BTreeSet;
use std::sync::Arc;

use initiative_authz_core::{
    CapabilityKey, Initiative, InitiativeId, InitiativeMembership, InitiativeRole,
    PermissionLevel, PlatformRole, Principal, PrincipalId, Resource, ResourceId, ResourceKind,
    ResourcePermission, ResourceRolePermission, RoleId, Tenant, TenantMembership, TenantRole,
    TenantScopedHandle,
};
use initiative_authz_store::{Store, StoreTx};

use crate::access;
use crate::config::EngineConfig;
use crate::context::{open_context, RequestIdentity};
use crate::coordinator::TransferReport;
use crate::error::Result;
use crate::registry;

/// The main Engine struct.
///
/// Provides a unified API for:
/// - Resolving and requiring permissions on resources
/// - Feature toggle checks
/// - Listing reachable and accessible resources
/// - Managing tenants, initiatives, roles, memberships and grants
pub struct Engine<S: Store> {
    /// The storage backend.
    store: Arc<S>,
    /// Configuration.
    config: EngineConfig,
}

impl<S: Store> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> Engine<S> {
    /// Create a new engine over `store`.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `f` against a read view with the caller's validated context.
    async fn read_scoped<T, F>(&self, identity: &RequestIdentity, f: F) -> Result<T>
    where
        F: FnOnce(&dyn StoreTx, &TenantScopedHandle) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let identity = identity.clone();
        let config = self.config.clone();
        self.store
            .read(move |tx| {
                let scope = open_context(tx, &identity, &config)?;
                f(tx, &scope)
            })
            .await
    }

    /// Run `f` in a transaction with the caller's validated context.
    async fn write_scoped<T, F>(&self, identity: &RequestIdentity, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreTx, &TenantScopedHandle, &EngineConfig) -> Result<T>
            + Send
            + 'static,
        T: Send + 'static,
    {
        let identity = identity.clone();
        let config = self.config.clone();
        self.store
            .atomic(move |tx| {
                let scope = open_context(&*tx, &identity, &config)?;
                f(tx, &scope, &config)
            })
            .await
    }

    /// Validate `identity` and return the resulting tenant context.
    pub async fn open_context(&self, identity: &RequestIdentity) -> Result<TenantScopedHandle> {
        self.read_scoped(identity, |_, scope| Ok(scope.clone())).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access Decisions
    // ─────────────────────────────────────────────────────────────────────────

    /// Effective level of the caller on `resource`, `None` for no access.
    ///
    /// Fails with `NotFound` if the resource does not exist or is outside
    /// the caller's tenant scope.
    pub async fn resolve_permission(
        &self,
        identity: &RequestIdentity,
        resource: ResourceId,
    ) -> Result<Option<PermissionLevel>> {
        self.read_scoped(identity, move |tx, scope| {
            access::resolve_permission(tx, scope, &resource)
        })
        .await
    }

    /// Succeeds with the effective level iff it is at least `minimum`.
    pub async fn require_permission(
        &self,
        identity: &RequestIdentity,
        resource: ResourceId,
        minimum: PermissionLevel,
    ) -> Result<PermissionLevel> {
        self.read_scoped(identity, move |tx, scope| {
            access::require_permission(tx, scope, &resource, minimum)
        })
        .await
    }

    pub async fn can_use_feature(
        &self,
        identity: &RequestIdentity,
        initiative: InitiativeId,
        key: CapabilityKey,
    ) -> Result<bool> {
        self.read_scoped(identity, move |tx, scope| {
            access::can_use_feature(tx, scope, &initiative, key)
        })
        .await
    }

    pub async fn list_reachable(
        &self,
        identity: &RequestIdentity,
    ) -> Result<BTreeSet<ResourceId>> {
        self.read_scoped(identity, |tx, scope| access::list_reachable(tx, scope))
            .await
    }

    pub async fn list_accessible(
        &self,
        identity: &RequestIdentity,
        minimum: PermissionLevel,
    ) -> Result<Vec<(Resource, PermissionLevel)>> {
        self.read_scoped(identity, move |tx, scope| {
            access::list_accessible(tx, scope, minimum)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tenant Directory
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn register_principal(
        &self,
        display_name: &str,
        platform_role: PlatformRole,
    ) -> Result<Principal> {
        let display_name = display_name.to_string();
        self.store
            .atomic(move |tx| registry::register_principal(tx, &display_name, platform_role))
            .await
    }

    /// Create a tenant. `creator` must be registered and becomes its admin.
    pub async fn create_tenant(&self, creator: PrincipalId, name: &str) -> Result<Tenant> {
        let name = name.to_string();
        self.store
            .atomic(move |tx| registry::create_tenant(tx, &creator, &name))
            .await
    }

    pub async fn add_tenant_member(
        &self,
        identity: &RequestIdentity,
        principal: PrincipalId,
        role: TenantRole,
    ) -> Result<TenantMembership> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::add_tenant_member(tx, scope, &principal, role)
        })
        .await
    }

    pub async fn remove_tenant_member(
        &self,
        identity: &RequestIdentity,
        principal: PrincipalId,
    ) -> Result<TransferReport> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::remove_tenant_member(tx, scope, &principal)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Initiatives and Roles
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_initiative(
        &self,
        identity: &RequestIdentity,
        name: &str,
    ) -> Result<Initiative> {
        let name = name.to_string();
        self.write_scoped(identity, move |tx, scope, config| {
            registry::create_initiative(tx, scope, config, &name)
        })
        .await
    }

    pub async fn create_role(
        &self,
        identity: &RequestIdentity,
        initiative: InitiativeId,
        name: &str,
        is_manager: bool,
    ) -> Result<InitiativeRole> {
        let name = name.to_string();
        self.write_scoped(identity, move |tx, scope, _| {
            registry::create_role(tx, scope, &initiative, &name, is_manager)
        })
        .await
    }

    pub async fn rename_role(
        &self,
        identity: &RequestIdentity,
        role: RoleId,
        name: &str,
    ) -> Result<InitiativeRole> {
        let name = name.to_string();
        self.write_scoped(identity, move |tx, scope, _| {
            registry::rename_role(tx, scope, &role, &name)
        })
        .await
    }

    pub async fn set_role_manager(
        &self,
        identity: &RequestIdentity,
        role: RoleId,
        is_manager: bool,
    ) -> Result<InitiativeRole> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::set_role_manager(tx, scope, &role, is_manager)
        })
        .await
    }

    pub async fn delete_role(
        &self,
        identity: &RequestIdentity,
        role: RoleId,
    ) -> Result<TransferReport> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::delete_role(tx, scope, &role)
        })
        .await
    }

    pub async fn set_toggle(
        &self,
        identity: &RequestIdentity,
        role: RoleId,
        key: CapabilityKey,
        enabled: bool,
    ) -> Result<InitiativeRole> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::set_toggle(tx, scope, &role, key, enabled)
        })
        .await
    }

    pub async fn list_roles(
        &self,
        identity: &RequestIdentity,
        initiative: InitiativeId,
    ) -> Result<Vec<InitiativeRole>> {
        self.read_scoped(identity, move |tx, scope| {
            registry::list_roles(tx, scope, &initiative)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Initiative Memberships
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_initiative_member(
        &self,
        identity: &RequestIdentity,
        initiative: InitiativeId,
        principal: PrincipalId,
        role: RoleId,
    ) -> Result<InitiativeMembership> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::add_initiative_member(tx, scope, &initiative, &principal, &role)
        })
        .await
    }

    pub async fn change_member_role(
        &self,
        identity: &RequestIdentity,
        initiative: InitiativeId,
        principal: PrincipalId,
        role: RoleId,
    ) -> Result<TransferReport> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::change_member_role(tx, scope, &initiative, &principal, &role)
        })
        .await
    }

    /// Remove a member. Ownership transfer runs in the same transaction.
    pub async fn remove_initiative_member(
        &self,
        identity: &RequestIdentity,
        initiative: InitiativeId,
        principal: PrincipalId,
    ) -> Result<TransferReport> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::remove_initiative_member(tx, scope, &initiative, &principal)
        })
        .await
    }

    pub async fn repair_ownership(
        &self,
        identity: &RequestIdentity,
        initiative: InitiativeId,
    ) -> Result<TransferReport> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::repair_ownership(tx, scope, &initiative)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources and Grants
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_resource(
        &self,
        identity: &RequestIdentity,
        initiative: InitiativeId,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Resource> {
        let name = name.to_string();
        self.write_scoped(identity, move |tx, scope, _| {
            registry::create_resource(tx, scope, &initiative, kind, &name)
        })
        .await
    }

    pub async fn delete_resource(
        &self,
        identity: &RequestIdentity,
        resource: ResourceId,
    ) -> Result<()> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::delete_resource(tx, scope, &resource)
        })
        .await
    }

    pub async fn grant_user(
        &self,
        identity: &RequestIdentity,
        resource: ResourceId,
        principal: PrincipalId,
        level: PermissionLevel,
    ) -> Result<ResourcePermission> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::grant_user(tx, scope, &resource, &principal, level)
        })
        .await
    }

    pub async fn revoke_user(
        &self,
        identity: &RequestIdentity,
        resource: ResourceId,
        principal: PrincipalId,
    ) -> Result<bool> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::revoke_user(tx, scope, &resource, &principal)
        })
        .await
    }

    pub async fn grant_role(
        &self,
        identity: &RequestIdentity,
        resource: ResourceId,
        role: RoleId,
        level: PermissionLevel,
    ) -> Result<ResourceRolePermission> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::grant_role(tx, scope, &resource, &role, level)
        })
        .await
    }

    pub async fn revoke_role(
        &self,
        identity: &RequestIdentity,
        resource: ResourceId,
        role: RoleId,
    ) -> Result<bool> {
        self.write_scoped(identity, move |tx, scope, _| {
            registry::revoke_role(tx, scope, &resource, &role)
        })
        .await
    }
}
