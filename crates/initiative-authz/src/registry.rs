//! Role & Grant Registry: every mutation of tenants, initiatives, roles,
//! memberships, resources and grants.
//!
//! Functions here run inside one [`Store::atomic`] call. They check the
//! caller's scope and rights, reject references that cross an initiative or
//! tenant boundary, and hand off to the coordinator whenever a change can
//! leave a resource without an owner.
//!
//! [`Store::atomic`]: initiative_authz_store::Store::atomic

use initiative_authz_core::validation::{
    check_role_in_initiative, check_role_on_resource, validate_display_name, validate_role_name,
};
use initiative_authz_core::{
    can, CapabilityKey, Initiative, InitiativeId, InitiativeMembership, InitiativeRole,
    PermissionLevel, PlatformRole, Principal, PrincipalId, Resource, ResourceAcl, ResourceId,
    ResourceKind, ResourcePermission, ResourceRolePermission, RoleId, RolePermissionToggle, Tenant,
    TenantMembership, TenantRole, TenantScoped, TenantScopedHandle, MEMBER_ROLE,
    PROJECT_MANAGER_ROLE,
};
use initiative_authz_store::StoreTx;

use crate::access::{authorize, load_initiative};
use crate::config::EngineConfig;
use crate::coordinator::{self, TransferReport};
use crate::error::{EngineError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Guards
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_active_tenant<T: TenantScoped>(scope: &TenantScopedHandle, item: &T) -> Result<()> {
    if !scope.can_mutate(item) {
        return Err(EngineError::Forbidden(
            "changes are limited to the active tenant".into(),
        ));
    }
    Ok(())
}

fn ensure_tenant_admin(scope: &TenantScopedHandle) -> Result<()> {
    if !scope.can_administer() {
        return Err(EngineError::Forbidden(format!(
            "tenant {} requires an admin",
            scope.active_tenant()
        )));
    }
    Ok(())
}

/// Tenant admins, platform admins and holders of a manager role may
/// administer an initiative.
fn ensure_initiative_admin(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    initiative: &Initiative,
) -> Result<()> {
    ensure_active_tenant(scope, initiative)?;
    if scope.can_administer() {
        return Ok(());
    }

    let manager = tx
        .current_role(&initiative.id, &scope.principal().id)?
        .map(|r| r.is_manager)
        .unwrap_or(false);
    if !manager {
        return Err(EngineError::Forbidden(format!(
            "initiative {} requires a manager",
            initiative.id
        )));
    }
    Ok(())
}

fn administered_initiative(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    id: &InitiativeId,
) -> Result<Initiative> {
    let initiative = load_initiative(tx, scope, id)?;
    ensure_initiative_admin(tx, scope, &initiative)?;
    Ok(initiative)
}

/// A role the caller may administer, with its initiative. Roles of
/// unreachable initiatives do not exist.
fn administered_role(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    id: &RoleId,
) -> Result<(InitiativeRole, Initiative)> {
    let not_found = || EngineError::NotFound(format!("role {}", id));

    let role = tx.get_role(id)?.ok_or_else(not_found)?;
    let initiative = tx.get_initiative(&role.initiative_id)?;
    let initiative = scope.reveal(initiative, "role", id)?;
    ensure_initiative_admin(tx, scope, &initiative)?;
    Ok((role, initiative))
}

fn ensure_custom(role: &InitiativeRole, action: &str) -> Result<()> {
    if role.is_builtin() {
        return Err(EngineError::Validation(format!(
            "built-in role {} cannot be {}",
            role.name, action
        )));
    }
    Ok(())
}

fn ensure_role_name_free(tx: &dyn StoreTx, initiative: &InitiativeId, name: &str) -> Result<()> {
    if name == PROJECT_MANAGER_ROLE || name == MEMBER_ROLE {
        return Err(EngineError::Conflict(format!("{} is a reserved role name", name)));
    }
    if tx.roles_in_initiative(initiative)?.iter().any(|r| r.name == name) {
        return Err(EngineError::Conflict(format!(
            "role {} already exists in initiative {}",
            name, initiative
        )));
    }
    Ok(())
}

/// Reject a grant change that takes a resource from some reachable owner to
/// none.
fn ensure_owner_remains(
    tx: &dyn StoreTx,
    before: &ResourceAcl,
    after: &ResourceAcl,
) -> Result<()> {
    let members = tx.member_roles(&before.resource().initiative_id)?;
    if !before.owners(&members).is_empty() && after.owners(&members).is_empty() {
        return Err(EngineError::LastOwner(before.resource().id));
    }
    Ok(())
}

fn require_principal(tx: &dyn StoreTx, id: &PrincipalId) -> Result<Principal> {
    tx.get_principal(id)?
        .ok_or_else(|| EngineError::NotFound(format!("principal {}", id)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenant Directory
// ─────────────────────────────────────────────────────────────────────────────

/// Register a principal. Identity is established by the transport; this only
/// records it.
pub fn register_principal(
    tx: &mut dyn StoreTx,
    display_name: &str,
    platform_role: PlatformRole,
) -> Result<Principal> {
    validate_display_name("principal", display_name)?;
    let principal = Principal::new(display_name, platform_role);
    tx.upsert_principal(&principal)?;
    tracing::info!(
        principal = %principal.id,
        role = platform_role.as_str(),
        "registered principal"
    );
    Ok(principal)
}

/// Create a tenant with `creator` as its first admin.
pub fn create_tenant(tx: &mut dyn StoreTx, creator: &PrincipalId, name: &str) -> Result<Tenant> {
    validate_display_name("tenant", name)?;
    require_principal(&*tx, creator)?;

    let tenant = Tenant::new(name);
    tx.insert_tenant(&tenant)?;
    tx.upsert_tenant_membership(&TenantMembership {
        tenant_id: tenant.id,
        principal_id: *creator,
        role: TenantRole::Admin,
    })?;

    tracing::info!(tenant = %tenant.id, creator = %creator, "created tenant");
    Ok(tenant)
}

/// Add `principal` to the active tenant, or change their tenant role.
pub fn add_tenant_member(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    principal: &PrincipalId,
    role: TenantRole,
) -> Result<TenantMembership> {
    ensure_tenant_admin(scope)?;
    require_principal(&*tx, principal)?;

    let membership = TenantMembership {
        tenant_id: *scope.active_tenant(),
        principal_id: *principal,
        role,
    };
    tx.upsert_tenant_membership(&membership)?;
    tracing::info!(
        tenant = %membership.tenant_id,
        principal = %principal,
        role = role.as_str(),
        "added tenant member"
    );
    Ok(membership)
}

/// Remove `principal` from the active tenant, from every initiative in it
/// and from every direct grant they hold there, transferring ownership.
pub fn remove_tenant_member(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    principal: &PrincipalId,
) -> Result<TransferReport> {
    ensure_tenant_admin(scope)?;
    let tenant = *scope.active_tenant();

    if !tx.delete_tenant_membership(&tenant, principal)? {
        return Err(EngineError::NotFound(format!(
            "tenant membership of {}",
            principal
        )));
    }

    let report = coordinator::on_tenant_exit(tx, &tenant, principal)?;

    tracing::info!(tenant = %tenant, principal = %principal, "removed tenant member");
    Ok(report)
}

// ─────────────────────────────────────────────────────────────────────────────
// Initiatives and Roles
// ─────────────────────────────────────────────────────────────────────────────

/// Create an initiative in the active tenant.
///
/// Seeds the built-in roles and makes the caller a `project_manager` unless
/// configured otherwise.
pub fn create_initiative(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    config: &EngineConfig,
    name: &str,
) -> Result<Initiative> {
    ensure_tenant_admin(scope)?;
    validate_display_name("initiative", name)?;

    let initiative = Initiative::new(*scope.active_tenant(), name);
    tx.insert_initiative(&initiative)?;

    if config.seed_builtin_roles {
        let [manager, member] = InitiativeRole::builtin(initiative.id);
        tx.upsert_role(&manager)?;
        tx.upsert_role(&member)?;

        if config.creator_joins_as_manager {
            tx.upsert_membership(&InitiativeMembership {
                initiative_id: initiative.id,
                principal_id: scope.principal().id,
                role_id: manager.id,
            })?;
        }
    }

    tracing::info!(
        initiative = %initiative.id,
        tenant = %initiative.tenant_id,
        "created initiative"
    );
    Ok(initiative)
}

/// Add a custom role at the end of the initiative's role order.
pub fn create_role(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    initiative: &InitiativeId,
    name: &str,
    is_manager: bool,
) -> Result<InitiativeRole> {
    let initiative = administered_initiative(&*tx, scope, initiative)?;
    validate_role_name(name)?;
    ensure_role_name_free(&*tx, &initiative.id, name)?;

    let position = tx
        .roles_in_initiative(&initiative.id)?
        .iter()
        .map(|r| r.position + 1)
        .max()
        .unwrap_or(0);

    let role = InitiativeRole::new(initiative.id, name, is_manager, position);
    tx.upsert_role(&role)?;
    tracing::info!(role = %role.id, initiative = %initiative.id, "created role");
    Ok(role)
}

pub fn rename_role(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    role: &RoleId,
    name: &str,
) -> Result<InitiativeRole> {
    let (mut role, initiative) = administered_role(&*tx, scope, role)?;
    ensure_custom(&role, "renamed")?;
    validate_role_name(name)?;
    if role.name == name {
        return Ok(role);
    }
    ensure_role_name_free(&*tx, &initiative.id, name)?;

    role.name = name.to_string();
    tx.upsert_role(&role)?;
    Ok(role)
}

pub fn set_role_manager(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    role: &RoleId,
    is_manager: bool,
) -> Result<InitiativeRole> {
    let (mut role, _) = administered_role(&*tx, scope, role)?;
    ensure_custom(&role, "changed")?;

    role.is_manager = is_manager;
    tx.upsert_role(&role)?;
    Ok(role)
}

/// Delete a custom role no member holds.
///
/// Its toggles and role grants go with it; any resource of the initiative
/// left without a reachable owner is repaired in the same transaction.
pub fn delete_role(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    role: &RoleId,
) -> Result<TransferReport> {
    let (role, initiative) = administered_role(&*tx, scope, role)?;
    ensure_custom(&role, "deleted")?;

    let holders = tx
        .memberships_in_initiative(&initiative.id)?
        .into_iter()
        .filter(|m| m.role_id == role.id)
        .count();
    if holders > 0 {
        return Err(EngineError::RoleInUse {
            role: role.id,
            members: holders,
        });
    }

    tx.delete_role(&role.id)?;
    let report = coordinator::repair(tx, &initiative.id)?;
    tracing::info!(role = %role.id, initiative = %initiative.id, "deleted role");
    Ok(report)
}

pub fn set_toggle(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    role: &RoleId,
    key: CapabilityKey,
    enabled: bool,
) -> Result<InitiativeRole> {
    let (mut role, _) = administered_role(&*tx, scope, role)?;

    tx.set_toggle(&RolePermissionToggle {
        role_id: role.id,
        capability: key,
        enabled,
    })?;
    role.set_toggle(key, enabled);

    tracing::info!(role = %role.id, key = key.as_str(), enabled, "set role toggle");
    Ok(role)
}

/// Roles of a reachable initiative, ordered by position.
pub fn list_roles(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    initiative: &InitiativeId,
) -> Result<Vec<InitiativeRole>> {
    let initiative = load_initiative(tx, scope, initiative)?;
    Ok(tx.roles_in_initiative(&initiative.id)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Initiative Memberships
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve `role` and check it belongs to `initiative`.
fn role_of(tx: &dyn StoreTx, initiative: &Initiative, role: &RoleId) -> Result<InitiativeRole> {
    let role = tx
        .get_role(role)?
        .ok_or_else(|| EngineError::NotFound(format!("role {}", role)))?;
    check_role_in_initiative(&role, initiative)?;
    Ok(role)
}

pub fn add_initiative_member(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    initiative: &InitiativeId,
    principal: &PrincipalId,
    role: &RoleId,
) -> Result<InitiativeMembership> {
    let initiative = administered_initiative(&*tx, scope, initiative)?;
    require_principal(&*tx, principal)?;

    if tx
        .get_tenant_membership(&initiative.tenant_id, principal)?
        .is_none()
    {
        return Err(EngineError::InvalidReference(format!(
            "principal {} is not a member of tenant {}",
            principal, initiative.tenant_id
        )));
    }
    let role = role_of(&*tx, &initiative, role)?;

    if tx.get_membership(&initiative.id, principal)?.is_some() {
        return Err(EngineError::Conflict(format!(
            "principal {} is already a member of initiative {}",
            principal, initiative.id
        )));
    }

    let membership = InitiativeMembership {
        initiative_id: initiative.id,
        principal_id: *principal,
        role_id: role.id,
    };
    tx.upsert_membership(&membership)?;
    tracing::info!(
        initiative = %initiative.id,
        principal = %principal,
        role = %role.name,
        "added initiative member"
    );
    Ok(membership)
}

/// Move a member to another role. Role-derived ownership may be lost, so
/// the initiative is repaired afterwards.
pub fn change_member_role(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    initiative: &InitiativeId,
    principal: &PrincipalId,
    role: &RoleId,
) -> Result<TransferReport> {
    let initiative = administered_initiative(&*tx, scope, initiative)?;
    let mut membership = tx
        .get_membership(&initiative.id, principal)?
        .ok_or_else(|| EngineError::NotFound(format!("membership of {}", principal)))?;
    let role = role_of(&*tx, &initiative, role)?;

    membership.role_id = role.id;
    tx.upsert_membership(&membership)?;
    coordinator::repair(tx, &initiative.id)
}

/// End a membership and transfer ownership.
///
/// Members may remove themselves; removing anyone else needs the rights to
/// administer the initiative.
pub fn remove_initiative_member(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    initiative: &InitiativeId,
    principal: &PrincipalId,
) -> Result<TransferReport> {
    let initiative = load_initiative(&*tx, scope, initiative)?;
    if *principal == scope.principal().id {
        ensure_active_tenant(scope, &initiative)?;
    } else {
        ensure_initiative_admin(&*tx, scope, &initiative)?;
    }

    if !tx.delete_membership(&initiative.id, principal)? {
        return Err(EngineError::NotFound(format!(
            "membership of {}",
            principal
        )));
    }
    coordinator::on_membership_removed(tx, &initiative.id, principal)
}

/// Run the ownership repair sweep over an initiative.
pub fn repair_ownership(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    initiative: &InitiativeId,
) -> Result<TransferReport> {
    let initiative = administered_initiative(&*tx, scope, initiative)?;
    coordinator::repair(tx, &initiative.id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Resources and Grants
// ─────────────────────────────────────────────────────────────────────────────

/// Create a resource; the caller becomes its owner.
///
/// Gated by the create toggle for `kind` in the caller's current role.
pub fn create_resource(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    initiative: &InitiativeId,
    kind: ResourceKind,
    name: &str,
) -> Result<Resource> {
    let initiative = load_initiative(&*tx, scope, initiative)?;
    ensure_active_tenant(scope, &initiative)?;
    validate_display_name(kind.as_str(), name)?;

    let key = CapabilityKey::for_create(kind);
    let role = tx.current_role(&initiative.id, &scope.principal().id)?;
    if !can(scope.principal(), role.as_ref(), key) {
        return Err(EngineError::FeatureDisabled(key));
    }

    let resource = Resource::new(kind, &initiative, name);
    tx.insert_resource(&resource)?;
    tx.upsert_user_grant(&ResourcePermission {
        resource_id: resource.id,
        principal_id: scope.principal().id,
        level: PermissionLevel::Owner,
        tenant_id: resource.tenant_id,
    })?;

    tracing::info!(
        resource = %resource.id,
        kind = kind.as_str(),
        creator = %scope.principal().id,
        "created resource"
    );
    Ok(resource)
}

pub fn delete_resource(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    resource: &ResourceId,
) -> Result<()> {
    authorize(&*tx, scope, resource, PermissionLevel::Owner)?;
    tx.delete_resource(resource)?;
    tracing::info!(resource = %resource, "deleted resource");
    Ok(())
}

/// Set `principal`'s direct grant on a resource the caller owns.
pub fn grant_user(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    resource: &ResourceId,
    principal: &PrincipalId,
    level: PermissionLevel,
) -> Result<ResourcePermission> {
    let (acl, _) = authorize(&*tx, scope, resource, PermissionLevel::Owner)?;
    let tenant_id = acl.resource().tenant_id;
    require_principal(&*tx, principal)?;

    if tx.get_tenant_membership(&tenant_id, principal)?.is_none() {
        return Err(EngineError::InvalidReference(format!(
            "principal {} is not a member of tenant {}",
            principal, tenant_id
        )));
    }

    let mut after = acl.clone();
    after.apply_user_grant(*principal, level);
    ensure_owner_remains(&*tx, &acl, &after)?;

    let grant = ResourcePermission {
        resource_id: *resource,
        principal_id: *principal,
        level,
        tenant_id,
    };
    tx.upsert_user_grant(&grant)?;
    tracing::info!(
        resource = %resource,
        principal = %principal,
        level = level.as_str(),
        "granted user permission"
    );
    Ok(grant)
}

/// Remove `principal`'s direct grant. Returns whether one existed.
pub fn revoke_user(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    resource: &ResourceId,
    principal: &PrincipalId,
) -> Result<bool> {
    let (acl, _) = authorize(&*tx, scope, resource, PermissionLevel::Owner)?;

    let mut after = acl.clone();
    if after.revoke_user(principal).is_none() {
        return Ok(false);
    }
    ensure_owner_remains(&*tx, &acl, &after)?;

    tx.delete_user_grant(resource, principal)?;
    tracing::info!(resource = %resource, principal = %principal, "revoked user permission");
    Ok(true)
}

/// Grant `level` on a resource to every holder of `role`.
pub fn grant_role(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    resource: &ResourceId,
    role: &RoleId,
    level: PermissionLevel,
) -> Result<ResourceRolePermission> {
    let (acl, _) = authorize(&*tx, scope, resource, PermissionLevel::Owner)?;
    let role = tx
        .get_role(role)?
        .ok_or_else(|| EngineError::NotFound(format!("role {}", role)))?;
    check_role_on_resource(&role, acl.resource())?;

    let mut after = acl.clone();
    after.apply_role_grant(role.id, level);
    ensure_owner_remains(&*tx, &acl, &after)?;

    let grant = ResourceRolePermission {
        resource_id: *resource,
        role_id: role.id,
        level,
        tenant_id: acl.resource().tenant_id,
    };
    tx.upsert_role_grant(&grant)?;
    tracing::info!(
        resource = %resource,
        role = %role.name,
        level = level.as_str(),
        "granted role permission"
    );
    Ok(grant)
}

/// Remove a role grant. Returns whether one existed.
pub fn revoke_role(
    tx: &mut dyn StoreTx,
    scope: &TenantScopedHandle,
    resource: &ResourceId,
    role: &RoleId,
) -> Result<bool> {
    let (acl, _) = authorize(&*tx, scope, resource, PermissionLevel::Owner)?;

    let mut after = acl.clone();
    if after.revoke_role(role).is_none() {
        return Ok(false);
    }
    ensure_owner_remains(&*tx, &acl, &after)?;

    tx.delete_role_grant(resource, role)?;
    tracing::info!(resource = %resource, role = %role, "revoked role permission");
    Ok(true)
}
