//! Read-side decisions.
//!
//! Every function takes a validated [`TenantScopedHandle`]; isolation is
//! checked before any grant is looked at, and an unreachable row is reported
//! exactly like a missing one.

use std::collections::{BTreeMap, BTreeSet};

use initiative_authz_core::{
    can, require, CapabilityKey, Initiative, InitiativeId, PermissionLevel, ReadScope, Resource,
    ResourceAcl, ResourceId, RoleId, TenantId, TenantScopedHandle,
};
use initiative_authz_store::StoreTx;

use crate::error::{EngineError, Result};

pub(crate) fn load_resource(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    id: &ResourceId,
) -> Result<Resource> {
    Ok(scope.reveal(tx.get_resource(id)?, "resource", id)?)
}

pub(crate) fn load_initiative(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    id: &InitiativeId,
) -> Result<Initiative> {
    Ok(scope.reveal(tx.get_initiative(id)?, "initiative", id)?)
}

/// The resource's grants and the role the caller currently holds in its
/// initiative.
fn load_acl(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    resource: Resource,
) -> Result<(ResourceAcl, Option<RoleId>)> {
    let role = tx
        .get_membership(&resource.initiative_id, &scope.principal().id)?
        .map(|m| m.role_id);
    Ok((tx.load_acl(resource)?, role))
}

/// Resolve the caller's level on a resource and require `minimum`.
///
/// Anything above `read` also requires the resource to live in the active
/// tenant; a resource only visible through global read mode is denied with
/// the caller's actual level.
pub(crate) fn authorize(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    id: &ResourceId,
    minimum: PermissionLevel,
) -> Result<(ResourceAcl, PermissionLevel)> {
    let resource = load_resource(tx, scope, id)?;
    let mutable = scope.can_mutate(&resource);
    let (acl, role) = load_acl(tx, scope, resource)?;
    let principal = scope.principal().id;

    if minimum.is_mutation() && !mutable {
        return Err(EngineError::AccessDenied {
            required: minimum,
            effective: acl.resolve(&principal, role.as_ref()),
        });
    }

    let level = require(&acl, &principal, role.as_ref(), minimum)?;
    Ok((acl, level))
}

/// Effective level of the caller on `id`, or `None` for no access.
pub fn resolve_permission(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    id: &ResourceId,
) -> Result<Option<PermissionLevel>> {
    let resource = load_resource(tx, scope, id)?;
    let (acl, role) = load_acl(tx, scope, resource)?;
    let level = acl.resolve(&scope.principal().id, role.as_ref());

    tracing::debug!(
        resource = %id,
        principal = %scope.principal().id,
        level = level.map(|l| l.as_str()).unwrap_or("none"),
        "resolved permission"
    );
    Ok(level)
}

/// Fail with `AccessDenied` unless the caller's level is at least `minimum`.
pub fn require_permission(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    id: &ResourceId,
    minimum: PermissionLevel,
) -> Result<PermissionLevel> {
    let result = authorize(tx, scope, id, minimum).map(|(_, level)| level);
    if let Err(EngineError::AccessDenied { effective, .. }) = &result {
        tracing::debug!(
            resource = %id,
            principal = %scope.principal().id,
            required = minimum.as_str(),
            effective = effective.map(|l| l.as_str()).unwrap_or("none"),
            "permission denied"
        );
    }
    result
}

/// Feature toggle check for the caller in `initiative`.
///
/// Platform admins pass without a lookup. Everyone else needs the
/// initiative to be reachable.
pub fn can_use_feature(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    initiative: &InitiativeId,
    key: CapabilityKey,
) -> Result<bool> {
    if scope.is_superadmin() {
        return Ok(true);
    }

    let initiative = load_initiative(tx, scope, initiative)?;
    let role = tx.current_role(&initiative.id, &scope.principal().id)?;
    Ok(can(scope.principal(), role.as_ref(), key))
}

/// Every resource the caller may observe, before any DAC check.
pub(crate) fn reachable_resources(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
) -> Result<Vec<Resource>> {
    let candidates = match scope.read_scope() {
        ReadScope::All => tx.all_resources()?,
        ReadScope::Tenants(tenants) => {
            let tenants: Vec<TenantId> = tenants.into_iter().collect();
            tx.resources_in_tenants(&tenants)?
        }
    };
    Ok(scope.filter_reachable(candidates))
}

/// Ids of every reachable resource. Says nothing about grants.
pub fn list_reachable(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
) -> Result<BTreeSet<ResourceId>> {
    Ok(reachable_resources(tx, scope)?
        .into_iter()
        .map(|r| r.id)
        .collect())
}

/// Reachable resources on which the caller's level is at least `minimum`.
pub fn list_accessible(
    tx: &dyn StoreTx,
    scope: &TenantScopedHandle,
    minimum: PermissionLevel,
) -> Result<Vec<(Resource, PermissionLevel)>> {
    let principal = scope.principal().id;
    let roles: BTreeMap<InitiativeId, RoleId> = tx
        .memberships_of(&principal)?
        .into_iter()
        .map(|m| (m.initiative_id, m.role_id))
        .collect();

    let mut out = Vec::new();
    for resource in reachable_resources(tx, scope)? {
        let role = roles.get(&resource.initiative_id).copied();
        let acl = tx.load_acl(resource)?;
        if let Some(level) = acl.resolve(&principal, role.as_ref()) {
            if level.satisfies(minimum) {
                out.push((acl.resource().clone(), level));
            }
        }
    }
    Ok(out)
}
