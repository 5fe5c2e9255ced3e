//! Ownership Transfer Coordinator.
//!
//! Runs inside the caller's transaction whenever a membership ends or a role
//! change can strand a resource. Planning is delegated to the pure planner in
//! the core crate; this module loads its inputs and writes its output rows.

use std::collections::BTreeSet;

use initiative_authz_core::{
    apply_plan, plan_membership_removal, plan_repair, InitiativeId, OwnerlessResourceWarning,
    PermissionLevel, PrincipalId, ResourceAcl, ResourceId, ResourcePermission, TenantId,
    TransferPlan,
};
use initiative_authz_store::StoreTx;
use serde::Serialize;

use crate::error::Result;

/// Rows changed by one coordinator run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    /// Owner grants deleted from the departing principal.
    pub revoked: Vec<(ResourceId, PrincipalId)>,

    /// Managers raised to a direct `owner` grant.
    pub granted: Vec<(ResourceId, PrincipalId)>,

    /// Resources nobody could be made owner of.
    pub ownerless: Vec<OwnerlessResourceWarning>,
}

impl TransferReport {
    /// Whether the run changed no rows and raised no warnings.
    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty() && self.granted.is_empty() && self.ownerless.is_empty()
    }

    pub(crate) fn merge(&mut self, other: TransferReport) {
        self.revoked.extend(other.revoked);
        self.granted.extend(other.granted);
        self.ownerless.extend(other.ownerless);
    }
}

fn tenant_of(tx: &dyn StoreTx, initiative: &InitiativeId) -> Result<Option<TenantId>> {
    Ok(tx.get_initiative(initiative)?.map(|i| i.tenant_id))
}

fn load_acls(tx: &dyn StoreTx, initiative: &InitiativeId) -> Result<Vec<ResourceAcl>> {
    tx.resources_in_initiative(initiative)?
        .into_iter()
        .map(|resource| Ok(tx.load_acl(resource)?))
        .collect()
}

/// Called after `removed`'s membership row in `initiative` has been deleted.
///
/// Drops their direct owner grants there, makes every remaining manager an
/// owner of the affected resources, then repairs any other resource that
/// lost its last reachable owner along with the membership. Running it again
/// changes nothing.
pub fn on_membership_removed(
    tx: &mut dyn StoreTx,
    initiative: &InitiativeId,
    removed: &PrincipalId,
) -> Result<TransferReport> {
    let Some(tenant_id) = tenant_of(&*tx, initiative)? else {
        return Ok(TransferReport::default());
    };
    let mut acls = load_acls(&*tx, initiative)?;
    let members = tx.member_roles(initiative)?;
    let manager_roles = tx.manager_roles(initiative)?;

    let plan = plan_membership_removal(removed, &acls, &members, &manager_roles);
    apply_plan(&mut acls, &plan);

    let touched: BTreeSet<ResourceId> = plan.revoke.iter().map(|(r, _)| *r).collect();
    let rest: Vec<ResourceAcl> = acls
        .into_iter()
        .filter(|acl| !touched.contains(&acl.resource().id))
        .collect();
    let sweep = plan_repair(&rest, &members, &manager_roles);

    let mut report = write_plan(tx, tenant_id, plan)?;
    report.merge(write_plan(tx, tenant_id, sweep)?);

    tracing::info!(
        initiative = %initiative,
        principal = %removed,
        revoked = report.revoked.len(),
        granted = report.granted.len(),
        "ownership transferred after membership removal"
    );
    Ok(report)
}

/// Called after `removed`'s tenant membership row has been deleted.
///
/// Ends their membership in every initiative of `tenant` and drops every
/// direct grant they hold there, including grants in initiatives they never
/// joined. Owner grants go through [`on_membership_removed`] so managers
/// absorb them; lower grants are deleted so rejoining the tenant starts
/// from nothing.
pub fn on_tenant_exit(
    tx: &mut dyn StoreTx,
    tenant: &TenantId,
    removed: &PrincipalId,
) -> Result<TransferReport> {
    let mut report = TransferReport::default();

    for initiative in tx.initiatives_in_tenant(tenant)? {
        let was_member = tx.delete_membership(&initiative.id, removed)?;
        let held: Vec<ResourceId> = load_acls(&*tx, &initiative.id)?
            .iter()
            .filter(|acl| acl.direct_level(removed).is_some())
            .map(|acl| acl.resource().id)
            .collect();

        if !was_member && held.is_empty() {
            continue;
        }
        report.merge(on_membership_removed(tx, &initiative.id, removed)?);

        let mut dropped = 0usize;
        for resource in &held {
            if tx.delete_user_grant(resource, removed)? {
                dropped += 1;
            }
        }
        tracing::debug!(
            initiative = %initiative.id,
            principal = %removed,
            dropped,
            "dropped remaining direct grants on tenant exit"
        );
    }

    Ok(report)
}

/// Give every manager ownership of each resource in `initiative` that has
/// no reachable owner. Idempotent.
pub fn repair(tx: &mut dyn StoreTx, initiative: &InitiativeId) -> Result<TransferReport> {
    let Some(tenant_id) = tenant_of(&*tx, initiative)? else {
        return Ok(TransferReport::default());
    };
    let acls = load_acls(&*tx, initiative)?;
    let members = tx.member_roles(initiative)?;
    let manager_roles = tx.manager_roles(initiative)?;

    let plan = plan_repair(&acls, &members, &manager_roles);
    write_plan(tx, tenant_id, plan)
}

fn write_plan(
    tx: &mut dyn StoreTx,
    tenant_id: TenantId,
    plan: TransferPlan,
) -> Result<TransferReport> {
    for (resource, principal) in &plan.revoke {
        tx.delete_user_grant(resource, principal)?;
    }

    for (resource, principal) in &plan.grant_owner {
        tx.upsert_user_grant(&ResourcePermission {
            resource_id: *resource,
            principal_id: *principal,
            level: PermissionLevel::Owner,
            tenant_id,
        })?;
    }

    for warning in &plan.ownerless {
        tracing::warn!(
            resource = %warning.resource_id,
            initiative = %warning.initiative_id,
            "resource left without an owner and no manager to absorb it"
        );
    }

    Ok(TransferReport {
        revoked: plan.revoke,
        granted: plan.grant_owner,
        ownerless: plan.ownerless,
    })
}
