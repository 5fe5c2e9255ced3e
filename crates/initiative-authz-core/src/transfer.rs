//! Ownership transfer planning.
//!
//! When a principal leaves an initiative, their direct `owner` grants there
//! are dropped and every remaining manager is made an owner of the affected
//! resources. Planning is pure: it reads ACLs and the current membership and
//! returns the row changes to apply. The store applies them inside the same
//! transaction that removed the membership.
//!
//! Ensuring managers own a resource only ever raises grants, so applying a
//! plan and planning again yields an empty plan.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::level::PermissionLevel;
use crate::resolve::ResourceAcl;
use crate::types::{InitiativeId, PrincipalId, ResourceId, RoleId, TenantId};

/// A resource left with no reachable owner because its initiative has no
/// manager to absorb ownership. Needs manual reassignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerlessResourceWarning {
    pub resource_id: ResourceId,
    pub initiative_id: InitiativeId,
    pub tenant_id: TenantId,
}

/// Row changes produced by the planner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    /// Direct `owner` grants of the leaving principal to delete.
    pub revoke: Vec<(ResourceId, PrincipalId)>,

    /// Direct grants to set to `owner`.
    pub grant_owner: Vec<(ResourceId, PrincipalId)>,

    /// Resources nobody could be made owner of.
    pub ownerless: Vec<OwnerlessResourceWarning>,
}

impl TransferPlan {
    /// Whether applying this plan would change any row.
    pub fn is_noop(&self) -> bool {
        self.revoke.is_empty() && self.grant_owner.is_empty()
    }
}

/// Members holding a manager role.
pub fn managers(
    members: &BTreeMap<PrincipalId, RoleId>,
    manager_roles: &BTreeSet<RoleId>,
) -> BTreeSet<PrincipalId> {
    members
        .iter()
        .filter(|(_, role)| manager_roles.contains(role))
        .map(|(principal, _)| *principal)
        .collect()
}

/// Plan the transfer after `removed` left the initiative.
///
/// `acls` are the initiative's resources; `members` is the membership
/// *after* removal.
pub fn plan_membership_removal(
    removed: &PrincipalId,
    acls: &[ResourceAcl],
    members: &BTreeMap<PrincipalId, RoleId>,
    manager_roles: &BTreeSet<RoleId>,
) -> TransferPlan {
    let mut plan = TransferPlan::default();
    let mut managers = managers(members, manager_roles);
    managers.remove(removed);

    for acl in acls {
        if acl.direct_level(removed) != Some(PermissionLevel::Owner) {
            continue;
        }

        let mut after = acl.clone();
        after.revoke_user(removed);
        plan.revoke.push((acl.resource().id, *removed));

        ensure_managers_own(&after, &managers, members, &mut plan);
    }

    plan
}

/// Plan a repair sweep: every resource with no reachable owner gets every
/// manager as owner.
pub fn plan_repair(
    acls: &[ResourceAcl],
    members: &BTreeMap<PrincipalId, RoleId>,
    manager_roles: &BTreeSet<RoleId>,
) -> TransferPlan {
    let mut plan = TransferPlan::default();
    let managers = managers(members, manager_roles);

    for acl in acls {
        if acl.owners(members).is_empty() {
            ensure_managers_own(acl, &managers, members, &mut plan);
        }
    }

    plan
}

fn ensure_managers_own(
    acl: &ResourceAcl,
    managers: &BTreeSet<PrincipalId>,
    members: &BTreeMap<PrincipalId, RoleId>,
    plan: &mut TransferPlan,
) {
    let resource = acl.resource();

    for manager in managers {
        // Never downgrade: only write when the direct grant is below owner.
        if acl.direct_level(manager) != Some(PermissionLevel::Owner) {
            plan.grant_owner.push((resource.id, *manager));
        }
    }

    if managers.is_empty() && acl.owners(members).is_empty() {
        plan.ownerless.push(OwnerlessResourceWarning {
            resource_id: resource.id,
            initiative_id: resource.initiative_id,
            tenant_id: resource.tenant_id,
        });
    }
}

/// Apply `plan` to in-memory ACLs. Stores apply the same rows to their
/// tables; this keeps the two in step for tests and for callers working on
/// snapshots.
pub fn apply_plan(acls: &mut [ResourceAcl], plan: &TransferPlan) {
    for acl in acls.iter_mut() {
        let id = acl.resource().id;
        for (resource, principal) in &plan.revoke {
            if *resource == id {
                acl.revoke_user(principal);
            }
        }
        for (resource, principal) in &plan.grant_owner {
            if *resource == id {
                acl.apply_user_grant(*principal, PermissionLevel::Owner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Initiative, Resource, ResourceKind};

    struct Setup {
        acls: Vec<ResourceAcl>,
        leaver: PrincipalId,
        pm: PrincipalId,
        writer: PrincipalId,
        pm_role: RoleId,
        member_role: RoleId,
    }

    fn setup() -> Setup {
        let initiative = Initiative::new(TenantId::generate(), "ops");
        let leaver = PrincipalId::generate();
        let pm = PrincipalId::generate();
        let writer = PrincipalId::generate();

        let mut owned = ResourceAcl::new(Resource::new(ResourceKind::Project, &initiative, "a"));
        owned.apply_user_grant(leaver, PermissionLevel::Owner);
        owned.apply_user_grant(writer, PermissionLevel::Write);

        let mut untouched =
            ResourceAcl::new(Resource::new(ResourceKind::Document, &initiative, "b"));
        untouched.apply_user_grant(leaver, PermissionLevel::Write);
        untouched.apply_user_grant(writer, PermissionLevel::Owner);

        Setup {
            acls: vec![owned, untouched],
            leaver,
            pm,
            writer,
            pm_role: RoleId::generate(),
            member_role: RoleId::generate(),
        }
    }

    #[test]
    fn test_owner_grants_move_to_managers() {
        let s = setup();
        let members = BTreeMap::from([(s.pm, s.pm_role), (s.writer, s.member_role)]);
        let manager_roles = BTreeSet::from([s.pm_role]);

        let plan = plan_membership_removal(&s.leaver, &s.acls, &members, &manager_roles);

        let owned_id = s.acls[0].resource().id;
        assert_eq!(plan.revoke, vec![(owned_id, s.leaver)]);
        assert_eq!(plan.grant_owner, vec![(owned_id, s.pm)]);
        assert!(plan.ownerless.is_empty());
    }

    #[test]
    fn test_non_owner_grants_are_kept() {
        let mut s = setup();
        let members = BTreeMap::from([(s.pm, s.pm_role)]);
        let manager_roles = BTreeSet::from([s.pm_role]);

        let plan = plan_membership_removal(&s.leaver, &s.acls, &members, &manager_roles);
        apply_plan(&mut s.acls, &plan);

        assert_eq!(
            s.acls[1].direct_level(&s.leaver),
            Some(PermissionLevel::Write)
        );
        assert_eq!(s.acls[0].direct_level(&s.leaver), None);
        assert_eq!(
            s.acls[0].direct_level(&s.pm),
            Some(PermissionLevel::Owner)
        );
    }

    #[test]
    fn test_manager_lower_grant_is_raised_not_duplicated() {
        let mut s = setup();
        s.acls[0].apply_user_grant(s.pm, PermissionLevel::Read);
        let members = BTreeMap::from([(s.pm, s.pm_role)]);
        let manager_roles = BTreeSet::from([s.pm_role]);

        let plan = plan_membership_removal(&s.leaver, &s.acls, &members, &manager_roles);
        assert_eq!(plan.grant_owner.len(), 1);

        apply_plan(&mut s.acls, &plan);
        assert_eq!(
            s.acls[0].direct_level(&s.pm),
            Some(PermissionLevel::Owner)
        );
    }

    #[test]
    fn test_no_managers_surfaces_warning() {
        let s = setup();
        let members = BTreeMap::from([(s.writer, s.member_role)]);
        let manager_roles = BTreeSet::from([s.pm_role]);

        let plan = plan_membership_removal(&s.leaver, &s.acls, &members, &manager_roles);

        assert!(plan.grant_owner.is_empty());
        assert_eq!(plan.ownerless.len(), 1);
        assert_eq!(plan.ownerless[0].resource_id, s.acls[0].resource().id);
    }

    #[test]
    fn test_no_warning_when_another_owner_remains() {
        let mut s = setup();
        s.acls[0].apply_user_grant(s.writer, PermissionLevel::Owner);
        let members = BTreeMap::from([(s.writer, s.member_role)]);
        let manager_roles = BTreeSet::from([s.pm_role]);

        let plan = plan_membership_removal(&s.leaver, &s.acls, &members, &manager_roles);
        assert!(plan.ownerless.is_empty());
    }

    #[test]
    fn test_removal_is_idempotent() {
        let mut s = setup();
        let members = BTreeMap::from([(s.pm, s.pm_role), (s.writer, s.member_role)]);
        let manager_roles = BTreeSet::from([s.pm_role]);

        let first = plan_membership_removal(&s.leaver, &s.acls, &members, &manager_roles);
        apply_plan(&mut s.acls, &first);
        let after_once = s.acls.clone();

        let second = plan_membership_removal(&s.leaver, &s.acls, &members, &manager_roles);
        assert!(second.is_noop());
        apply_plan(&mut s.acls, &second);
        assert_eq!(s.acls, after_once);
    }

    #[test]
    fn test_repair_only_touches_ownerless() {
        let mut s = setup();
        s.acls[0].revoke_user(&s.leaver);
        let members = BTreeMap::from([(s.pm, s.pm_role)]);
        let manager_roles = BTreeSet::from([s.pm_role]);

        let plan = plan_repair(&s.acls, &members, &manager_roles);
        assert_eq!(plan.grant_owner, vec![(s.acls[0].resource().id, s.pm)]);

        apply_plan(&mut s.acls, &plan);
        assert!(plan_repair(&s.acls, &members, &manager_roles).is_noop());
    }
}
