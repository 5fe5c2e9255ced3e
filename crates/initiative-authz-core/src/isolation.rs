//! Tenant isolation filter.
//!
//! Isolation is the mandatory layer evaluated before any discretionary
//! check. It is expressed as a capability: a [`TenantScopedHandle`] can only
//! be obtained by validating a claimed `(principal, active tenant)` pair
//! against stored membership rows, and every data-access path in the engine
//! takes one.
//!
//! Reads may span every tenant the principal belongs to when global read
//! mode is in effect. Mutations are always confined to the active tenant.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::level::TenantRole;
use crate::model::{
    Initiative, Principal, Resource, ResourcePermission, ResourceRolePermission, TenantMembership,
};
use crate::types::TenantId;

/// How far reads may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Only the active tenant.
    #[default]
    ActiveTenant,
    /// Every tenant the principal holds a membership in.
    Global,
}

/// Anything carrying a (possibly denormalized) tenant id.
pub trait TenantScoped {
    fn tenant_id(&self) -> &TenantId;
}

impl TenantScoped for Resource {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for Initiative {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for ResourcePermission {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for ResourceRolePermission {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

/// Which tenants a listing may draw from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadScope {
    /// Superadmin: no tenant restriction.
    All,
    /// Exactly these tenants.
    Tenants(BTreeSet<TenantId>),
}

impl ReadScope {
    pub fn contains(&self, tenant: &TenantId) -> bool {
        match self {
            ReadScope::All => true,
            ReadScope::Tenants(set) => set.contains(tenant),
        }
    }
}

/// A validated tenant context.
///
/// Holding one proves the principal was loaded from the store and either
/// belongs to the active tenant or is a superadmin.
#[derive(Debug, Clone)]
pub struct TenantScopedHandle {
    principal: Principal,
    active_tenant: TenantId,

    /// Role in the active tenant. `None` only for a superadmin without a
    /// membership row there.
    active_role: Option<TenantRole>,

    /// Every tenant the principal holds a membership in.
    member_tenants: BTreeSet<TenantId>,

    read_mode: ReadMode,
}

impl TenantScopedHandle {
    /// Validate a claimed active tenant against the principal's stored
    /// memberships.
    ///
    /// Membership rows for other principals are ignored. A principal who is
    /// neither a member of `active_tenant` nor a superadmin gets
    /// `CoreError::NotFound`, the same answer as for a tenant that does not
    /// exist.
    pub fn validate(
        principal: Principal,
        active_tenant: TenantId,
        memberships: &[TenantMembership],
        read_mode: ReadMode,
    ) -> Result<Self> {
        let own: Vec<&TenantMembership> = memberships
            .iter()
            .filter(|m| m.principal_id == principal.id)
            .collect();

        let active_role = own
            .iter()
            .find(|m| m.tenant_id == active_tenant)
            .map(|m| m.role);

        if active_role.is_none() && !principal.is_superadmin() {
            return Err(CoreError::NotFound(format!("tenant {}", active_tenant)));
        }

        Ok(Self {
            member_tenants: own.iter().map(|m| m.tenant_id).collect(),
            principal,
            active_tenant,
            active_role,
            read_mode,
        })
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn active_tenant(&self) -> &TenantId {
        &self.active_tenant
    }

    pub fn active_role(&self) -> Option<TenantRole> {
        self.active_role
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    pub fn is_superadmin(&self) -> bool {
        self.principal.is_superadmin()
    }

    /// Tenant administrator of the active tenant.
    ///
    /// Grants tenant-administrative operations only; it confers no level on
    /// any resource.
    pub fn is_tenant_admin(&self) -> bool {
        self.active_role.map(|r| r.is_admin()).unwrap_or(false)
    }

    /// Tenant admin or superadmin.
    pub fn can_administer(&self) -> bool {
        self.is_tenant_admin() || self.is_superadmin()
    }

    /// Whether rows of `tenant` may be observed at all.
    pub fn can_observe(&self, tenant: &TenantId) -> bool {
        if *tenant == self.active_tenant || self.is_superadmin() {
            return true;
        }
        self.read_mode == ReadMode::Global && self.member_tenants.contains(tenant)
    }

    /// Whether `item` is reachable under this context.
    pub fn is_reachable<T: TenantScoped>(&self, item: &T) -> bool {
        self.can_observe(item.tenant_id())
    }

    /// Whether `item` may be mutated under this context.
    ///
    /// Always the active tenant only, regardless of read mode.
    pub fn can_mutate<T: TenantScoped>(&self, item: &T) -> bool {
        *item.tenant_id() == self.active_tenant
    }

    /// Keep the reachable subset of `items`.
    pub fn filter_reachable<T, I>(&self, items: I) -> Vec<T>
    where
        T: TenantScoped,
        I: IntoIterator<Item = T>,
    {
        items
            .into_iter()
            .filter(|item| self.is_reachable(item))
            .collect()
    }

    /// Turn a lookup result into a reachable item or `NotFound`.
    ///
    /// A missing row and an unreachable row produce the same error, built
    /// only from `what` and `id`.
    pub fn reveal<T: TenantScoped>(
        &self,
        item: Option<T>,
        what: &str,
        id: impl fmt::Display,
    ) -> Result<T> {
        match item {
            Some(item) if self.is_reachable(&item) => Ok(item),
            _ => Err(CoreError::NotFound(format!("{} {}", what, id))),
        }
    }

    /// Tenants a listing under this context may draw from.
    pub fn read_scope(&self) -> ReadScope {
        if self.is_superadmin() {
            return ReadScope::All;
        }
        let mut tenants = BTreeSet::from([self.active_tenant]);
        if self.read_mode == ReadMode::Global {
            tenants.extend(self.member_tenants.iter().copied());
        }
        ReadScope::Tenants(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::PlatformRole;
    use crate::model::ResourceKind;
    use crate::types::ResourceId;

    struct World {
        t1: TenantId,
        t2: TenantId,
        user: Principal,
        memberships: Vec<TenantMembership>,
    }

    fn world() -> World {
        let t1 = TenantId::generate();
        let t2 = TenantId::generate();
        let user = Principal::new("uma", PlatformRole::Member);
        let memberships = vec![
            TenantMembership {
                tenant_id: t1,
                principal_id: user.id,
                role: TenantRole::Member,
            },
            TenantMembership {
                tenant_id: t2,
                principal_id: user.id,
                role: TenantRole::Admin,
            },
        ];
        World {
            t1,
            t2,
            user,
            memberships,
        }
    }

    fn resource_in(tenant: TenantId) -> Resource {
        Resource::new(ResourceKind::Document, &Initiative::new(tenant, "i"), "doc")
    }

    #[test]
    fn test_non_member_cannot_open_tenant() {
        let w = world();
        let stranger = TenantId::generate();
        let err = TenantScopedHandle::validate(
            w.user.clone(),
            stranger,
            &w.memberships,
            ReadMode::ActiveTenant,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_other_principals_rows_are_ignored() {
        let w = world();
        let imposter = Principal::new("ivan", PlatformRole::Member);
        let result =
            TenantScopedHandle::validate(imposter, w.t1, &w.memberships, ReadMode::ActiveTenant);
        assert!(result.is_err());
    }

    #[test]
    fn test_active_tenant_only_by_default() {
        let w = world();
        let handle =
            TenantScopedHandle::validate(w.user, w.t1, &w.memberships, ReadMode::ActiveTenant)
                .unwrap();

        assert!(handle.is_reachable(&resource_in(w.t1)));
        assert!(!handle.is_reachable(&resource_in(w.t2)));
        assert!(!handle.is_tenant_admin());
    }

    #[test]
    fn test_global_reads_are_broad_but_writes_narrow() {
        let w = world();
        let handle =
            TenantScopedHandle::validate(w.user, w.t1, &w.memberships, ReadMode::Global).unwrap();
        let foreign = resource_in(w.t2);

        assert!(handle.is_reachable(&foreign));
        assert!(!handle.can_mutate(&foreign));
        assert!(handle.can_mutate(&resource_in(w.t1)));
        assert!(!handle.is_reachable(&resource_in(TenantId::generate())));
    }

    #[test]
    fn test_superadmin_reaches_everything() {
        let w = world();
        let root = Principal::new("root", PlatformRole::Admin);
        let handle =
            TenantScopedHandle::validate(root, w.t1, &[], ReadMode::ActiveTenant).unwrap();

        assert!(handle.is_reachable(&resource_in(TenantId::generate())));
        assert_eq!(handle.read_scope(), ReadScope::All);
        assert_eq!(handle.active_role(), None);
        assert!(handle.can_administer());
    }

    #[test]
    fn test_missing_and_unreachable_are_indistinguishable() {
        let w = world();
        let handle =
            TenantScopedHandle::validate(w.user, w.t1, &w.memberships, ReadMode::ActiveTenant)
                .unwrap();
        let foreign = resource_in(w.t2);
        let id = foreign.id;

        let hidden = handle.reveal(Some(foreign), "resource", id).unwrap_err();
        let missing = handle.reveal(None::<Resource>, "resource", id).unwrap_err();
        assert_eq!(hidden, missing);

        let other = ResourceId::generate();
        assert_ne!(
            handle.reveal(None::<Resource>, "resource", other).unwrap_err(),
            missing
        );
    }

    #[test]
    fn test_filter_reachable() {
        let w = world();
        let handle =
            TenantScopedHandle::validate(w.user, w.t2, &w.memberships, ReadMode::ActiveTenant)
                .unwrap();
        let items = vec![resource_in(w.t1), resource_in(w.t2), resource_in(w.t2)];

        let visible = handle.filter_reachable(items);
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|r| r.tenant_id == w.t2));
        assert!(handle.is_tenant_admin());
    }
}
