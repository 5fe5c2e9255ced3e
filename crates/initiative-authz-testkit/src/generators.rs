//! Proptest generators for property-based testing.

use proptest::prelude::*;

use initiative_authz_core::{
    CapabilityKey, Initiative, InitiativeId, InitiativeRole, PermissionLevel, PrincipalId,
    Resource, ResourceAcl, ResourceKind, RoleId, TenantId,
};

/// Generate a PermissionLevel.
pub fn permission_level() -> impl Strategy<Value = PermissionLevel> {
    prop_oneof![
        Just(PermissionLevel::Read),
        Just(PermissionLevel::Write),
        Just(PermissionLevel::Owner),
    ]
}

/// Generate an optional grant level.
pub fn grant() -> impl Strategy<Value = Option<PermissionLevel>> {
    prop::option::of(permission_level())
}

/// Generate a CapabilityKey.
pub fn capability_key() -> impl Strategy<Value = CapabilityKey> {
    prop::sample::select(CapabilityKey::ALL.to_vec())
}

/// Generate a ResourceKind.
pub fn resource_kind() -> impl Strategy<Value = ResourceKind> {
    prop_oneof![
        Just(ResourceKind::Project),
        Just(ResourceKind::Document),
        Just(ResourceKind::Queue),
    ]
}

pub fn principal_id() -> impl Strategy<Value = PrincipalId> {
    any::<[u8; 16]>().prop_map(PrincipalId::from_bytes)
}

pub fn role_id() -> impl Strategy<Value = RoleId> {
    any::<[u8; 16]>().prop_map(RoleId::from_bytes)
}

/// Generate a role name accepted by the registry.
pub fn role_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,23}"
        .prop_filter("built-in names are reserved", |name| {
            name != "member" && name != "project_manager"
        })
}

/// Generate a role with an arbitrary set of stored toggles.
pub fn role_with_toggles() -> impl Strategy<Value = InitiativeRole> {
    (
        any::<bool>(),
        prop::collection::vec((capability_key(), any::<bool>()), 0..6),
    )
        .prop_map(|(is_manager, toggles)| {
            let mut role =
                InitiativeRole::new(InitiativeId::generate(), "generated", is_manager, 2);
            for (key, enabled) in toggles {
                role.set_toggle(key, enabled);
            }
            role
        })
}

/// Parameters for one principal's view of one resource.
///
/// The subject may hold a direct grant and may hold a role that carries a
/// role grant. Other principals and roles get unrelated grants.
#[derive(Debug, Clone)]
pub struct AclParams {
    pub direct: Option<PermissionLevel>,
    pub via_role: Option<PermissionLevel>,
    pub holds_role: bool,
    pub other_users: Vec<PermissionLevel>,
    pub other_roles: Vec<PermissionLevel>,
}

impl Arbitrary for AclParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            grant(),
            grant(),
            any::<bool>(),
            prop::collection::vec(permission_level(), 0..8),
            prop::collection::vec(permission_level(), 0..4),
        )
            .prop_map(
                |(direct, via_role, holds_role, other_users, other_roles)| AclParams {
                    direct,
                    via_role,
                    holds_role,
                    other_users,
                    other_roles,
                },
            )
            .boxed()
    }
}

impl AclParams {
    /// What resolution must return for the subject.
    pub fn expected(&self) -> Option<PermissionLevel> {
        let derived = if self.holds_role { self.via_role } else { None };
        self.direct.max(derived)
    }
}

/// An ACL built from [`AclParams`].
#[derive(Debug, Clone)]
pub struct AclCase {
    pub acl: ResourceAcl,
    pub principal: PrincipalId,
    pub role: RoleId,

    /// `Some(role)` when the subject holds the role.
    pub current_role: Option<RoleId>,
}

/// Build the ACL described by `params`.
pub fn acl_from_params(params: &AclParams) -> AclCase {
    let initiative = Initiative::new(TenantId::generate(), "generated");
    let resource = Resource::new(ResourceKind::Project, &initiative, "generated");
    let mut acl = ResourceAcl::new(resource);

    let principal = PrincipalId::generate();
    let role = RoleId::generate();

    if let Some(level) = params.direct {
        acl.apply_user_grant(principal, level);
    }
    if let Some(level) = params.via_role {
        acl.apply_role_grant(role, level);
    }
    for level in &params.other_users {
        acl.apply_user_grant(PrincipalId::generate(), *level);
    }
    for level in &params.other_roles {
        acl.apply_role_grant(RoleId::generate(), *level);
    }

    AclCase {
        acl,
        principal,
        role,
        current_role: params.holds_role.then_some(role),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use initiative_authz_core::validation::validate_role_name;
    use initiative_authz_core::{can, require, PlatformRole, Principal};

    proptest! {
        #[test]
        fn test_resolve_is_max_of_direct_and_role(params: AclParams) {
            let case = acl_from_params(&params);
            let level = case.acl.resolve(&case.principal, case.current_role.as_ref());

            prop_assert_eq!(level, params.expected());
        }

        #[test]
        fn test_adding_a_grant_never_lowers(params: AclParams, extra in permission_level()) {
            let case = acl_from_params(&params);
            let before = case.acl.resolve(&case.principal, case.current_role.as_ref());

            let mut acl = case.acl.clone();
            acl.apply_role_grant(RoleId::generate(), extra);
            acl.apply_user_grant(PrincipalId::generate(), extra);
            let after = acl.resolve(&case.principal, case.current_role.as_ref());

            prop_assert!(after >= before);
        }

        #[test]
        fn test_require_matches_resolve(params: AclParams, minimum in permission_level()) {
            let case = acl_from_params(&params);
            let result = require(&case.acl, &case.principal, case.current_role.as_ref(), minimum);

            match params.expected() {
                Some(level) if level >= minimum => prop_assert_eq!(result.ok(), Some(level)),
                _ => prop_assert!(result.is_err()),
            }
        }

        #[test]
        fn test_managers_have_every_capability(
            role in role_with_toggles(),
            key in capability_key(),
        ) {
            let principal = Principal::new("vera", PlatformRole::Member);
            let allowed = can(&principal, Some(&role), key);

            if role.is_manager {
                prop_assert!(allowed);
            } else {
                let expected = role.toggle(key).unwrap_or_else(|| key.default_enabled());
                prop_assert_eq!(allowed, expected);
            }
        }

        #[test]
        fn test_role_names_pass_validation(name in role_name()) {
            prop_assert!(validate_role_name(&name).is_ok());
        }
    }
}
