//! # Initiative Authz Core
//!
//! Pure primitives for tenant-scoped authorization: identifiers, the data
//! model, permission resolution, feature toggles, tenant isolation and
//! ownership-transfer planning.
//!
//! This crate contains no I/O and no storage. Every function is synchronous
//! and safe to call concurrently.
//!
//! ## Key Types
//!
//! - [`PermissionLevel`] - The ordered scale `read < write < owner`
//! - [`ResourceAcl`] - Direct and role grants of one resource
//! - [`TenantScopedHandle`] - Validated tenant context, required before any
//!   resource is observed
//! - [`CapabilityKey`] - Feature toggles gating create operations
//! - [`TransferPlan`] - Row changes that keep resources owned when members
//!   leave
//!
//! ## Layers
//!
//! 1. Isolation: is the row reachable at all? If not, it does not exist.
//! 2. Resolution: `max(direct grant, grant of the principal's current role)`.
//! 3. Toggles: capability checks for operations that create resources.
//!
//! Administrative roles never elevate step 2.

pub mod capability;
pub mod error;
pub mod isolation;
pub mod level;
pub mod model;
pub mod resolve;
pub mod transfer;
pub mod types;
pub mod validation;

pub use capability::{can, CapabilityKey};
pub use error::{CoreError, Result};
pub use isolation::{ReadMode, ReadScope, TenantScoped, TenantScopedHandle};
pub use level::{PermissionLevel, PlatformRole, TenantRole};
pub use model::{
    Initiative, InitiativeMembership, InitiativeRole, Principal, Resource, ResourceKind,
    ResourcePermission, ResourceRolePermission, RolePermissionToggle, Tenant, TenantMembership,
    MEMBER_ROLE, PROJECT_MANAGER_ROLE,
};
pub use resolve::{require, resolve, ResourceAcl};
pub use transfer::{
    apply_plan, plan_membership_removal, plan_repair, OwnerlessResourceWarning, TransferPlan,
};
pub use types::{InitiativeId, PrincipalId, ResourceId, RoleId, TenantId, ID_LEN};
