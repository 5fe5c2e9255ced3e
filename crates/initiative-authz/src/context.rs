//! Turning an untrusted request identity into a validated tenant context.

use initiative_authz_core::{PlatformRole, PrincipalId, ReadMode, TenantId, TenantScopedHandle};
use initiative_authz_store::StoreTx;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// What the transport claims about the caller. Nothing here is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub principal_id: PrincipalId,
    pub platform_role: PlatformRole,
    pub active_tenant_id: TenantId,
    #[serde(default)]
    pub read_mode: ReadMode,
}

impl RequestIdentity {
    /// An identity in active-tenant read mode.
    pub fn new(principal_id: PrincipalId, platform_role: PlatformRole, tenant: TenantId) -> Self {
        Self {
            principal_id,
            platform_role,
            active_tenant_id: tenant,
            read_mode: ReadMode::ActiveTenant,
        }
    }

    /// Request global read mode.
    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }
}

/// Validate `identity` against stored principal and membership rows.
///
/// The stored platform role wins over the claimed one. Unknown principals,
/// unknown tenants and tenants the principal may not enter are all
/// `NotFound`.
pub fn open_context(
    tx: &dyn StoreTx,
    identity: &RequestIdentity,
    config: &EngineConfig,
) -> Result<TenantScopedHandle> {
    let principal = tx
        .get_principal(&identity.principal_id)?
        .ok_or_else(|| EngineError::NotFound(format!("principal {}", identity.principal_id)))?;

    if principal.platform_role != identity.platform_role {
        tracing::warn!(
            principal = %principal.id,
            claimed = identity.platform_role.as_str(),
            stored = principal.platform_role.as_str(),
            "claimed platform role does not match stored role"
        );
    }

    if tx.get_tenant(&identity.active_tenant_id)?.is_none() {
        return Err(EngineError::NotFound(format!(
            "tenant {}",
            identity.active_tenant_id
        )));
    }

    let read_mode = match identity.read_mode {
        ReadMode::Global if !config.allow_global_reads => {
            tracing::warn!(
                principal = %principal.id,
                "global read mode disabled, using active tenant"
            );
            ReadMode::ActiveTenant
        }
        mode => mode,
    };

    let memberships = tx.tenant_memberships_of(&principal.id)?;
    Ok(TenantScopedHandle::validate(
        principal,
        identity.active_tenant_id,
        &memberships,
        read_mode,
    )?)
}
