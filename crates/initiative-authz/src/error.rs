//! Error types for the engine.

use initiative_authz_core::{CapabilityKey, CoreError, PermissionLevel, ResourceId, RoleId};
use initiative_authz_store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
///
/// "No access" on a reachable resource is `AccessDenied`; anything outside
/// the caller's tenant scope is `NotFound`, exactly as if it did not exist.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Target does not exist or is not reachable from the tenant context.
    #[error("not found: {0}")]
    NotFound(String),

    /// Effective level on a reachable resource is below what was required.
    #[error("access denied: requires {required}, effective {}", .effective.map(|l| l.as_str()).unwrap_or("none"))]
    AccessDenied {
        required: PermissionLevel,
        effective: Option<PermissionLevel>,
    },

    /// Administrative operation attempted without the tenant or initiative
    /// role it needs.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The caller's initiative role lacks the capability.
    #[error("feature disabled: {0}")]
    FeatureDisabled(CapabilityKey),

    /// A role or grant reference crosses an initiative or tenant boundary.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Role still held by members.
    #[error("role {role} is held by {members} member(s)")]
    RoleInUse { role: RoleId, members: usize },

    /// Change would leave the resource with no reachable owner.
    #[error("resource {0} would be left without an owner")]
    LastOwner(ResourceId),

    /// Duplicate name or membership.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// HTTP status an endpoint should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::AccessDenied { .. } | Self::Forbidden(_) | Self::FeatureDisabled(_) => 403,
            Self::RoleInUse { .. } | Self::LastOwner(_) | Self::Conflict(_) => 409,
            Self::Store(StoreError::Constraint(_)) => 409,
            Self::InvalidReference(_) | Self::Validation(_) => 422,
            Self::Config(_) | Self::Store(_) => 500,
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound(what) => Self::NotFound(what),
            CoreError::AccessDenied {
                required,
                effective,
            } => Self::AccessDenied {
                required,
                effective,
            },
            CoreError::InvalidReference(msg) => Self::InvalidReference(msg),
            CoreError::Validation(msg) => Self::Validation(msg),
            e @ CoreError::UnknownValue { .. } => Self::Validation(e.to_string()),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
