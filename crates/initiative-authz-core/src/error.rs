//! Error types for the authorization core.

use thiserror::Error;

use crate::level::PermissionLevel;

/// Errors raised by the pure authorization primitives.
///
/// "No access" is never an error here; the resolver returns `None` for it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Target is absent or lies outside the caller's tenant scope.
    ///
    /// Both cases share this variant so the tenant boundary does not leak
    /// existence.
    #[error("not found: {0}")]
    NotFound(String),

    /// Target is visible but the effective level is insufficient.
    #[error("access denied: requires {required}, effective {}", .effective.map(|l| l.as_str()).unwrap_or("none"))]
    AccessDenied {
        required: PermissionLevel,
        effective: Option<PermissionLevel>,
    },

    /// A grant or role reference crosses an initiative or tenant boundary.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// A persisted or client-supplied enum value is not recognised.
    #[error("unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },

    /// Input failed a structural check.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
