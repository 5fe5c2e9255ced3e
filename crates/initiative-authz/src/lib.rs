//! # Initiative Authz
//!
//! The authorization engine for tenant-scoped resources: decides whether a
//! principal may read, write or own a resource, and which features their
//! initiative role unlocks.
//!
//! ## Overview
//!
//! Every request passes three layers, in order:
//!
//! - **Isolation**: the claimed identity is validated into a
//!   [`TenantScopedHandle`](initiative_authz_core::TenantScopedHandle). Rows outside its
//!   scope are reported as not found.
//! - **Resolution**: the effective level is the greater of the principal's
//!   direct grant and the grant of their *current* initiative role.
//! - **Toggles**: create operations are gated by the role's capability
//!   toggles.
//!
//! Tenant and platform admin roles never raise a resolved level.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use initiative_authz::{Engine, EngineConfig, RequestIdentity};
//! use initiative_authz::core::{PermissionLevel, PlatformRole, ResourceKind};
//! use initiative_authz::store::SqliteStore;
//!
//! async fn example() -> initiative_authz::Result<()> {
//!     let engine = Engine::new(SqliteStore::open("authz.db")?, EngineConfig::default());
//!
//!     let user = engine.register_principal("ada", PlatformRole::Member).await?;
//!     let tenant = engine.create_tenant(user.id, "acme").await?;
//!     let me = RequestIdentity::new(user.id, PlatformRole::Member, tenant.id);
//!
//!     let initiative = engine.create_initiative(&me, "launch").await?;
//!     let site = engine
//!         .create_resource(&me, initiative.id, ResourceKind::Project, "site")
//!         .await?;
//!
//!     engine
//!         .require_permission(&me, site.id, PermissionLevel::Owner)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `initiative_authz::core` - Data model, resolver, isolation filter
//! - `initiative_authz::store` - Storage abstraction and SQLite

pub mod access;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod registry;

// Re-export component crates
pub use initiative_authz_core as core;
pub use initiative_authz_store as store;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use context::{open_context, RequestIdentity};
pub use coordinator::TransferReport;
pub use engine::Engine;
pub use error::{EngineError, Result};

pub use initiative_authz_core::{
    CapabilityKey, InitiativeId, OwnerlessResourceWarning, PermissionLevel, PlatformRole,
    PrincipalId, ReadMode, ResourceId, ResourceKind, RoleId, TenantId, TenantRole,
};
