//! # Initiative Authz Testkit
//!
//! Testing utilities for initiative authorization.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: A bootstrapped tenant, initiative and admin over either
//!   store backend
//! - **Generators**: Proptest strategies for levels, capabilities, roles and
//!   ACLs
//!
//! ## Test Fixtures
//!
//! ```rust
//! use initiative_authz_core::PermissionLevel;
//! use initiative_authz_testkit::fixtures::TestFixture;
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let fixture = TestFixture::new().await;
//! let project = fixture.project("site").await;
//! assert_eq!(fixture.level(&fixture.admin, &project).await, Some(PermissionLevel::Owner));
//! # });
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use initiative_authz_testkit::generators::{acl_from_params, AclParams};
//!
//! proptest! {
//!     #[test]
//!     fn resolution_is_max(params: AclParams) {
//!         let case = acl_from_params(&params);
//!         let level = case.acl.resolve(&case.principal, case.current_role.as_ref());
//!         prop_assert_eq!(level, params.expected());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{multi_tenant_fixtures, seeded_acl, AccessMatrix, TestFixture};
pub use generators::{acl_from_params, AclCase, AclParams};
