//! # Initiative Authz Store
//!
//! Persistence for tenants, initiatives, roles, memberships, resources and
//! grants. Provides a trait-based interface with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! [`Store`] hands a [`StoreTx`] to a closure. Everything the closure does
//! through an [`Store::atomic`] view commits together or not at all, which is
//! what lets ownership transfer and membership removal appear as one step to
//! concurrent readers.
//!
//! ## Key Types
//!
//! - [`Store`] - Async entry point to a backend
//! - [`StoreTx`] - Synchronous table operations inside one transaction
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use initiative_authz_core::Tenant;
//! use initiative_authz_store::{SqliteStore, Store, StoreError};
//!
//! async fn example() -> Result<(), StoreError> {
//!     let store = SqliteStore::open("authz.db")?;
//!
//!     let tenant = Tenant::new("acme");
//!     let id = tenant.id;
//!     store.atomic(move |tx| tx.insert_tenant(&tenant)).await?;
//!
//!     let found = store.read(move |tx| tx.get_tenant(&id)).await?;
//!     assert!(found.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Cascades**: deleting a resource removes its grants; deleting a role
//!   removes its toggles and role grants
//! - **Guarded roles**: a role still held by a member cannot be deleted
//! - **Denormalized tenant**: every grant row carries the resource's tenant

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryState, MemoryStore};
pub use sqlite::{SqliteStore, SqliteTx};
pub use traits::{Store, StoreTx};
