//! Test fixtures for common scenarios.

use std::collections::BTreeMap;

use initiative_authz::{Engine, EngineConfig, RequestIdentity, Result};
use initiative_authz_core::{
    Initiative, InitiativeRole, PermissionLevel, PlatformRole, Principal, PrincipalId, Resource,
    ResourceAcl, ResourceKind, RoleId, Tenant, TenantId, TenantRole, MEMBER_ROLE,
    PROJECT_MANAGER_ROLE,
};
use initiative_authz_store::{MemoryStore, SqliteStore, Store};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// One tenant with one initiative, created by `admin`.
///
/// `admin` is a tenant admin and holds `project_manager` in the initiative,
/// so it can create resources and administer roles without further setup.
pub struct TestFixture<S: Store = MemoryStore> {
    pub engine: Engine<S>,
    pub admin: Principal,
    pub tenant: Tenant,
    pub initiative: Initiative,
    pub manager_role: InitiativeRole,
    pub member_role: InitiativeRole,
}

impl TestFixture<MemoryStore> {
    /// Create a fixture over a fresh in-memory store.
    pub async fn new() -> Self {
        Self::with_store(MemoryStore::new()).await
    }
}

impl TestFixture<SqliteStore> {
    /// Create a fixture over a fresh in-memory SQLite database.
    pub async fn sqlite() -> Self {
        let store = SqliteStore::open_memory().expect("open in-memory sqlite");
        Self::with_store(store).await
    }
}

impl<S: Store> TestFixture<S> {
    pub async fn with_store(store: S) -> Self {
        Self::with_config(store, EngineConfig::default()).await
    }

    /// `config` must keep built-in role seeding enabled.
    pub async fn with_config(store: S, config: EngineConfig) -> Self {
        Self::bootstrap(Engine::new(store, config), "ada", "acme").await
    }

    /// A second tenant on the same engine, with its own admin and
    /// initiative.
    pub async fn sibling(&self, admin_name: &str, tenant_name: &str) -> Self {
        Self::bootstrap(self.engine.clone(), admin_name, tenant_name).await
    }

    async fn bootstrap(engine: Engine<S>, admin_name: &str, tenant_name: &str) -> Self {
        let admin = engine
            .register_principal(admin_name, PlatformRole::Member)
            .await
            .expect("register admin");
        let tenant = engine
            .create_tenant(admin.id, tenant_name)
            .await
            .expect("create tenant");

        let identity = RequestIdentity::new(admin.id, admin.platform_role, tenant.id);
        let initiative = engine
            .create_initiative(&identity, "launch")
            .await
            .expect("create initiative");

        let roles = engine
            .list_roles(&identity, initiative.id)
            .await
            .expect("list roles");
        let find = |name: &str| {
            roles
                .iter()
                .find(|r| r.name == name)
                .cloned()
                .expect("built-in role seeded")
        };
        let manager_role = find(PROJECT_MANAGER_ROLE);
        let member_role = find(MEMBER_ROLE);

        Self {
            engine,
            admin,
            tenant,
            initiative,
            manager_role,
            member_role,
        }
    }

    /// Request identity for `principal` in this fixture's tenant.
    pub fn identity(&self, principal: &Principal) -> RequestIdentity {
        RequestIdentity::new(principal.id, principal.platform_role, self.tenant.id)
    }

    pub fn admin_identity(&self) -> RequestIdentity {
        self.identity(&self.admin)
    }

    /// Register a principal and add it to the tenant as a plain member.
    pub async fn user(&self, name: &str) -> Principal {
        let principal = self
            .engine
            .register_principal(name, PlatformRole::Member)
            .await
            .expect("register user");
        self.engine
            .add_tenant_member(&self.admin_identity(), principal.id, TenantRole::Member)
            .await
            .expect("add tenant member");
        principal
    }

    /// Register a platform admin. It is not a member of any tenant.
    pub async fn platform_admin(&self, name: &str) -> Principal {
        self.engine
            .register_principal(name, PlatformRole::Admin)
            .await
            .expect("register platform admin")
    }

    /// A tenant user who also holds `role` in the initiative.
    pub async fn member(&self, name: &str, role: &InitiativeRole) -> Principal {
        let principal = self.user(name).await;
        self.engine
            .add_initiative_member(
                &self.admin_identity(),
                self.initiative.id,
                principal.id,
                role.id,
            )
            .await
            .expect("add initiative member");
        principal
    }

    /// A project owned by the admin.
    pub async fn project(&self, name: &str) -> Resource {
        self.engine
            .create_resource(
                &self.admin_identity(),
                self.initiative.id,
                ResourceKind::Project,
                name,
            )
            .await
            .expect("create project")
    }

    /// Effective level of `principal`. Unreachable resources are an error,
    /// so `Ok(None)` means reachable with no grant.
    pub async fn reachable_level(
        &self,
        principal: &Principal,
        resource: &Resource,
    ) -> Result<Option<PermissionLevel>> {
        self.engine
            .resolve_permission(&self.identity(principal), resource.id)
            .await
    }

    /// Effective level of `principal`, `None` when denied or unreachable.
    pub async fn level(
        &self,
        principal: &Principal,
        resource: &Resource,
    ) -> Option<PermissionLevel> {
        self.engine
            .resolve_permission(&self.identity(principal), resource.id)
            .await
            .ok()
            .flatten()
    }

    /// Levels of every principal on every resource, keyed by name.
    pub async fn access_matrix(
        &self,
        principals: &[&Principal],
        resources: &[&Resource],
    ) -> AccessMatrix {
        let mut matrix = AccessMatrix::default();
        for principal in principals {
            let row = matrix
                .rows
                .entry(principal.display_name.clone())
                .or_default();
            for resource in resources {
                row.insert(
                    resource.name.clone(),
                    self.level(principal, resource).await,
                );
            }
        }
        matrix
    }
}

/// Create `count` tenants sharing one in-memory engine.
pub async fn multi_tenant_fixtures(count: usize) -> Vec<TestFixture> {
    let first = TestFixture::new().await;
    let mut fixtures = Vec::with_capacity(count);
    for i in 1..count {
        fixtures.push(
            first
                .sibling(&format!("admin-{}", i), &format!("tenant-{}", i))
                .await,
        );
    }
    fixtures.insert(0, first);
    fixtures.truncate(count);
    fixtures
}

/// Principal name -> resource name -> effective level.
///
/// Names are stable across runs where ids are not, so two backends driven
/// through the same scenario produce equal matrices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessMatrix {
    pub rows: BTreeMap<String, BTreeMap<String, Option<PermissionLevel>>>,
}

impl AccessMatrix {
    pub fn get(&self, principal: &str, resource: &str) -> Option<PermissionLevel> {
        self.rows
            .get(principal)
            .and_then(|row| row.get(resource))
            .copied()
            .flatten()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A resource ACL filled from a seeded RNG, with the ids it grants to.
///
/// Every principal gets a direct grant and every role a role grant, each at
/// a random level.
pub fn seeded_acl(
    seed: u64,
    users: usize,
    roles: usize,
) -> (ResourceAcl, Vec<PrincipalId>, Vec<RoleId>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let initiative = Initiative::new(TenantId::from_bytes(rng.gen()), "bench");
    let mut acl = ResourceAcl::new(Resource::new(ResourceKind::Project, &initiative, "bench"));

    let principals: Vec<PrincipalId> = (0..users)
        .map(|_| PrincipalId::from_bytes(rng.gen()))
        .collect();
    for principal in &principals {
        acl.apply_user_grant(*principal, random_level(&mut rng));
    }

    let role_ids: Vec<RoleId> = (0..roles).map(|_| RoleId::from_bytes(rng.gen())).collect();
    for role in &role_ids {
        acl.apply_role_grant(*role, random_level(&mut rng));
    }

    (acl, principals, role_ids)
}

fn random_level(rng: &mut StdRng) -> PermissionLevel {
    PermissionLevel::ALL[rng.gen_range(0..PermissionLevel::ALL.len())]
}
