//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. Foreign keys are
//! enforced, so cascades and reference checks match [`MemoryStore`].
//!
//! [`MemoryStore`]: crate::MemoryStore

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Params, Row};

use initiative_authz_core::{
    Initiative, InitiativeId, InitiativeMembership, InitiativeRole, Principal, PrincipalId,
    Resource, ResourceId, ResourcePermission, ResourceRolePermission, RoleId,
    RolePermissionToggle, Tenant, TenantId, TenantMembership, ID_LEN,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Store, StoreTx};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "opening sqlite store");
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Poisoned(e.to_string())
}

fn join_failed(e: tokio::task::JoinError) -> StoreError {
    StoreError::Task(format!("spawn_blocking failed: {}", e))
}

#[async_trait]
impl Store for SqliteStore {
    async fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> std::result::Result<T, E> {
            let conn = conn.lock().map_err(poisoned)?;
            f(&SqliteTx { conn: &conn })
        })
        .await
        .map_err(join_failed)?
    }

    async fn atomic<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> std::result::Result<T, E> {
            let mut conn = conn.lock().map_err(poisoned)?;
            let tx = conn.transaction().map_err(StoreError::from)?;

            // Dropping `tx` without commit rolls back.
            let out = f(&mut SqliteTx { conn: &tx })?;
            tx.commit().map_err(StoreError::from)?;
            Ok(out)
        })
        .await
        .map_err(join_failed)?
    }
}

/// A [`StoreTx`] over one borrowed connection or open transaction.
pub struct SqliteTx<'a> {
    conn: &'a Connection,
}

/// Map constraint failures to [`StoreError::Constraint`] so callers see the
/// same error from every backend.
fn write_error(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(err, msg) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Constraint(msg.unwrap_or_else(|| err.to_string()))
        }
        other => StoreError::Database(other),
    }
}

impl SqliteTx<'_> {
    fn exec<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.conn.execute(sql, params).map_err(write_error)
    }

    fn query_one<T, P: Params>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        Ok(self.conn.query_row(sql, params, map).optional()?)
    }

    fn query_all<T, P: Params>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn with_toggles(&self, mut role: InitiativeRole) -> Result<InitiativeRole> {
        let toggles = self.query_all(
            "SELECT role_id, capability_key, enabled FROM role_permission_toggles
             WHERE role_id = ?1",
            params![role.id.0.as_slice()],
            row_to_toggle,
        )?;
        for toggle in toggles {
            role.set_toggle(toggle.capability, toggle.enabled);
        }
        Ok(role)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row Conversion
// ─────────────────────────────────────────────────────────────────────────────

fn id_col<I: From<[u8; ID_LEN]>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<I> {
    let bytes: Vec<u8> = row.get(idx)?;
    let arr: [u8; ID_LEN] = bytes
        .try_into()
        .map_err(|_| rusqlite::Error::InvalidColumnType(idx, "id".into(), Type::Blob))?;
    Ok(I::from(arr))
}

fn parsed_col<V>(row: &Row<'_>, idx: usize) -> rusqlite::Result<V>
where
    V: FromStr,
    V::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_tenant(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: id_col(row, 0)?,
        name: row.get(1)?,
    })
}

fn row_to_principal(row: &Row<'_>) -> rusqlite::Result<Principal> {
    Ok(Principal {
        id: id_col(row, 0)?,
        display_name: row.get(1)?,
        platform_role: parsed_col(row, 2)?,
    })
}

fn row_to_tenant_membership(row: &Row<'_>) -> rusqlite::Result<TenantMembership> {
    Ok(TenantMembership {
        tenant_id: id_col(row, 0)?,
        principal_id: id_col(row, 1)?,
        role: parsed_col(row, 2)?,
    })
}

fn row_to_initiative(row: &Row<'_>) -> rusqlite::Result<Initiative> {
    Ok(Initiative {
        id: id_col(row, 0)?,
        tenant_id: id_col(row, 1)?,
        name: row.get(2)?,
    })
}

/// Toggles are loaded separately by [`SqliteTx::with_toggles`].
fn row_to_role(row: &Row<'_>) -> rusqlite::Result<InitiativeRole> {
    Ok(InitiativeRole {
        id: id_col(row, 0)?,
        initiative_id: id_col(row, 1)?,
        name: row.get(2)?,
        is_manager: row.get(3)?,
        position: row.get(4)?,
        toggles: Vec::new(),
    })
}

fn row_to_toggle(row: &Row<'_>) -> rusqlite::Result<RolePermissionToggle> {
    Ok(RolePermissionToggle {
        role_id: id_col(row, 0)?,
        capability: parsed_col(row, 1)?,
        enabled: row.get(2)?,
    })
}

fn row_to_membership(row: &Row<'_>) -> rusqlite::Result<InitiativeMembership> {
    Ok(InitiativeMembership {
        initiative_id: id_col(row, 0)?,
        principal_id: id_col(row, 1)?,
        role_id: id_col(row, 2)?,
    })
}

fn row_to_resource(row: &Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: id_col(row, 0)?,
        kind: parsed_col(row, 1)?,
        initiative_id: id_col(row, 2)?,
        tenant_id: id_col(row, 3)?,
        name: row.get(4)?,
    })
}

fn row_to_user_grant(row: &Row<'_>) -> rusqlite::Result<ResourcePermission> {
    Ok(ResourcePermission {
        resource_id: id_col(row, 0)?,
        principal_id: id_col(row, 1)?,
        level: parsed_col(row, 2)?,
        tenant_id: id_col(row, 3)?,
    })
}

fn row_to_role_grant(row: &Row<'_>) -> rusqlite::Result<ResourceRolePermission> {
    Ok(ResourceRolePermission {
        resource_id: id_col(row, 0)?,
        role_id: id_col(row, 1)?,
        level: parsed_col(row, 2)?,
        tenant_id: id_col(row, 3)?,
    })
}

const RESOURCE_COLUMNS: &str = "id, kind, initiative_id, tenant_id, name";
const ROLE_COLUMNS: &str = "id, initiative_id, name, is_manager, position";

impl StoreTx for SqliteTx<'_> {
    fn insert_tenant(&mut self, tenant: &Tenant) -> Result<()> {
        self.exec(
            "INSERT INTO tenants (id, name) VALUES (?1, ?2)",
            params![tenant.id.0.as_slice(), tenant.name],
        )?;
        Ok(())
    }

    fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>> {
        self.query_one(
            "SELECT id, name FROM tenants WHERE id = ?1",
            params![id.0.as_slice()],
            row_to_tenant,
        )
    }

    fn upsert_principal(&mut self, principal: &Principal) -> Result<()> {
        self.exec(
            "INSERT INTO principals (id, display_name, platform_role) VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET
                display_name = excluded.display_name,
                platform_role = excluded.platform_role",
            params![
                principal.id.0.as_slice(),
                principal.display_name,
                principal.platform_role.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_principal(&self, id: &PrincipalId) -> Result<Option<Principal>> {
        self.query_one(
            "SELECT id, display_name, platform_role FROM principals WHERE id = ?1",
            params![id.0.as_slice()],
            row_to_principal,
        )
    }

    fn upsert_tenant_membership(&mut self, membership: &TenantMembership) -> Result<()> {
        self.exec(
            "INSERT INTO tenant_memberships (tenant_id, principal_id, role) VALUES (?1, ?2, ?3)
             ON CONFLICT (tenant_id, principal_id) DO UPDATE SET role = excluded.role",
            params![
                membership.tenant_id.0.as_slice(),
                membership.principal_id.0.as_slice(),
                membership.role.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_tenant_membership(
        &self,
        tenant: &TenantId,
        principal: &PrincipalId,
    ) -> Result<Option<TenantMembership>> {
        self.query_one(
            "SELECT tenant_id, principal_id, role FROM tenant_memberships
             WHERE tenant_id = ?1 AND principal_id = ?2",
            params![tenant.0.as_slice(), principal.0.as_slice()],
            row_to_tenant_membership,
        )
    }

    fn delete_tenant_membership(
        &mut self,
        tenant: &TenantId,
        principal: &PrincipalId,
    ) -> Result<bool> {
        let n = self.exec(
            "DELETE FROM tenant_memberships WHERE tenant_id = ?1 AND principal_id = ?2",
            params![tenant.0.as_slice(), principal.0.as_slice()],
        )?;
        Ok(n > 0)
    }

    fn tenant_memberships_of(&self, principal: &PrincipalId) -> Result<Vec<TenantMembership>> {
        self.query_all(
            "SELECT tenant_id, principal_id, role FROM tenant_memberships
             WHERE principal_id = ?1 ORDER BY tenant_id",
            params![principal.0.as_slice()],
            row_to_tenant_membership,
        )
    }

    fn insert_initiative(&mut self, initiative: &Initiative) -> Result<()> {
        self.exec(
            "INSERT INTO initiatives (id, tenant_id, name) VALUES (?1, ?2, ?3)",
            params![
                initiative.id.0.as_slice(),
                initiative.tenant_id.0.as_slice(),
                initiative.name,
            ],
        )?;
        Ok(())
    }

    fn get_initiative(&self, id: &InitiativeId) -> Result<Option<Initiative>> {
        self.query_one(
            "SELECT id, tenant_id, name FROM initiatives WHERE id = ?1",
            params![id.0.as_slice()],
            row_to_initiative,
        )
    }

    fn initiatives_in_tenant(&self, tenant: &TenantId) -> Result<Vec<Initiative>> {
        self.query_all(
            "SELECT id, tenant_id, name FROM initiatives WHERE tenant_id = ?1 ORDER BY id",
            params![tenant.0.as_slice()],
            row_to_initiative,
        )
    }

    fn upsert_role(&mut self, role: &InitiativeRole) -> Result<()> {
        self.exec(
            "INSERT INTO initiative_roles (id, initiative_id, name, is_manager, position)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                is_manager = excluded.is_manager,
                position = excluded.position",
            params![
                role.id.0.as_slice(),
                role.initiative_id.0.as_slice(),
                role.name,
                role.is_manager,
                role.position,
            ],
        )?;

        self.exec(
            "DELETE FROM role_permission_toggles WHERE role_id = ?1",
            params![role.id.0.as_slice()],
        )?;
        for toggle in &role.toggles {
            self.set_toggle(&RolePermissionToggle {
                role_id: role.id,
                capability: toggle.capability,
                enabled: toggle.enabled,
            })?;
        }
        Ok(())
    }

    fn get_role(&self, id: &RoleId) -> Result<Option<InitiativeRole>> {
        let sql = format!("SELECT {} FROM initiative_roles WHERE id = ?1", ROLE_COLUMNS);
        match self.query_one(&sql, params![id.0.as_slice()], row_to_role)? {
            Some(role) => Ok(Some(self.with_toggles(role)?)),
            None => Ok(None),
        }
    }

    fn roles_in_initiative(&self, initiative: &InitiativeId) -> Result<Vec<InitiativeRole>> {
        let sql = format!(
            "SELECT {} FROM initiative_roles WHERE initiative_id = ?1 ORDER BY position, id",
            ROLE_COLUMNS
        );
        self.query_all(&sql, params![initiative.0.as_slice()], row_to_role)?
            .into_iter()
            .map(|role| self.with_toggles(role))
            .collect()
    }

    fn delete_role(&mut self, id: &RoleId) -> Result<bool> {
        let assigned: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM initiative_memberships WHERE role_id = ?1",
            params![id.0.as_slice()],
            |row| row.get(0),
        )?;
        if assigned > 0 {
            return Err(StoreError::Constraint(format!(
                "role {} is still assigned",
                id
            )));
        }

        // Toggles and role grants go with it via ON DELETE CASCADE.
        let n = self.exec(
            "DELETE FROM initiative_roles WHERE id = ?1",
            params![id.0.as_slice()],
        )?;
        Ok(n > 0)
    }

    fn set_toggle(&mut self, toggle: &RolePermissionToggle) -> Result<()> {
        self.exec(
            "INSERT INTO role_permission_toggles (role_id, capability_key, enabled)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (role_id, capability_key) DO UPDATE SET enabled = excluded.enabled",
            params![
                toggle.role_id.0.as_slice(),
                toggle.capability.as_str(),
                toggle.enabled,
            ],
        )?;
        Ok(())
    }

    fn upsert_membership(&mut self, membership: &InitiativeMembership) -> Result<()> {
        self.exec(
            "INSERT INTO initiative_memberships (initiative_id, principal_id, role_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (initiative_id, principal_id) DO UPDATE SET role_id = excluded.role_id",
            params![
                membership.initiative_id.0.as_slice(),
                membership.principal_id.0.as_slice(),
                membership.role_id.0.as_slice(),
            ],
        )?;
        Ok(())
    }

    fn get_membership(
        &self,
        initiative: &InitiativeId,
        principal: &PrincipalId,
    ) -> Result<Option<InitiativeMembership>> {
        self.query_one(
            "SELECT initiative_id, principal_id, role_id FROM initiative_memberships
             WHERE initiative_id = ?1 AND principal_id = ?2",
            params![initiative.0.as_slice(), principal.0.as_slice()],
            row_to_membership,
        )
    }

    fn delete_membership(
        &mut self,
        initiative: &InitiativeId,
        principal: &PrincipalId,
    ) -> Result<bool> {
        let n = self.exec(
            "DELETE FROM initiative_memberships WHERE initiative_id = ?1 AND principal_id = ?2",
            params![initiative.0.as_slice(), principal.0.as_slice()],
        )?;
        Ok(n > 0)
    }

    fn memberships_in_initiative(
        &self,
        initiative: &InitiativeId,
    ) -> Result<Vec<InitiativeMembership>> {
        self.query_all(
            "SELECT initiative_id, principal_id, role_id FROM initiative_memberships
             WHERE initiative_id = ?1 ORDER BY principal_id",
            params![initiative.0.as_slice()],
            row_to_membership,
        )
    }

    fn memberships_of(&self, principal: &PrincipalId) -> Result<Vec<InitiativeMembership>> {
        self.query_all(
            "SELECT initiative_id, principal_id, role_id FROM initiative_memberships
             WHERE principal_id = ?1 ORDER BY initiative_id",
            params![principal.0.as_slice()],
            row_to_membership,
        )
    }

    fn insert_resource(&mut self, resource: &Resource) -> Result<()> {
        self.exec(
            "INSERT INTO resources (id, kind, initiative_id, tenant_id, name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                resource.id.0.as_slice(),
                resource.kind.as_str(),
                resource.initiative_id.0.as_slice(),
                resource.tenant_id.0.as_slice(),
                resource.name,
            ],
        )?;
        Ok(())
    }

    fn get_resource(&self, id: &ResourceId) -> Result<Option<Resource>> {
        let sql = format!("SELECT {} FROM resources WHERE id = ?1", RESOURCE_COLUMNS);
        self.query_one(&sql, params![id.0.as_slice()], row_to_resource)
    }

    fn delete_resource(&mut self, id: &ResourceId) -> Result<bool> {
        let n = self.exec(
            "DELETE FROM resources WHERE id = ?1",
            params![id.0.as_slice()],
        )?;
        Ok(n > 0)
    }

    fn resources_in_initiative(&self, initiative: &InitiativeId) -> Result<Vec<Resource>> {
        let sql = format!(
            "SELECT {} FROM resources WHERE initiative_id = ?1 ORDER BY id",
            RESOURCE_COLUMNS
        );
        self.query_all(&sql, params![initiative.0.as_slice()], row_to_resource)
    }

    fn resources_in_tenants(&self, tenants: &[TenantId]) -> Result<Vec<Resource>> {
        if tenants.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; tenants.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM resources WHERE tenant_id IN ({}) ORDER BY id",
            RESOURCE_COLUMNS, placeholders
        );
        self.query_all(
            &sql,
            params_from_iter(tenants.iter().map(|t| t.0.as_slice())),
            row_to_resource,
        )
    }

    fn all_resources(&self) -> Result<Vec<Resource>> {
        let sql = format!("SELECT {} FROM resources ORDER BY id", RESOURCE_COLUMNS);
        self.query_all(&sql, [], row_to_resource)
    }

    fn upsert_user_grant(&mut self, grant: &ResourcePermission) -> Result<()> {
        self.exec(
            "INSERT INTO resource_permissions (resource_id, principal_id, level, tenant_id)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (resource_id, principal_id) DO UPDATE SET
                level = excluded.level,
                tenant_id = excluded.tenant_id",
            params![
                grant.resource_id.0.as_slice(),
                grant.principal_id.0.as_slice(),
                grant.level.as_str(),
                grant.tenant_id.0.as_slice(),
            ],
        )?;
        Ok(())
    }

    fn delete_user_grant(
        &mut self,
        resource: &ResourceId,
        principal: &PrincipalId,
    ) -> Result<bool> {
        let n = self.exec(
            "DELETE FROM resource_permissions WHERE resource_id = ?1 AND principal_id = ?2",
            params![resource.0.as_slice(), principal.0.as_slice()],
        )?;
        Ok(n > 0)
    }

    fn user_grants_on(&self, resource: &ResourceId) -> Result<Vec<ResourcePermission>> {
        self.query_all(
            "SELECT resource_id, principal_id, level, tenant_id FROM resource_permissions
             WHERE resource_id = ?1 ORDER BY principal_id",
            params![resource.0.as_slice()],
            row_to_user_grant,
        )
    }

    fn upsert_role_grant(&mut self, grant: &ResourceRolePermission) -> Result<()> {
        self.exec(
            "INSERT INTO resource_role_permissions (resource_id, role_id, level, tenant_id)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (resource_id, role_id) DO UPDATE SET
                level = excluded.level,
                tenant_id = excluded.tenant_id",
            params![
                grant.resource_id.0.as_slice(),
                grant.role_id.0.as_slice(),
                grant.level.as_str(),
                grant.tenant_id.0.as_slice(),
            ],
        )?;
        Ok(())
    }

    fn delete_role_grant(&mut self, resource: &ResourceId, role: &RoleId) -> Result<bool> {
        let n = self.exec(
            "DELETE FROM resource_role_permissions WHERE resource_id = ?1 AND role_id = ?2",
            params![resource.0.as_slice(), role.0.as_slice()],
        )?;
        Ok(n > 0)
    }

    fn role_grants_on(&self, resource: &ResourceId) -> Result<Vec<ResourceRolePermission>> {
        self.query_all(
            "SELECT resource_id, role_id, level, tenant_id FROM resource_role_permissions
             WHERE resource_id = ?1 ORDER BY role_id",
            params![resource.0.as_slice()],
            row_to_role_grant,
        )
    }

    fn role_grants_for_role(&self, role: &RoleId) -> Result<Vec<ResourceRolePermission>> {
        self.query_all(
            "SELECT resource_id, role_id, level, tenant_id FROM resource_role_permissions
             WHERE role_id = ?1 ORDER BY resource_id",
            params![role.0.as_slice()],
            row_to_role_grant,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use initiative_authz_core::{CapabilityKey, PermissionLevel, PlatformRole, ResourceKind};

    struct Seed {
        initiative: Initiative,
        member_role: InitiativeRole,
        principal: Principal,
        resource: Resource,
    }

    fn seed(tx: &mut dyn StoreTx) -> Result<Seed> {
        let tenant = Tenant::new("acme");
        let initiative = Initiative::new(tenant.id, "launch");
        let [pm_role, mut member_role] = InitiativeRole::builtin(initiative.id);
        member_role.set_toggle(CapabilityKey::CreateDocs, true);
        let principal = Principal::new("pia", PlatformRole::Member);
        let resource = Resource::new(ResourceKind::Document, &initiative, "notes");

        tx.insert_tenant(&tenant)?;
        tx.insert_initiative(&initiative)?;
        tx.upsert_role(&pm_role)?;
        tx.upsert_role(&member_role)?;
        tx.upsert_principal(&principal)?;
        tx.insert_resource(&resource)?;

        Ok(Seed {
            initiative,
            member_role,
            principal,
            resource,
        })
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let store = SqliteStore::open_memory().unwrap();
        let seed = store.atomic(|tx| seed(tx)).await.unwrap();

        let resource_id = seed.resource.id;
        let fetched = store
            .read(move |tx| tx.get_resource(&resource_id))
            .await
            .unwrap();
        assert_eq!(fetched, Some(seed.resource.clone()));

        let role_id = seed.member_role.id;
        let role = store
            .read(move |tx| tx.get_role(&role_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(role, seed.member_role);
        assert_eq!(role.toggle(CapabilityKey::CreateDocs), Some(true));

        let initiative = seed.initiative.id;
        let roles = store
            .read(move |tx| tx.roles_in_initiative(&initiative))
            .await
            .unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles[0].is_manager);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_constraint() {
        let store = SqliteStore::open_memory().unwrap();
        let seed = store.atomic(|tx| seed(tx)).await.unwrap();
        let resource = seed.resource.clone();

        let result: Result<()> = store
            .atomic(move |tx| {
                tx.upsert_user_grant(&ResourcePermission {
                    resource_id: resource.id,
                    principal_id: PrincipalId::generate(),
                    level: PermissionLevel::Read,
                    tenant_id: resource.tenant_id,
                })
            })
            .await;
        assert!(matches!(result, Err(StoreError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_failed_transaction_rolls_back() {
        let store = SqliteStore::open_memory().unwrap();
        let seed = store.atomic(|tx| seed(tx)).await.unwrap();
        let resource = seed.resource.clone();
        let principal = seed.principal.id;

        let result: Result<()> = store
            .atomic(move |tx| {
                tx.upsert_user_grant(&ResourcePermission {
                    resource_id: resource.id,
                    principal_id: principal,
                    level: PermissionLevel::Owner,
                    tenant_id: resource.tenant_id,
                })?;
                Err(StoreError::Constraint("abort".into()))
            })
            .await;
        assert!(result.is_err());

        let resource_id = seed.resource.id;
        let grants = store
            .read(move |tx| tx.user_grants_on(&resource_id))
            .await
            .unwrap();
        assert!(grants.is_empty());
    }

    #[tokio::test]
    async fn test_delete_resource_cascades_grants() {
        let store = SqliteStore::open_memory().unwrap();
        let seed = store.atomic(|tx| seed(tx)).await.unwrap();
        let resource = seed.resource.clone();
        let principal = seed.principal.id;
        let role = seed.member_role.id;

        let deleted: Result<bool> = store
            .atomic(move |tx| {
                tx.upsert_user_grant(&ResourcePermission {
                    resource_id: resource.id,
                    principal_id: principal,
                    level: PermissionLevel::Owner,
                    tenant_id: resource.tenant_id,
                })?;
                tx.upsert_role_grant(&ResourceRolePermission {
                    resource_id: resource.id,
                    role_id: role,
                    level: PermissionLevel::Read,
                    tenant_id: resource.tenant_id,
                })?;
                tx.delete_resource(&resource.id)
            })
            .await;
        assert!(deleted.unwrap());

        let role_grants = store
            .read(move |tx| tx.role_grants_for_role(&role))
            .await
            .unwrap();
        assert!(role_grants.is_empty());
    }

    #[tokio::test]
    async fn test_delete_role_guarded_by_membership() {
        let store = SqliteStore::open_memory().unwrap();
        let seed = store.atomic(|tx| seed(tx)).await.unwrap();
        let membership = InitiativeMembership {
            initiative_id: seed.initiative.id,
            principal_id: seed.principal.id,
            role_id: seed.member_role.id,
        };

        let result: Result<bool> = store
            .atomic(move |tx| {
                tx.upsert_membership(&membership)?;
                tx.delete_role(&membership.role_id)
            })
            .await;
        assert!(matches!(result, Err(StoreError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_resources_in_tenants_filters() {
        let store = SqliteStore::open_memory().unwrap();
        let seed = store.atomic(|tx| seed(tx)).await.unwrap();
        let tenant = seed.resource.tenant_id;

        let found = store
            .read(move |tx| tx.resources_in_tenants(&[tenant]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let none = store
            .read(move |tx| tx.resources_in_tenants(&[TenantId::generate()]))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authz.db");

        let resource_id = {
            let store = SqliteStore::open(&path).unwrap();
            let seed = store.atomic(|tx| seed(tx)).await.unwrap();
            seed.resource.id
        };

        let store = SqliteStore::open(&path).unwrap();
        let fetched = store
            .read(move |tx| tx.get_resource(&resource_id))
            .await
            .unwrap();
        assert!(fetched.is_some());
    }
}
