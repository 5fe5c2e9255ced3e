//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::info!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Grant tables carry a denormalized `tenant_id` so the isolation filter is
/// a single indexed predicate.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE tenants (
            id BLOB PRIMARY KEY,              -- 16 bytes
            name TEXT NOT NULL
        );

        CREATE TABLE principals (
            id BLOB PRIMARY KEY,
            display_name TEXT NOT NULL,
            platform_role TEXT NOT NULL CHECK (platform_role IN ('admin', 'member'))
        );

        CREATE TABLE tenant_memberships (
            tenant_id BLOB NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            principal_id BLOB NOT NULL REFERENCES principals(id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK (role IN ('admin', 'member')),
            PRIMARY KEY (tenant_id, principal_id)
        );

        CREATE TABLE initiatives (
            id BLOB PRIMARY KEY,
            tenant_id BLOB NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL
        );

        CREATE TABLE initiative_roles (
            id BLOB PRIMARY KEY,
            initiative_id BLOB NOT NULL REFERENCES initiatives(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            is_manager INTEGER NOT NULL,
            position INTEGER NOT NULL,
            UNIQUE (initiative_id, name)
        );

        CREATE TABLE role_permission_toggles (
            role_id BLOB NOT NULL REFERENCES initiative_roles(id) ON DELETE CASCADE,
            capability_key TEXT NOT NULL,
            enabled INTEGER NOT NULL,
            PRIMARY KEY (role_id, capability_key)
        );

        -- role_id has no cascade: a role must be unassigned before deletion
        CREATE TABLE initiative_memberships (
            initiative_id BLOB NOT NULL REFERENCES initiatives(id) ON DELETE CASCADE,
            principal_id BLOB NOT NULL REFERENCES principals(id) ON DELETE CASCADE,
            role_id BLOB NOT NULL REFERENCES initiative_roles(id),
            PRIMARY KEY (initiative_id, principal_id)
        );

        CREATE TABLE resources (
            id BLOB PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('project', 'document', 'queue')),
            initiative_id BLOB NOT NULL REFERENCES initiatives(id) ON DELETE CASCADE,
            tenant_id BLOB NOT NULL REFERENCES tenants(id),
            name TEXT NOT NULL
        );

        CREATE TABLE resource_permissions (
            resource_id BLOB NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
            principal_id BLOB NOT NULL REFERENCES principals(id) ON DELETE CASCADE,
            level TEXT NOT NULL CHECK (level IN ('read', 'write', 'owner')),
            tenant_id BLOB NOT NULL,
            PRIMARY KEY (resource_id, principal_id)
        );

        CREATE TABLE resource_role_permissions (
            resource_id BLOB NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
            role_id BLOB NOT NULL REFERENCES initiative_roles(id) ON DELETE CASCADE,
            level TEXT NOT NULL CHECK (level IN ('read', 'write', 'owner')),
            tenant_id BLOB NOT NULL,
            PRIMARY KEY (resource_id, role_id)
        );

        CREATE INDEX idx_tenant_memberships_principal ON tenant_memberships(principal_id);
        CREATE INDEX idx_initiatives_tenant ON initiatives(tenant_id);
        CREATE INDEX idx_initiative_roles_initiative ON initiative_roles(initiative_id, position);
        CREATE INDEX idx_initiative_memberships_principal ON initiative_memberships(principal_id);
        CREATE INDEX idx_initiative_memberships_role ON initiative_memberships(role_id);
        CREATE INDEX idx_resources_tenant ON resources(tenant_id);
        CREATE INDEX idx_resources_initiative ON resources(initiative_id);
        CREATE INDEX idx_resource_permissions_tenant ON resource_permissions(tenant_id);
        CREATE INDEX idx_resource_permissions_principal ON resource_permissions(principal_id);
        CREATE INDEX idx_resource_role_permissions_tenant ON resource_role_permissions(tenant_id);
        CREATE INDEX idx_resource_role_permissions_role ON resource_role_permissions(role_id);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "tenants",
            "principals",
            "tenant_memberships",
            "initiatives",
            "initiative_roles",
            "role_permission_toggles",
            "initiative_memberships",
            "resources",
            "resource_permissions",
            "resource_role_permissions",
            "schema_migrations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_unreadable_version_is_an_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_migrations (version TEXT, applied_at INTEGER);
             INSERT INTO schema_migrations VALUES ('v1', 0);",
        )
        .unwrap();

        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));

        // Nothing was applied on top of the unreadable history.
        let tenants: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='tenants'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tenants, 0);
    }
}
