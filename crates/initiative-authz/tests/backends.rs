//! The memory and SQLite stores must agree on every decision.

use initiative_authz::store::Store;
use initiative_authz::{CapabilityKey, PermissionLevel, ResourceKind};
use initiative_authz_testkit::{AccessMatrix, TestFixture};

/// Build a small initiative with every kind of grant and return who can do
/// what.
async fn scenario<S: Store>(fx: TestFixture<S>) -> AccessMatrix {
    let admin = fx.admin_identity();

    let editors = fx
        .engine
        .create_role(&admin, fx.initiative.id, "editor", false)
        .await
        .unwrap();
    fx.engine
        .set_toggle(&admin, editors.id, CapabilityKey::CreateDocs, true)
        .await
        .unwrap();

    let site = fx.project("site").await;
    let roadmap = fx.project("roadmap").await;

    let eve = fx.member("eve", &editors).await;
    let max = fx.member("max", &fx.member_role).await;
    let pam = fx.member("pam", &fx.manager_role).await;
    let out = fx.user("out").await;

    let handbook = fx
        .engine
        .create_resource(
            &fx.identity(&eve),
            fx.initiative.id,
            ResourceKind::Document,
            "handbook",
        )
        .await
        .unwrap();

    fx.engine
        .grant_role(&admin, site.id, fx.member_role.id, PermissionLevel::Read)
        .await
        .unwrap();
    fx.engine
        .grant_role(&admin, site.id, editors.id, PermissionLevel::Write)
        .await
        .unwrap();
    fx.engine
        .grant_user(&admin, roadmap.id, max.id, PermissionLevel::Write)
        .await
        .unwrap();
    fx.engine
        .grant_user(&fx.identity(&eve), handbook.id, out.id, PermissionLevel::Read)
        .await
        .unwrap();

    // eve leaves; pam and the admin absorb the handbook.
    fx.engine
        .remove_initiative_member(&fx.identity(&eve), fx.initiative.id, eve.id)
        .await
        .unwrap();

    fx.access_matrix(
        &[&fx.admin, &eve, &max, &pam, &out],
        &[&site, &roadmap, &handbook],
    )
    .await
}

#[tokio::test]
async fn test_memory_and_sqlite_agree() {
    let memory = scenario(TestFixture::new().await).await;
    let sqlite = scenario(TestFixture::sqlite().await).await;

    assert_eq!(memory, sqlite);
    assert_eq!(memory.to_json(), sqlite.to_json());

    assert_eq!(memory.get("ada", "site"), Some(PermissionLevel::Owner));
    assert_eq!(memory.get("ada", "handbook"), Some(PermissionLevel::Owner));
    assert_eq!(memory.get("pam", "handbook"), Some(PermissionLevel::Owner));
    assert_eq!(memory.get("pam", "site"), None);
    assert_eq!(memory.get("eve", "site"), None);
    assert_eq!(memory.get("eve", "handbook"), None);
    assert_eq!(memory.get("max", "site"), Some(PermissionLevel::Read));
    assert_eq!(memory.get("max", "roadmap"), Some(PermissionLevel::Write));
    assert_eq!(memory.get("out", "handbook"), Some(PermissionLevel::Read));
    assert_eq!(memory.get("out", "site"), None);
}
