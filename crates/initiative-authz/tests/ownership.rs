//! Ownership transfer when members leave, and the last-owner guard.

use initiative_authz::coordinator::on_membership_removed;
use initiative_authz::core::{Principal, Resource, ResourcePermission};
use initiative_authz::store::Store;
use initiative_authz::{EngineError, PermissionLevel, ResourceId, TenantRole, TransferReport};
use initiative_authz_testkit::TestFixture;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A project whose only owner is a new plain member called `name`.
async fn owned_by<S: Store>(fx: &TestFixture<S>, name: &str) -> (Principal, Resource) {
    let admin = fx.admin_identity();
    let project = fx.project("site").await;
    let dan = fx.member(name, &fx.member_role).await;

    fx.engine
        .grant_user(&admin, project.id, dan.id, PermissionLevel::Owner)
        .await
        .unwrap();
    assert!(fx
        .engine
        .revoke_user(&admin, project.id, fx.admin.id)
        .await
        .unwrap());
    (dan, project)
}

async fn removal_moves_ownership_to_managers<S: Store>(fx: TestFixture<S>) {
    init_tracing();
    let (dan, project) = owned_by(&fx, "dan").await;
    let pam = fx.member("pam", &fx.manager_role).await;
    assert_eq!(fx.reachable_level(&fx.admin, &project).await.unwrap(), None);

    let report = fx
        .engine
        .remove_initiative_member(&fx.admin_identity(), fx.initiative.id, dan.id)
        .await
        .unwrap();

    assert_eq!(report.revoked, vec![(project.id, dan.id)]);
    let mut granted: Vec<_> = report.granted.iter().map(|(_, p)| *p).collect();
    granted.sort();
    let mut expected = vec![fx.admin.id, pam.id];
    expected.sort();
    assert_eq!(granted, expected);
    assert!(report.ownerless.is_empty());

    assert_eq!(fx.reachable_level(&dan, &project).await.unwrap(), None);
    assert_eq!(fx.level(&pam, &project).await, Some(PermissionLevel::Owner));
    assert_eq!(
        fx.level(&fx.admin, &project).await,
        Some(PermissionLevel::Owner)
    );
}

#[tokio::test]
async fn test_removal_moves_ownership_to_managers_memory() {
    removal_moves_ownership_to_managers(TestFixture::new().await).await;
}

#[tokio::test]
async fn test_removal_moves_ownership_to_managers_sqlite() {
    removal_moves_ownership_to_managers(TestFixture::sqlite().await).await;
}

async fn grants_on<S: Store>(
    fx: &TestFixture<S>,
    resource: ResourceId,
) -> Vec<ResourcePermission> {
    fx.engine
        .store()
        .read(move |tx| tx.user_grants_on(&resource))
        .await
        .unwrap()
}

async fn transfer_is_idempotent<S: Store>(fx: TestFixture<S>) {
    let (dan, project) = owned_by(&fx, "dan").await;
    let initiative = fx.initiative.id;
    let leaver = dan.id;

    let (first, second) = fx
        .engine
        .store()
        .atomic(move |tx| {
            tx.delete_membership(&initiative, &leaver)?;
            let first = on_membership_removed(tx, &initiative, &leaver)?;
            let second = on_membership_removed(tx, &initiative, &leaver)?;
            Ok::<_, EngineError>((first, second))
        })
        .await
        .unwrap();
    assert!(!first.is_empty());
    assert_eq!(second, TransferReport::default());
    let once = grants_on(&fx, project.id).await;

    // A third run in its own transaction changes nothing either.
    let third = fx
        .engine
        .store()
        .atomic(move |tx| on_membership_removed(tx, &initiative, &leaver))
        .await
        .unwrap();
    assert!(third.is_empty());
    assert_eq!(grants_on(&fx, project.id).await, once);
}

#[tokio::test]
async fn test_transfer_is_idempotent_memory() {
    transfer_is_idempotent(TestFixture::new().await).await;
}

#[tokio::test]
async fn test_transfer_is_idempotent_sqlite() {
    transfer_is_idempotent(TestFixture::sqlite().await).await;
}

#[tokio::test]
async fn test_no_manager_leaves_resource_ownerless() {
    init_tracing();
    let fx = TestFixture::new().await;
    let project = fx.project("site").await;

    // The admin is the only manager and the only owner. Leaving is allowed.
    let report = fx
        .engine
        .remove_initiative_member(&fx.admin_identity(), fx.initiative.id, fx.admin.id)
        .await
        .unwrap();
    assert_eq!(report.revoked, vec![(project.id, fx.admin.id)]);
    assert!(report.granted.is_empty());
    assert_eq!(report.ownerless.len(), 1);
    assert_eq!(report.ownerless[0].resource_id, project.id);
    assert_eq!(report.ownerless[0].initiative_id, fx.initiative.id);
    assert_eq!(fx.reachable_level(&fx.admin, &project).await.unwrap(), None);

    // A new manager picks it up on repair.
    let pam = fx.member("pam", &fx.manager_role).await;
    let report = fx
        .engine
        .repair_ownership(&fx.admin_identity(), fx.initiative.id)
        .await
        .unwrap();
    assert_eq!(report.granted, vec![(project.id, pam.id)]);
    assert_eq!(fx.level(&pam, &project).await, Some(PermissionLevel::Owner));

    let again = fx
        .engine
        .repair_ownership(&fx.admin_identity(), fx.initiative.id)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_remove_tenant_member_transfers_every_initiative() {
    let fx = TestFixture::new().await;
    let (dan, project) = owned_by(&fx, "dan").await;

    let report = fx
        .engine
        .remove_tenant_member(&fx.admin_identity(), dan.id)
        .await
        .unwrap();
    assert_eq!(report.revoked, vec![(project.id, dan.id)]);
    assert_eq!(report.granted, vec![(project.id, fx.admin.id)]);

    let err = fx.engine.open_context(&fx.identity(&dan)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    let err = fx
        .engine
        .remove_tenant_member(&fx.admin_identity(), dan.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

async fn tenant_exit_drops_grants_outside_memberships<S: Store>(fx: TestFixture<S>) {
    init_tracing();
    let admin = fx.admin_identity();
    let site = fx.project("site").await;
    let roadmap = fx.project("roadmap").await;

    // vic is in the tenant but never joined the initiative.
    let vic = fx.user("vic").await;
    fx.engine
        .grant_user(&admin, site.id, vic.id, PermissionLevel::Owner)
        .await
        .unwrap();
    fx.engine
        .grant_user(&admin, roadmap.id, vic.id, PermissionLevel::Write)
        .await
        .unwrap();
    fx.engine
        .revoke_user(&admin, site.id, fx.admin.id)
        .await
        .unwrap();

    let report = fx
        .engine
        .remove_tenant_member(&admin, vic.id)
        .await
        .unwrap();
    assert_eq!(report.revoked, vec![(site.id, vic.id)]);
    assert_eq!(report.granted, vec![(site.id, fx.admin.id)]);
    assert!(report.ownerless.is_empty());
    assert_eq!(
        fx.reachable_level(&fx.admin, &site).await.unwrap(),
        Some(PermissionLevel::Owner)
    );

    let repaired = fx
        .engine
        .repair_ownership(&admin, fx.initiative.id)
        .await
        .unwrap();
    assert!(repaired.is_empty());

    // Rejoining the tenant starts from nothing.
    fx.engine
        .add_tenant_member(&admin, vic.id, TenantRole::Member)
        .await
        .unwrap();
    assert_eq!(fx.reachable_level(&vic, &site).await.unwrap(), None);
    assert_eq!(fx.reachable_level(&vic, &roadmap).await.unwrap(), None);
}

#[tokio::test]
async fn test_tenant_exit_drops_grants_outside_memberships_memory() {
    tenant_exit_drops_grants_outside_memberships(TestFixture::new().await).await;
}

#[tokio::test]
async fn test_tenant_exit_drops_grants_outside_memberships_sqlite() {
    tenant_exit_drops_grants_outside_memberships(TestFixture::sqlite().await).await;
}

#[tokio::test]
async fn test_last_owner_guard() {
    let fx = TestFixture::new().await;
    let admin = fx.admin_identity();
    let project = fx.project("site").await;

    let err = fx
        .engine
        .revoke_user(&admin, project.id, fx.admin.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LastOwner(id) if id == project.id));
    assert_eq!(err.status_code(), 409);

    let err = fx
        .engine
        .grant_user(&admin, project.id, fx.admin.id, PermissionLevel::Write)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LastOwner(_)));
    assert_eq!(
        fx.level(&fx.admin, &project).await,
        Some(PermissionLevel::Owner)
    );

    // A role that makes its holders owners counts.
    fx.engine
        .grant_role(&admin, project.id, fx.manager_role.id, PermissionLevel::Owner)
        .await
        .unwrap();
    assert!(fx
        .engine
        .revoke_user(&admin, project.id, fx.admin.id)
        .await
        .unwrap());
    assert_eq!(
        fx.level(&fx.admin, &project).await,
        Some(PermissionLevel::Owner)
    );
}

#[tokio::test]
async fn test_change_member_role_repairs_lost_ownership() {
    let fx = TestFixture::new().await;
    let admin = fx.admin_identity();
    let project = fx.project("site").await;

    let leads = fx
        .engine
        .create_role(&admin, fx.initiative.id, "lead", false)
        .await
        .unwrap();
    let lena = fx.member("lena", &leads).await;
    fx.engine
        .grant_role(&admin, project.id, leads.id, PermissionLevel::Owner)
        .await
        .unwrap();
    fx.engine
        .revoke_user(&admin, project.id, fx.admin.id)
        .await
        .unwrap();

    // lena's ownership was role-derived only.
    let report = fx
        .engine
        .change_member_role(&admin, fx.initiative.id, lena.id, fx.member_role.id)
        .await
        .unwrap();
    assert_eq!(report.granted, vec![(project.id, fx.admin.id)]);
    assert_eq!(fx.reachable_level(&lena, &project).await.unwrap(), None);
    assert_eq!(
        fx.level(&fx.admin, &project).await,
        Some(PermissionLevel::Owner)
    );
}
