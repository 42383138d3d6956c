//! Integration tests for quota admission using in-memory SurrealDB.

use std::sync::Arc;
use std::time::Duration;

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tenantry_core::error::TenantryError;
use tenantry_core::models::quota::{QuotaDefaults, QuotaKind, QuotaLimit};
use tenantry_core::models::resource::CreateResource;
use tenantry_core::models::tenant::{CreateTenant, Tenant};
use tenantry_core::models::user::{CreateUser, Role, User};
use tenantry_db::repository::{SurrealResourceRepository, SurrealUserRepository};
use tenantry_db::{QuotaEnforcer, SchemaPool, SchemaRouter, TenantLifecycleManager};
use tokio::task::JoinSet;
use uuid::Uuid;

async fn setup(input: CreateTenant) -> (SchemaRouter<Db>, Tenant) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("tenantry").use_db("public").await.unwrap();
    tenantry_db::run_migrations(&db).await.unwrap();

    let sessions = (0..4).map(|_| db.clone()).collect();
    let router = SchemaRouter::new(SchemaPool::new(sessions, "tenantry", Duration::from_secs(30)));
    let tenant = TenantLifecycleManager::new(router.clone())
        .create_tenant(input)
        .await
        .unwrap();
    (router, tenant)
}

async fn create_user(
    router: &SchemaRouter<Db>,
    quota: &QuotaEnforcer,
    tenant_id: Uuid,
    username: &str,
) -> Result<User, TenantryError> {
    let username = username.to_string();
    router
        .with_tenant_schema(tenant_id, |lease| async move {
            let _reservation = quota.check_and_reserve(&lease, QuotaKind::User).await?;
            SurrealUserRepository::scoped(&lease)?
                .create(CreateUser {
                    tenant_id,
                    username,
                    password: "pw".into(),
                    role: Role::Employee,
                })
                .await
        })
        .await
}

#[tokio::test]
async fn user_quota_stops_at_the_limit() {
    let mut input = CreateTenant::new("Acme", "acme");
    input.max_users = Some(2);
    let (router, tenant) = setup(input).await;
    let quota = QuotaEnforcer::default();

    create_user(&router, &quota, tenant.id, "a").await.unwrap();
    create_user(&router, &quota, tenant.id, "b").await.unwrap();
    let err = create_user(&router, &quota, tenant.id, "c")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TenantryError::QuotaExceeded {
            limit: QuotaLimit::UsersPerTenant,
            max: 2
        }
    ));
    assert!(err.to_string().contains("users per tenant"));
}

#[tokio::test]
async fn soft_deleted_users_free_their_slot() {
    let mut input = CreateTenant::new("Acme", "acme");
    input.max_users = Some(1);
    let (router, tenant) = setup(input).await;
    let quota = QuotaEnforcer::default();

    let first = create_user(&router, &quota, tenant.id, "a").await.unwrap();
    assert!(create_user(&router, &quota, tenant.id, "b").await.is_err());

    router
        .with_tenant_schema(tenant.id, |lease| async move {
            SurrealUserRepository::scoped(&lease)?
                .soft_delete(first.id)
                .await
        })
        .await
        .unwrap();
    create_user(&router, &quota, tenant.id, "b").await.unwrap();
}

#[tokio::test]
async fn defaults_apply_when_the_tenant_sets_no_limit() {
    let (router, tenant) = setup(CreateTenant::new("Acme", "acme")).await;
    let quota = QuotaEnforcer::new(QuotaDefaults {
        max_users: 1,
        ..Default::default()
    });

    create_user(&router, &quota, tenant.id, "a").await.unwrap();
    assert!(matches!(
        create_user(&router, &quota, tenant.id, "b").await,
        Err(TenantryError::QuotaExceeded { max: 1, .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resource_creates_admit_exactly_the_limit() {
    let mut input = CreateTenant::new("Acme", "acme");
    input.max_resources = Some(3);
    input.max_resources_per_user = Some(100);
    let (router, tenant) = setup(input).await;
    let quota = Arc::new(QuotaEnforcer::default());
    let owner = create_user(&router, &quota, tenant.id, "owner")
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..10 {
        let router = router.clone();
        let quota = Arc::clone(&quota);
        let tenant_id = tenant.id;
        let owner_id = owner.id;
        tasks.spawn(async move {
            router
                .with_tenant_schema(tenant_id, |lease| async move {
                    let _reservation = quota
                        .check_and_reserve(&lease, QuotaKind::Resource { owner_id })
                        .await?;
                    SurrealResourceRepository::scoped(&lease)?
                        .create(
                            CreateResource {
                                tenant_id,
                                name: format!("doc-{i}"),
                                description: None,
                                owner_id: Some(owner_id),
                            },
                            owner_id,
                        )
                        .await
                })
                .await
        });
    }

    let mut admitted = 0;
    let mut rejected = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => admitted += 1,
            Err(TenantryError::QuotaExceeded {
                limit: QuotaLimit::ResourcesPerTenant,
                max: 3,
            }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(rejected, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_for_one_owner_stop_at_the_per_owner_limit() {
    let mut input = CreateTenant::new("Acme", "acme");
    input.max_resources_per_user = Some(3);
    let (router, tenant) = setup(input).await;
    let quota = Arc::new(QuotaEnforcer::default());
    let owner = create_user(&router, &quota, tenant.id, "owner")
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..12 {
        let router = router.clone();
        let quota = Arc::clone(&quota);
        let tenant_id = tenant.id;
        let owner_id = owner.id;
        tasks.spawn(async move {
            router
                .with_tenant_schema(tenant_id, |lease| async move {
                    let _reservation = quota
                        .check_and_reserve(&lease, QuotaKind::Resource { owner_id })
                        .await?;
                    SurrealResourceRepository::scoped(&lease)?
                        .create(
                            CreateResource {
                                tenant_id,
                                name: format!("doc-{i}"),
                                description: None,
                                owner_id: Some(owner_id),
                            },
                            owner_id,
                        )
                        .await
                })
                .await
        });
    }

    let outcomes = tasks.join_all().await;
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 3);
    assert!(outcomes.iter().filter_map(|r| r.as_ref().err()).all(|e| matches!(
        e,
        TenantryError::QuotaExceeded {
            limit: QuotaLimit::ResourcesPerUser,
            max: 3
        }
    )));

    let live = router
        .with_tenant_schema(tenant.id, |lease| async move {
            SurrealResourceRepository::scoped(&lease)?
                .count_live_by_owner(owner.id)
                .await
        })
        .await
        .unwrap();
    assert_eq!(live, 3);
}

#[tokio::test]
async fn per_owner_limit_is_independent_per_owner() {
    let mut input = CreateTenant::new("Acme", "acme");
    input.max_resources_per_user = Some(1);
    let (router, tenant) = setup(input).await;
    let quota = QuotaEnforcer::default();
    let alice = create_user(&router, &quota, tenant.id, "alice").await.unwrap();
    let bob = create_user(&router, &quota, tenant.id, "bob").await.unwrap();

    let create_for = |owner_id: Uuid| {
        let router = router.clone();
        let quota = &quota;
        let tenant_id = tenant.id;
        async move {
            router
                .with_tenant_schema(tenant_id, |lease| async move {
                    let _reservation = quota
                        .check_and_reserve(&lease, QuotaKind::Resource { owner_id })
                        .await?;
                    SurrealResourceRepository::scoped(&lease)?
                        .create(
                            CreateResource {
                                tenant_id,
                                name: "doc".into(),
                                description: None,
                                owner_id: Some(owner_id),
                            },
                            owner_id,
                        )
                        .await
                })
                .await
        }
    };

    create_for(alice.id).await.unwrap();
    assert!(matches!(
        create_for(alice.id).await,
        Err(TenantryError::QuotaExceeded {
            limit: QuotaLimit::ResourcesPerUser,
            max: 1
        })
    ));
    create_for(bob.id).await.unwrap();
}

#[tokio::test]
async fn reservation_requires_a_tenant_binding() {
    let (router, _tenant) = setup(CreateTenant::new("Acme", "acme")).await;
    let quota = QuotaEnforcer::default();
    let public = router
        .acquire(tenantry_db::SchemaTarget::Public)
        .await
        .unwrap();
    assert!(matches!(
        quota.check_and_reserve(&public, QuotaKind::User).await,
        Err(TenantryError::Infrastructure(_))
    ));
}
