//! Integration tests for schema routing using in-memory SurrealDB.
//!
//! Most pools here hold a single session so that every operation provably
//! reuses the same connection; the concurrency test runs tenants in
//! parallel over several sessions.

use std::time::Duration;

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tenantry_core::error::TenantryError;
use tenantry_core::models::tenant::{CreateTenant, Tenant};
use tenantry_core::models::user::{CreateUser, Role};
use tenantry_core::repository::Pagination;
use tenantry_db::repository::{SurrealTenantRepository, SurrealUserRepository};
use tenantry_db::{SchemaBinding, SchemaPool, SchemaRouter, SchemaTarget, TenantLifecycleManager};
use tokio::task::JoinSet;
use uuid::Uuid;

const NS: &str = "tenantry";

async fn setup_pool(
    sessions: usize,
    acquire_timeout: Duration,
) -> (Surreal<Db>, SchemaRouter<Db>, TenantLifecycleManager<Db>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns(NS).use_db("public").await.unwrap();
    tenantry_db::run_migrations(&db).await.unwrap();

    let sessions = (0..sessions).map(|_| db.clone()).collect();
    let router = SchemaRouter::new(SchemaPool::new(sessions, NS, acquire_timeout));
    let lifecycle = TenantLifecycleManager::new(router.clone());
    (db, router, lifecycle)
}

async fn setup_with_timeout(
    acquire_timeout: Duration,
) -> (Surreal<Db>, SchemaRouter<Db>, TenantLifecycleManager<Db>) {
    setup_pool(1, acquire_timeout).await
}

async fn setup() -> (Surreal<Db>, SchemaRouter<Db>, TenantLifecycleManager<Db>) {
    setup_with_timeout(Duration::from_secs(5)).await
}

async fn create_tenant(lifecycle: &TenantLifecycleManager<Db>, schema: &str) -> Tenant {
    lifecycle
        .create_tenant(CreateTenant::new(schema.to_uppercase(), schema))
        .await
        .unwrap()
}

fn new_user(tenant_id: Uuid, username: &str) -> CreateUser {
    CreateUser {
        tenant_id,
        username: username.into(),
        password: "correct horse".into(),
        role: Role::Employee,
    }
}

#[tokio::test]
async fn one_connection_serves_tenants_in_turn_without_leaking() {
    let (_db, router, lifecycle) = setup().await;
    let acme = create_tenant(&lifecycle, "acme").await;
    let globex = create_tenant(&lifecycle, "globex").await;

    let acme_id = acme.id;
    let (acme_conn, acme_binding) = router
        .with_tenant_schema(acme_id, |lease| async move {
            SurrealUserRepository::scoped(&lease)?
                .create(new_user(acme_id, "alice"))
                .await?;
            Ok((lease.connection_id(), lease.binding().clone()))
        })
        .await
        .unwrap();

    let (globex_conn, globex_binding, lookup) = router
        .with_tenant_schema(globex.id, |lease| async move {
            let lookup = SurrealUserRepository::scoped(&lease)?
                .get_by_username("alice")
                .await;
            Ok((lease.connection_id(), lease.binding().clone(), lookup))
        })
        .await
        .unwrap();

    assert_eq!(acme_conn, globex_conn, "pool of one must reuse its session");
    assert_eq!(
        acme_binding,
        SchemaBinding::Tenant {
            tenant_id: acme.id,
            schema: "acme".into()
        }
    );
    assert_eq!(
        globex_binding,
        SchemaBinding::Tenant {
            tenant_id: globex.id,
            schema: "globex".into()
        }
    );
    assert!(matches!(lookup, Err(TenantryError::NotFound { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tenants_never_see_each_others_rows() {
    let (_db, router, lifecycle) = setup_pool(4, Duration::from_secs(30)).await;
    let mut tenants = Vec::new();
    for schema in ["acme", "globex", "initech"] {
        tenants.push(create_tenant(&lifecycle, schema).await);
    }

    let mut tasks = JoinSet::new();
    for tenant in &tenants {
        for i in 0..9 {
            let router = router.clone();
            let tenant_id = tenant.id;
            let username = format!("{}-{i}", tenant.schema_name);
            let prefix = format!("{}-", tenant.schema_name);
            tasks.spawn(async move {
                router
                    .with_tenant_schema(tenant_id, |lease| async move {
                        SurrealUserRepository::scoped(&lease)?
                            .create(new_user(tenant_id, &username))
                            .await
                    })
                    .await?;
                let seen = router
                    .with_tenant_schema(tenant_id, |lease| async move {
                        SurrealUserRepository::scoped(&lease)?
                            .list(Pagination { offset: 0, limit: 100 })
                            .await
                    })
                    .await?;
                for user in &seen.items {
                    assert_eq!(user.tenant_id, tenant_id);
                    assert!(user.username.starts_with(&prefix), "{}", user.username);
                }
                Ok::<_, TenantryError>(())
            });
        }
    }
    for outcome in tasks.join_all().await {
        outcome.unwrap();
    }

    for tenant in &tenants {
        let tenant_id = tenant.id;
        let users = router
            .with_tenant_schema(tenant_id, |lease| async move {
                SurrealUserRepository::scoped(&lease)?
                    .list(Pagination { offset: 0, limit: 100 })
                    .await
            })
            .await
            .unwrap();
        assert_eq!(users.total, 9);
    }
    assert_eq!(router.pool().available(), 4);
}

#[tokio::test]
async fn unknown_tenant_is_not_found() {
    let (_db, router, _lifecycle) = setup().await;
    let err = router
        .acquire(SchemaTarget::Tenant(Uuid::new_v4()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TenantryError::NotFound { .. }));
}

#[tokio::test]
async fn dropped_schema_fails_closed() {
    let (db, router, lifecycle) = setup().await;
    let acme = create_tenant(&lifecycle, "acme").await;

    // Simulate an operator dropping the database behind the registry's back.
    db.query("USE NS tenantry; REMOVE DATABASE acme;")
        .await
        .unwrap()
        .check()
        .unwrap();

    let err = router
        .acquire(SchemaTarget::Tenant(acme.id))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TenantryError::Infrastructure(_)), "{err}");
    assert_eq!(router.pool().available(), 1);
}

#[tokio::test]
async fn foreign_marker_fails_closed() {
    let (db, router, lifecycle) = setup().await;
    let acme = create_tenant(&lifecycle, "acme").await;
    let globex = create_tenant(&lifecycle, "globex").await;

    db.query(
        "USE NS tenantry DB acme; \
         UPDATE schema_binding:identity SET tenant_id = $other;",
    )
    .bind(("other", globex.id.to_string()))
    .await
    .unwrap()
    .check()
    .unwrap();

    let err = router
        .acquire(SchemaTarget::Tenant(acme.id))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TenantryError::Infrastructure(_)), "{err}");
}

#[tokio::test]
async fn public_fallback_only_when_requested() {
    let (_db, router, _lifecycle) = setup().await;
    let missing = Uuid::new_v4();

    assert!(router.acquire(SchemaTarget::Tenant(missing)).await.is_err());

    let lease = router
        .acquire(SchemaTarget::TenantOrPublic(missing))
        .await
        .unwrap();
    assert_eq!(lease.binding(), &SchemaBinding::Public);
    assert!(lease.tenant_scope().is_err());
}

#[tokio::test]
async fn tenant_or_public_prefers_the_tenant() {
    let (_db, router, lifecycle) = setup().await;
    let acme = create_tenant(&lifecycle, "acme").await;

    let binding = router
        .with_tenant_or_public_schema(acme.id, |lease| async move {
            Ok(lease.binding().clone())
        })
        .await
        .unwrap();
    assert!(matches!(binding, SchemaBinding::Tenant { tenant_id, .. } if tenant_id == acme.id));
}

#[tokio::test]
async fn cancelled_operation_releases_its_connection() {
    let (_db, router, lifecycle) = setup().await;
    let acme = create_tenant(&lifecycle, "acme").await;

    let slow = router.with_tenant_schema(acme.id, |_lease| async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    });
    assert!(
        tokio::time::timeout(Duration::from_millis(100), slow)
            .await
            .is_err()
    );

    assert_eq!(router.pool().available(), 1);
    let lease = router.acquire(SchemaTarget::Tenant(acme.id)).await.unwrap();
    assert_eq!(lease.tenant_scope().unwrap(), acme.id);
}

#[tokio::test]
async fn exhausted_pool_times_out_with_infrastructure_error() {
    let (_db, router, _lifecycle) = setup_with_timeout(Duration::from_millis(50)).await;

    let held = router.acquire(SchemaTarget::Public).await.unwrap();
    let err = router.acquire(SchemaTarget::Public).await.err().unwrap();
    assert!(matches!(err, TenantryError::Infrastructure(_)));
    assert!(!err.is_recoverable());

    drop(held);
    assert!(router.acquire(SchemaTarget::Public).await.is_ok());
}

#[tokio::test]
async fn repositories_refuse_the_wrong_binding() {
    let (_db, router, lifecycle) = setup().await;
    let acme = create_tenant(&lifecycle, "acme").await;

    let public = router.acquire(SchemaTarget::Public).await.unwrap();
    assert!(SurrealUserRepository::scoped(&public).is_err());
    assert!(SurrealTenantRepository::scoped(&public).is_ok());
    drop(public);

    let tenant = router.acquire(SchemaTarget::Tenant(acme.id)).await.unwrap();
    assert!(SurrealTenantRepository::scoped(&tenant).is_err());
    assert!(SurrealUserRepository::scoped(&tenant).is_ok());
}
