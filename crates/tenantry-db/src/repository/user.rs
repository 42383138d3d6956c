//! Users of one tenant, stored in that tenant's database.
//!
//! Password hashing uses Argon2id with OWASP-recommended parameters
//! (memory: 19 MiB, iterations: 2, parallelism: 1). Salt is randomly
//! generated per hash. An optional pepper (server-side secret) is
//! prepended to the password.
//!
//! Usernames stay reserved after a soft delete: the uniqueness check and
//! the unique index both see deleted rows.

use std::str::FromStr;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use surrealdb::Connection;
use surrealdb_types::SurrealValue;
use tenantry_core::error::TenantryResult;
use tenantry_core::models::user::{CreateUser, Role, UpdateUser, User, UserCredentials};
use tenantry_core::repository::{CredentialStore, PaginatedResult, Pagination};
use uuid::Uuid;

use crate::error::DbError;
use crate::filter::RowFilter;
use crate::pool::SchemaLease;
use crate::router::SchemaRouter;

#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    tenant_id: String,
    username: String,
    password_hash: String,
    role: String,
    deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRowWithId {
    /// Decode, refusing rows whose tenant does not own this schema.
    fn try_into_user(self, schema_tenant: Uuid) -> Result<User, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Corrupt(format!("invalid UUID: {e}")))?;
        let tenant_id = Uuid::parse_str(&self.tenant_id)
            .map_err(|e| DbError::Corrupt(format!("invalid tenant UUID: {e}")))?;
        if tenant_id != schema_tenant {
            return Err(DbError::Corrupt(format!(
                "user {id} belongs to tenant {tenant_id}, found in schema of {schema_tenant}"
            )));
        }
        let role = Role::from_str(&self.role)
            .map_err(|_| DbError::Corrupt(format!("unknown role: {}", self.role)))?;
        Ok(User {
            id,
            tenant_id,
            username: self.username,
            password_hash: self.password_hash,
            role,
            deleted: self.deleted,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Hash a password with Argon2id using OWASP-recommended parameters.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, DbError> {
    // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| DbError::Hash(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| DbError::Hash(format!("password hash error: {e}")))?;

    Ok(hash.to_string())
}

/// User queries on a lease bound to one tenant's database.
pub struct SurrealUserRepository<'a, C: Connection> {
    lease: &'a SchemaLease<C>,
    tenant_id: Uuid,
    pepper: Option<&'a str>,
}

impl<'a, C: Connection> SurrealUserRepository<'a, C> {
    pub fn scoped(lease: &'a SchemaLease<C>) -> TenantryResult<Self> {
        let tenant_id = lease.tenant_scope()?;
        Ok(Self {
            lease,
            tenant_id,
            pepper: None,
        })
    }

    pub fn with_pepper(mut self, pepper: Option<&'a str>) -> Self {
        self.pepper = pepper;
        self
    }

    async fn select(
        &self,
        from: &str,
        filter: RowFilter,
        binds: Vec<(&'static str, String)>,
    ) -> Result<Vec<User>, DbError> {
        let query = format!("SELECT meta::id(id) AS record_id, * FROM {from}{}", filter.to_sql());
        let mut builder = self.lease.db().query(&query);
        for bind in binds {
            builder = builder.bind(bind);
        }
        let mut result = builder.await?;
        let rows: Vec<UserRowWithId> = result.take(0)?;
        rows.into_iter()
            .map(|row| row.try_into_user(self.tenant_id))
            .collect()
    }

    async fn select_one(
        &self,
        from: &str,
        filter: RowFilter,
        binds: Vec<(&'static str, String)>,
        missing: impl FnOnce() -> DbError,
    ) -> Result<User, DbError> {
        self.select(from, filter, binds)
            .await?
            .into_iter()
            .next()
            .ok_or_else(missing)
    }

    pub async fn create(&self, input: CreateUser) -> TenantryResult<User> {
        input.validate()?;
        let username = input.username.trim().to_string();

        let taken = self
            .select(
                "user",
                RowFilter::including_deleted().and("username = $username"),
                vec![("username", username.clone())],
            )
            .await?;
        if !taken.is_empty() {
            return Err(DbError::Conflict {
                entity: "user".into(),
                field: "username".into(),
            }
            .into());
        }

        let id = Uuid::new_v4();
        let password_hash = hash_password(&input.password, self.pepper)?;

        self.lease
            .db()
            .query(
                "CREATE type::record('user', $id) SET \
                 tenant_id = $tenant_id, username = $username, \
                 password_hash = $password_hash, role = $role, \
                 deleted = false, deleted_at = NONE",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", self.tenant_id.to_string()))
            .bind(("username", username))
            .bind(("password_hash", password_hash))
            .bind(("role", input.role.as_str().to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Conflict {
                entity: "user".into(),
                field: format!("username ({e})"),
            })?;

        self.get(id).await
    }

    /// Live user by id.
    pub async fn get(&self, id: Uuid) -> TenantryResult<User> {
        Ok(self
            .select_one(
                "type::record('user', $id)",
                RowFilter::live(),
                vec![("id", id.to_string())],
                || DbError::not_found("user", id),
            )
            .await?)
    }

    pub async fn get_by_username(&self, username: &str) -> TenantryResult<User> {
        Ok(self
            .select_one(
                "user",
                RowFilter::live().and("username = $username"),
                vec![("username", username.to_string())],
                || DbError::not_found("user", format!("username={username}")),
            )
            .await?)
    }

    pub async fn update(&self, id: Uuid, input: UpdateUser) -> TenantryResult<User> {
        input.validate()?;
        self.get(id).await?;

        let mut sets = Vec::new();
        if input.role.is_some() {
            sets.push("role = $role");
        }
        if input.password.is_some() {
            sets.push("password_hash = $password_hash");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('user', $id) SET {} \
             WHERE deleted = false",
            sets.join(", ")
        );

        let mut builder = self.lease.db().query(&query).bind(("id", id.to_string()));
        if let Some(role) = input.role {
            builder = builder.bind(("role", role.as_str().to_string()));
        }
        if let Some(password) = &input.password {
            builder = builder.bind(("password_hash", hash_password(password, self.pepper)?));
        }

        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::query)?;

        self.get(id).await
    }

    /// Mark a live user deleted. A second delete is `NotFound`, also when
    /// two deletes race: only the one whose update matched a live row wins.
    pub async fn soft_delete(&self, id: Uuid) -> TenantryResult<User> {
        let user = self.get(id).await?;
        let mut result = self
            .lease
            .db()
            .query(
                "UPDATE type::record('user', $id) SET \
                 deleted = true, deleted_at = time::now(), \
                 updated_at = time::now() \
                 WHERE deleted = false RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::query)?;
        let changed: Vec<surrealdb_types::Value> = result.take(0).map_err(DbError::from)?;
        if changed.is_empty() {
            return Err(DbError::not_found("user", id).into());
        }
        Ok(user)
    }

    pub async fn list(&self, pagination: Pagination) -> TenantryResult<PaginatedResult<User>> {
        let total = self.count_live().await?;

        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM user{} \
             ORDER BY created_at ASC LIMIT $limit START $offset",
            RowFilter::live().to_sql()
        );
        let mut result = self
            .lease
            .db()
            .query(&query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UserRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_user(self.tenant_id))
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    /// Users counted against the tenant quota.
    pub async fn count_live(&self) -> TenantryResult<u64> {
        let query = format!(
            "SELECT count() AS total FROM user{} GROUP ALL",
            RowFilter::live().to_sql()
        );
        let mut result = self.lease.db().query(&query).await.map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    pub async fn credentials(&self, username: &str) -> TenantryResult<UserCredentials> {
        let user = self.get_by_username(username).await?;
        Ok(UserCredentials {
            user_id: user.id,
            tenant_id: user.tenant_id,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
        })
    }
}

/// [`CredentialStore`] over tenant databases.
pub struct SurrealCredentialStore<C: Connection> {
    router: SchemaRouter<C>,
}

impl<C: Connection> Clone for SurrealCredentialStore<C> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
        }
    }
}

impl<C: Connection> SurrealCredentialStore<C> {
    pub fn new(router: SchemaRouter<C>) -> Self {
        Self { router }
    }
}

impl<C: Connection> CredentialStore for SurrealCredentialStore<C> {
    async fn find_credentials(
        &self,
        tenant_id: Uuid,
        username: &str,
    ) -> TenantryResult<UserCredentials> {
        let username = username.to_string();
        self.router
            .with_tenant_schema(tenant_id, |lease| async move {
                SurrealUserRepository::scoped(&lease)?
                    .credentials(&username)
                    .await
            })
            .await
    }
}
