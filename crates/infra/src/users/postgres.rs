//! Postgres-backed credential store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `DuplicateEmail` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed / Io / other | N/A | `Backend` |
//!
//! Listing order is the `seq` column, i.e. insertion order.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::instrument;

use gatehouse_auth::{CredentialStore, NewUser, Role, StoreError, User, UserPatch, UserSummary};
use gatehouse_core::UserId;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `users` table when it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                seq           BIGSERIAL,
                id            UUID PRIMARY KEY,
                name          TEXT NOT NULL,
                email         TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role          TEXT NOT NULL CHECK (role IN ('user', 'admin')),
                created_at    TIMESTAMPTZ NOT NULL,
                updated_at    TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Release pooled connections; called on graceful shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self, user), err)]
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(UserId::new().as_uuid())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.unwrap_or_default().as_str())
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match map_sqlx_error("insert", e) {
                StoreError::DuplicateEmail(_) => StoreError::DuplicateEmail(user.email.clone()),
                other => other,
            })?;
        user_from_row(&row)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_email", e))?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    #[instrument(skip(self, patch), fields(user_id = %id), err)]
    async fn update_by_id(&self, id: UserId, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                password_hash = COALESCE($3, password_hash), \
                role = COALESCE($4, role), \
                updated_at = $5 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(patch.name)
            .bind(patch.password_hash)
            .bind(patch.role.map(|r| r.as_str()))
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_by_id", e))?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn list_all(&self) -> Result<Vec<UserSummary>, StoreError> {
        let rows = sqlx::query("SELECT name, email, role FROM users ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_all", e))?;
        rows.iter().map(summary_from_row).collect()
    }

    async fn list_paginated(
        &self,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<UserSummary>, u64), StoreError> {
        let offset = i64::try_from(skip).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            "SELECT name, email, role FROM users ORDER BY seq ASC OFFSET $1 LIMIT $2",
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_paginated", e))?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;

        let items = rows.iter().map(summary_from_row).collect::<Result<_, _>>()?;
        Ok((items, total.max(0) as u64))
    }
}

fn parse_role(raw: &str) -> Result<Role, StoreError> {
    Role::from_str(raw).map_err(|_| StoreError::Backend(format!("unknown role in users table: {raw}")))
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode user row: {e}"));
    let role: String = row.try_get("role").map_err(decode)?;
    Ok(User {
        id: UserId::from_uuid(row.try_get::<uuid::Uuid, _>("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        role: parse_role(&role)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(decode)?,
    })
}

fn summary_from_row(row: &PgRow) -> Result<UserSummary, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode user row: {e}"));
    let role: String = row.try_get("role").map_err(decode)?;
    Ok(UserSummary {
        name: row.try_get("name").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        role: parse_role(&role)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateEmail(String::new());
        }
        return StoreError::Backend(format!(
            "database error in {operation}: {}",
            db_err.message()
        ));
    }
    StoreError::Backend(format!("{operation} failed: {err}"))
}
