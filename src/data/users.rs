//! User lookups backing principal resolution.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::audit::principal::{Principal, PrincipalResolver};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    role: String,
}

/// Fetch a user's identity by id.
pub async fn find_principal(pool: &PgPool, user_id: i64) -> Result<Option<Principal>> {
    let row: Option<UserRow> = sqlx::query_as("SELECT id, username, role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to look up user")?;
    Ok(row.map(|row| Principal {
        id: row.id,
        username: Some(row.username),
        role: Some(row.role),
    }))
}

pub struct PgPrincipalResolver {
    pool: PgPool,
}

impl PgPrincipalResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalResolver for PgPrincipalResolver {
    async fn resolve(&self, user_id: i64) -> Result<Option<Principal>> {
        find_principal(&self.pool, user_id).await
    }
}
