//! Postgres implementations of the storage seams.

pub mod audit;
pub mod entities;
pub mod users;

use anyhow::Result;
use sqlx::PgPool;

pub use audit::PgAuditStore;
pub use entities::PgGateway;
pub use users::PgPrincipalResolver;

/// Verify the database connection is alive.
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
