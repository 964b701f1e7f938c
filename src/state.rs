//! Application state shared across handlers and background tasks.

use sqlx::PgPool;
use std::sync::Arc;

use crate::audit::{AuditStore, OperationInterceptor, PrincipalResolver};
use crate::batch::{BatchEngine, PersistenceGateway};
use crate::data::{PgAuditStore, PgGateway, PgPrincipalResolver};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub principals: Arc<dyn PrincipalResolver>,
    pub audit_store: Arc<dyn AuditStore>,
    pub batch: BatchEngine,
    pub interceptor: OperationInterceptor,
}

impl AppState {
    /// Wire every seam to its Postgres implementation.
    pub fn new(db_pool: PgPool) -> Self {
        Self::from_parts(
            db_pool.clone(),
            Arc::new(PgPrincipalResolver::new(db_pool.clone())),
            Arc::new(PgGateway::new(db_pool.clone())),
            Arc::new(PgAuditStore::new(db_pool)),
        )
    }

    /// Assemble state from explicit seams, e.g. in-memory fakes.
    pub fn from_parts(
        db_pool: PgPool,
        principals: Arc<dyn PrincipalResolver>,
        gateway: Arc<dyn PersistenceGateway>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            db_pool,
            principals,
            batch: BatchEngine::new(gateway),
            interceptor: OperationInterceptor::new(audit_store.clone()),
            audit_store,
        }
    }
}
