//! Health handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use tracing::{trace, warn};
use ts_rs::TS;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HealthResponse {
    status: HealthStatus,
    database: bool,
    version: String,
    commit: String,
    timestamp: String,
}

/// `GET /api/health`
///
/// Liveness plus a database round trip.
pub(super) async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    trace!("health check requested");
    let database = match crate::data::ping(&state.db_pool).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = ?e, "Database ping failed during health check");
            false
        }
    };
    let (code, status) = if database {
        (StatusCode::OK, HealthStatus::Healthy)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Degraded)
    };

    (
        code,
        Json(HealthResponse {
            status,
            database,
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: env!("GIT_COMMIT_SHORT").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}
