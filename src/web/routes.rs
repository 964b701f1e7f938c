//! Web API router construction.

use axum::{
    Router,
    http::HeaderValue,
    response::Response,
    routing::{delete, get, post},
};

use std::time::Duration;

use crate::state::AppState;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::{articles, operation_logs, questions, status};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};

/// Cache-Control presets.
pub mod cache {
    /// Admin endpoints -- never cache.
    pub const ADMIN: &str = "private, no-store, must-revalidate";
}

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(status::health))
        .route("/articles/batch", post(articles::batch_articles))
        .route("/articles/{id}", delete(articles::delete_article))
        .route(
            "/interview-questions/batch",
            post(questions::batch_questions),
        )
        .with_state(app_state.clone());

    let admin_router = Router::new()
        .route(
            "/admin/operation-logs",
            get(operation_logs::list_operation_logs),
        )
        .route(
            "/admin/operation-logs/statistics",
            get(operation_logs::operation_statistics),
        )
        .route(
            "/admin/operation-logs/user-count",
            get(operation_logs::user_operation_count),
        )
        .route(
            "/admin/operation-logs/expired",
            delete(operation_logs::purge_expired_logs),
        )
        .route(
            "/admin/operation-logs/operation-types",
            get(operation_logs::operation_types),
        )
        .route(
            "/admin/operation-logs/target-types",
            get(operation_logs::target_types),
        )
        .layer(axum::middleware::map_response(
            |mut resp: Response| async move {
                resp.headers_mut().insert(
                    axum::http::header::CACHE_CONTROL,
                    HeaderValue::from_static(cache::ADMIN),
                );
                resp
            },
        ))
        .with_state(app_state);

    Router::new()
        .nest("/api", api_router)
        .nest("/api", admin_router)
        .layer((
            // Outermost: per-request ID span + severity-proportional response logging.
            RequestIdLayer,
            CompressionLayer::new()
                .zstd(true)
                .br(true)
                .gzip(true)
                .quality(tower_http::CompressionLevel::Fastest),
            TimeoutLayer::new(Duration::from_secs(60)),
        ))
}
