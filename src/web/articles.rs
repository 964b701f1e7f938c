//! Audited article mutation handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use tracing::instrument;

use crate::audit::{AuditLevel, AuditSpec, Invocation, OperationType, TargetType};
use crate::batch::{
    BatchCommand, BatchError, BatchOutcome, BatchTransitionRequest, EntityKind, EntitySnapshot,
    TransitionKind,
};
use crate::state::AppState;
use crate::web::auth::AdminUser;
use crate::web::error::ApiError;
use crate::web::provenance::RequestMeta;

const BATCH_AUDIT: AuditSpec = AuditSpec::new(OperationType::BatchOperation, TargetType::Article)
    .description_expr("'批量操作: ' + #dto.operationType.desc")
    .target_ids("#dto.ids")
    .reason("#dto.reason")
    .record_states(true, true)
    .record_result(true)
    .level(AuditLevel::Important);

const DELETE_AUDIT: AuditSpec = AuditSpec::new(OperationType::DeleteArticle, TargetType::Article)
    .description("删除文章")
    .target_ids("{#id}")
    .record_states(true, false);

/// `POST /api/articles/batch`
///
/// Apply one transition to many articles.
#[instrument(skip_all)]
pub async fn batch_articles(
    AdminUser(user): AdminUser,
    State(state): State<AppState>,
    RequestMeta(provenance): RequestMeta,
    Json(command): Json<BatchCommand>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let request = BatchTransitionRequest::try_from(command)?;
    let capture = EntitySnapshot::new(state.batch.gateway().clone(), EntityKind::Article);
    let invocation = Invocation::new("batch_articles")
        .param("dto", &request)
        .principal(Some(user))
        .provenance(provenance);

    let outcome = state
        .interceptor
        .intercept(
            &BATCH_AUDIT,
            invocation,
            Some(&capture),
            state.batch.execute(EntityKind::Article, &request),
        )
        .await?;
    Ok(Json(outcome))
}

/// `DELETE /api/articles/{id}`
///
/// Logically delete one article.
#[instrument(skip_all, fields(article_id = id))]
pub async fn delete_article(
    AdminUser(user): AdminUser,
    State(state): State<AppState>,
    RequestMeta(provenance): RequestMeta,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let request = BatchTransitionRequest::new(TransitionKind::Delete, vec![id]);
    let capture = EntitySnapshot::new(state.batch.gateway().clone(), EntityKind::Article);
    let invocation = Invocation::new("delete_article")
        .param("id", &id)
        .principal(Some(user))
        .provenance(provenance);

    state
        .interceptor
        .intercept(
            &DELETE_AUDIT,
            invocation,
            Some(&capture),
            state.batch.execute(EntityKind::Article, &request),
        )
        .await
        .map_err(|e| match e {
            BatchError::NoEligibleTargets { .. } => ApiError::not_found("article not found"),
            other => other.into(),
        })?;
    Ok(StatusCode::NO_CONTENT)
}
