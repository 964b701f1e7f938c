//! Audited interview question batch handler.

use axum::extract::State;
use axum::response::Json;
use tracing::instrument;

use crate::audit::{AuditLevel, AuditSpec, Invocation, OperationType, TargetType};
use crate::batch::{BatchCommand, BatchOutcome, BatchTransitionRequest, EntityKind, EntitySnapshot};
use crate::state::AppState;
use crate::web::auth::AdminUser;
use crate::web::error::ApiError;
use crate::web::provenance::RequestMeta;

const BATCH_AUDIT: AuditSpec =
    AuditSpec::new(OperationType::BatchOperation, TargetType::InterviewQuestion)
        .description_expr("'批量操作: ' + #dto.operationType.desc")
        .target_ids("#dto.ids")
        .reason("#dto.reason")
        .record_states(true, true)
        .level(AuditLevel::Important);

/// `POST /api/interview-questions/batch`
#[instrument(skip_all)]
pub async fn batch_questions(
    AdminUser(user): AdminUser,
    State(state): State<AppState>,
    RequestMeta(provenance): RequestMeta,
    Json(command): Json<BatchCommand>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let request = BatchTransitionRequest::try_from(command)?;
    let capture =
        EntitySnapshot::new(state.batch.gateway().clone(), EntityKind::InterviewQuestion);
    let invocation = Invocation::new("batch_questions")
        .param("dto", &request)
        .principal(Some(user))
        .provenance(provenance);

    let outcome = state
        .interceptor
        .intercept(
            &BATCH_AUDIT,
            invocation,
            Some(&capture),
            state.batch.execute(EntityKind::InterviewQuestion, &request),
        )
        .await?;
    Ok(Json(outcome))
}
