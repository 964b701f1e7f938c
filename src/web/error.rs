//! JSON error responses for API handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::{error, warn};
use ts_rs::TS;

use crate::audit::retention::RetentionError;
use crate::batch::BatchError;

/// Wire body of every error response.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "PARAM_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code.to_owned(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Log a storage failure under `context` and hide its details from the client.
pub fn db_error(context: &str, e: anyhow::Error) -> ApiError {
    error!(error = ?e, "Failed to {context}");
    ApiError::internal_error(format!("failed to {context}"))
}

impl From<BatchError> for ApiError {
    fn from(e: BatchError) -> Self {
        let message = e.to_string();
        match e {
            BatchError::EmptyTargets => {
                ApiError::new(StatusCode::BAD_REQUEST, "BATCH_OPERATION_EMPTY_LIST", message)
            }
            BatchError::InvalidIds(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "BATCH_OPERATION_INVALID_IDS", message)
            }
            BatchError::UnsupportedTransition(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "BATCH_OPERATION_INVALID_TYPE", message)
            }
            BatchError::MissingTargetCategory(_) | BatchError::ForbiddenAuxiliary { .. } => {
                ApiError::bad_request(message)
            }
            BatchError::NoEligibleTargets { .. } => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "NO_ELIGIBLE_TARGETS", message)
            }
            BatchError::UpdateFailed => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "BATCH_OPERATION_FAILED",
                message,
            ),
            BatchError::Persistence(e) => {
                error!(error = ?e, "Batch transition failed in storage");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "BATCH_OPERATION_FAILED",
                    "batch update failed",
                )
            }
        }
    }
}

impl From<RetentionError> for ApiError {
    fn from(e: RetentionError) -> Self {
        match e {
            RetentionError::BelowFloor(days) => {
                warn!(days, "Rejected retention purge below floor");
                ApiError::bad_request(RetentionError::BelowFloor(days).to_string())
            }
            RetentionError::OutOfRange(days) => {
                warn!(days, "Rejected retention purge beyond representable range");
                ApiError::bad_request(RetentionError::OutOfRange(days).to_string())
            }
            RetentionError::Store(e) => db_error("purge expired operation logs", e),
        }
    }
}
