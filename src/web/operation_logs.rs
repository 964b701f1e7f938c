//! Admin handlers for querying and purging the operation audit trail.
//!
//! All endpoints require the `AdminUser` extractor.

use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, trace};
use ts_rs::TS;

use crate::audit::record::{AuditRecord, OperationType, TargetType};
use crate::audit::retention::{self, DEFAULT_RETAIN_DAYS};
use crate::audit::store::{AuditFilter, OperationStat, PageRequest, DEFAULT_PER_PAGE};
use crate::state::AppState;
use crate::web::auth::AdminUser;
use crate::web::error::{ApiError, db_error};

/// Statistics cover this many days when no start time is given.
const DEFAULT_STATISTICS_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuditLogEntry {
    #[ts(type = "number")]
    pub id: i64,
    pub operation_type: String,
    pub description: String,
    #[ts(type = "number | null")]
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub user_role: Option<String>,
    pub target_type: String,
    #[ts(type = "number[] | null")]
    pub target_ids: Option<Vec<i64>>,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub request_method: Option<String>,
    pub request_url: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub outcome: String,
    pub error_message: Option<String>,
    #[ts(type = "number")]
    pub execution_time_ms: i64,
    pub reason: Option<String>,
    pub extra: Value,
    pub created_at: String,
}

impl From<AuditRecord> for AuditLogEntry {
    fn from(record: AuditRecord) -> Self {
        Self {
            id: record.id,
            operation_type: record.operation_type,
            description: record.description,
            user_id: record.requester_id,
            username: record.requester_name,
            user_role: record.requester_role,
            target_type: record.target_type,
            target_ids: record.target_ids,
            before_state: record.before_state,
            after_state: record.after_state,
            request_method: record.request_method,
            request_url: record.request_url,
            ip_address: record.caller_ip,
            user_agent: record.caller_agent,
            outcome: record.outcome.as_str().to_owned(),
            error_message: record.error_message,
            execution_time_ms: record.execution_time_ms,
            reason: record.reason,
            extra: Value::Object(record.extra),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OperationLogPage {
    pub items: Vec<AuditLogEntry>,
    #[ts(type = "number")]
    pub total: i64,
    #[ts(type = "number")]
    pub page: i64,
    #[ts(type = "number")]
    pub per_page: i64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OperationStatEntry {
    pub operation_type: String,
    pub target_type: String,
    #[ts(type = "number")]
    pub total: i64,
    #[ts(type = "number")]
    pub failures: i64,
}

impl From<OperationStat> for OperationStatEntry {
    fn from(stat: OperationStat) -> Self {
        Self {
            operation_type: stat.operation_type,
            target_type: stat.target_type,
            total: stat.total,
            failures: stat.failures,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StatisticsResponse {
    pub start_time: String,
    pub end_time: String,
    pub stats: Vec<OperationStatEntry>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserCountResponse {
    #[ts(type = "number")]
    pub user_id: i64,
    #[ts(type = "number")]
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurgeResponse {
    #[ts(type = "number")]
    pub retain_days: i64,
    #[ts(type = "number")]
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub user_id: Option<i64>,
    pub operation_type: Option<String>,
    pub target_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCountParams {
    pub user_id: i64,
    pub operation_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeParams {
    pub retain_days: Option<i64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

fn check_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<(), ApiError> {
    if let (Some(start), Some(end)) = (start, end)
        && start >= end
    {
        return Err(ApiError::bad_request("startTime must be before endTime"));
    }
    Ok(())
}

/// Midnight UTC of the day containing `now`.
fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// `GET /api/admin/operation-logs`
///
/// Paginated, filtered audit records, newest first.
#[instrument(skip_all)]
pub async fn list_operation_logs(
    AdminUser(_user): AdminUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<OperationLogPage>, ApiError> {
    check_range(params.start_time, params.end_time)?;
    let filter = AuditFilter {
        user_id: params.user_id,
        operation_type: non_blank(params.operation_type),
        target_type: non_blank(params.target_type),
        start_time: params.start_time,
        end_time: params.end_time,
    };
    let page = PageRequest::new(
        params.page.unwrap_or(1),
        params.per_page.unwrap_or(DEFAULT_PER_PAGE),
    );

    let result = state
        .audit_store
        .query(&filter, page)
        .await
        .map_err(|e| db_error("list operation logs", e))?;

    trace!(count = result.items.len(), total = result.total, "Listed operation logs");
    Ok(Json(OperationLogPage {
        items: result.items.into_iter().map(AuditLogEntry::from).collect(),
        total: result.total,
        page: result.page,
        per_page: result.per_page,
    }))
}

/// `GET /api/admin/operation-logs/statistics`
///
/// Counts per operation, last week by default.
#[instrument(skip_all)]
pub async fn operation_statistics(
    AdminUser(_user): AdminUser,
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let now = Utc::now();
    let start = params
        .start_time
        .unwrap_or(now - Duration::days(DEFAULT_STATISTICS_DAYS));
    let end = params.end_time.unwrap_or(now);
    check_range(Some(start), Some(end))?;

    let stats = state
        .audit_store
        .statistics(start, end)
        .await
        .map_err(|e| db_error("compute operation statistics", e))?;

    Ok(Json(StatisticsResponse {
        start_time: start.to_rfc3339(),
        end_time: end.to_rfc3339(),
        stats: stats.into_iter().map(OperationStatEntry::from).collect(),
    }))
}

/// `GET /api/admin/operation-logs/user-count`
///
/// One user's operations, today by default.
#[instrument(skip_all, fields(user_id = params.user_id))]
pub async fn user_operation_count(
    AdminUser(_user): AdminUser,
    State(state): State<AppState>,
    Query(params): Query<UserCountParams>,
) -> Result<Json<UserCountResponse>, ApiError> {
    let now = Utc::now();
    let start = params.start_time.unwrap_or_else(|| start_of_day(now));
    let end = params.end_time.unwrap_or(now);
    check_range(Some(start), Some(end))?;

    let filter = AuditFilter {
        user_id: Some(params.user_id),
        operation_type: non_blank(params.operation_type),
        target_type: None,
        start_time: Some(start),
        end_time: Some(end),
    };
    let count = state
        .audit_store
        .count(&filter)
        .await
        .map_err(|e| db_error("count user operations", e))?;

    Ok(Json(UserCountResponse {
        user_id: params.user_id,
        count,
    }))
}

/// `DELETE /api/admin/operation-logs/expired`
///
/// Purge records older than `retainDays`.
#[instrument(skip_all)]
pub async fn purge_expired_logs(
    AdminUser(user): AdminUser,
    State(state): State<AppState>,
    Query(params): Query<PurgeParams>,
) -> Result<Json<PurgeResponse>, ApiError> {
    let retain_days = params.retain_days.unwrap_or(DEFAULT_RETAIN_DAYS);
    let deleted = retention::purge_expired(state.audit_store.as_ref(), retain_days).await?;
    info!(user_id = user.id, retain_days, deleted, "Operation logs purged by admin");
    Ok(Json(PurgeResponse {
        retain_days,
        deleted,
    }))
}

/// `GET /api/admin/operation-logs/operation-types`
#[instrument(skip_all)]
pub async fn operation_types(AdminUser(_user): AdminUser) -> Json<Vec<&'static str>> {
    Json(OperationType::ALL.iter().map(|t| t.as_str()).collect())
}

/// `GET /api/admin/operation-logs/target-types`
#[instrument(skip_all)]
pub async fn target_types(AdminUser(_user): AdminUser) -> Json<Vec<&'static str>> {
    Json(TargetType::ALL.iter().map(|t| t.as_str()).collect())
}
