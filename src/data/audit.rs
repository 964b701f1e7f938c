//! Postgres-backed audit store over the `operation_logs` table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::audit::record::{AuditRecord, NewAuditRecord, Outcome};
use crate::audit::store::{AuditFilter, AuditStore, OperationStat, Page, PageRequest};

const LOG_SELECT: &str = "SELECT id, operation_type, description, user_id, username, user_role, \
            target_type, target_ids, before_data, after_data, request_method, request_url, \
            ip_address, user_agent, status, error_message, execution_time, reason, extra_data, \
            create_time \
     FROM operation_logs";

/// Every filter is nullable; binding `NULL` disables it.
const LOG_FILTER: &str = "WHERE ($1::bigint IS NULL OR user_id = $1) \
       AND ($2::text IS NULL OR operation_type = $2) \
       AND ($3::text IS NULL OR target_type = $3) \
       AND ($4::timestamptz IS NULL OR create_time >= $4) \
       AND ($5::timestamptz IS NULL OR create_time < $5)";

#[derive(sqlx::FromRow)]
struct LogRow {
    id: i64,
    operation_type: String,
    description: String,
    user_id: Option<i64>,
    username: Option<String>,
    user_role: Option<String>,
    target_type: String,
    target_ids: Option<Value>,
    before_data: Option<Value>,
    after_data: Option<Value>,
    request_method: Option<String>,
    request_url: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    status: i16,
    error_message: Option<String>,
    execution_time: i64,
    reason: Option<String>,
    extra_data: Value,
    create_time: DateTime<Utc>,
}

impl From<LogRow> for AuditRecord {
    fn from(row: LogRow) -> Self {
        let target_ids = row
            .target_ids
            .and_then(|ids| serde_json::from_value::<Vec<i64>>(ids).ok());
        let extra = match row.extra_data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: row.id,
            operation_type: row.operation_type,
            description: row.description,
            requester_id: row.user_id,
            requester_name: row.username,
            requester_role: row.user_role,
            target_type: row.target_type,
            target_ids,
            before_state: row.before_data,
            after_state: row.after_data,
            request_method: row.request_method,
            request_url: row.request_url,
            caller_ip: row.ip_address,
            caller_agent: row.user_agent,
            outcome: Outcome::from_status_code(row.status),
            error_message: row.error_message,
            execution_time_ms: row.execution_time,
            reason: row.reason,
            extra,
            created_at: row.create_time,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatRow {
    operation_type: String,
    target_type: String,
    total: i64,
    failures: i64,
}

pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, record: NewAuditRecord) -> Result<AuditRecord> {
        let (user_id, username, user_role) = match record.requester {
            Some(ref p) => (Some(p.id), p.username.clone(), p.role.clone()),
            None => (None, None, None),
        };

        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO operation_logs (operation_type, description, user_id, username, user_role, \
                target_type, target_ids, before_data, after_data, request_method, request_url, \
                ip_address, user_agent, status, error_message, execution_time, reason, extra_data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING id, create_time",
        )
        .bind(&record.operation_type)
        .bind(&record.description)
        .bind(user_id)
        .bind(username)
        .bind(user_role)
        .bind(&record.target_type)
        .bind(record.target_ids.as_ref().map(Json))
        .bind(record.before_state.as_ref())
        .bind(record.after_state.as_ref())
        .bind(record.provenance.method.as_deref())
        .bind(record.provenance.url.as_deref())
        .bind(record.provenance.ip.as_deref())
        .bind(record.provenance.user_agent.as_deref())
        .bind(record.outcome().status_code())
        .bind(record.error_message())
        .bind(record.execution_time_ms)
        .bind(record.reason.as_deref())
        .bind(Json(&record.extra))
        .fetch_one(&self.pool)
        .await
        .context("failed to insert operation log")?;

        Ok(AuditRecord::from_new(id, created_at, record))
    }

    async fn query(&self, filter: &AuditFilter, page: PageRequest) -> Result<Page<AuditRecord>> {
        let rows: Vec<LogRow> = sqlx::query_as(&format!(
            "{LOG_SELECT} {LOG_FILTER} ORDER BY create_time DESC, id DESC LIMIT $6 OFFSET $7"
        ))
        .bind(filter.user_id)
        .bind(filter.operation_type.as_deref())
        .bind(filter.target_type.as_deref())
        .bind(filter.start_time)
        .bind(filter.end_time)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .context("failed to query operation logs")?;

        let total = self.count(filter).await?;
        Ok(Page {
            items: rows.into_iter().map(AuditRecord::from).collect(),
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn count(&self, filter: &AuditFilter) -> Result<i64> {
        let (total,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM operation_logs {LOG_FILTER}"))
                .bind(filter.user_id)
                .bind(filter.operation_type.as_deref())
                .bind(filter.target_type.as_deref())
                .bind(filter.start_time)
                .bind(filter.end_time)
                .fetch_one(&self.pool)
                .await
                .context("failed to count operation logs")?;
        Ok(total)
    }

    async fn statistics(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<OperationStat>> {
        let rows: Vec<StatRow> = sqlx::query_as(
            "SELECT operation_type, target_type, COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE status = 0) AS failures \
             FROM operation_logs \
             WHERE create_time >= $1 AND create_time < $2 \
             GROUP BY operation_type, target_type \
             ORDER BY total DESC, operation_type",
        )
        .bind(start_time)
        .bind(end_time)
        .fetch_all(&self.pool)
        .await
        .context("failed to compute operation log statistics")?;

        Ok(rows
            .into_iter()
            .map(|row| OperationStat {
                operation_type: row.operation_type,
                target_type: row.target_type,
                total: row.total,
                failures: row.failures,
            })
            .collect())
    }

    async fn purge(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM operation_logs WHERE create_time < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .context("failed to purge operation logs")?;
        Ok(result.rows_affected())
    }
}
