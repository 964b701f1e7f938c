//! Append-only audit storage contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::record::{AuditRecord, NewAuditRecord, Outcome};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// Filters for audit queries. `None` disables a filter.
///
/// The time range is half-open: `start_time <= created_at < end_time`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub user_id: Option<i64>,
    pub operation_type: Option<String>,
    pub target_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(user_id) = self.user_id
            && record.requester_id != Some(user_id)
        {
            return false;
        }
        if let Some(ref op) = self.operation_type
            && &record.operation_type != op
        {
            return false;
        }
        if let Some(ref target) = self.target_type
            && &record.target_type != target
        {
            return false;
        }
        if let Some(start) = self.start_time
            && record.created_at < start
        {
            return false;
        }
        if let Some(end) = self.end_time
            && record.created_at >= end
        {
            return false;
        }
        true
    }
}

/// 1-based page request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// Rows to skip. Saturates for absurd page numbers, which then simply yield an empty page.
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Per operation/target counts over a time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStat {
    pub operation_type: String,
    pub target_type: String,
    pub total: i64,
    pub failures: i64,
}

/// Aggregate `records` into [`OperationStat`]s, ordered by descending total.
pub fn tally<'a>(records: impl IntoIterator<Item = &'a AuditRecord>) -> Vec<OperationStat> {
    let mut stats: Vec<OperationStat> = Vec::new();
    for record in records {
        let failed = i64::from(record.outcome == Outcome::Failure);
        match stats.iter_mut().find(|s| {
            s.operation_type == record.operation_type && s.target_type == record.target_type
        }) {
            Some(stat) => {
                stat.total += 1;
                stat.failures += failed;
            }
            None => stats.push(OperationStat {
                operation_type: record.operation_type.clone(),
                target_type: record.target_type.clone(),
                total: 1,
                failures: failed,
            }),
        }
    }
    stats.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.operation_type.cmp(&b.operation_type))
    });
    stats
}

/// Durable, append-only home for audit records.
///
/// There is deliberately no update operation: a record is immutable once appended.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist `record`, assigning its id and creation time.
    async fn append(&self, record: NewAuditRecord) -> anyhow::Result<AuditRecord>;

    /// Matching records, newest first.
    async fn query(&self, filter: &AuditFilter, page: PageRequest)
    -> anyhow::Result<Page<AuditRecord>>;

    async fn count(&self, filter: &AuditFilter) -> anyhow::Result<i64>;

    async fn statistics(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> anyhow::Result<Vec<OperationStat>>;

    /// Delete every record created strictly before `before`.
    async fn purge(&self, before: DateTime<Utc>) -> anyhow::Result<u64>;
}
