//! The audit record and the wire constants it carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::audit::principal::{Principal, Provenance};

/// Stored error messages are capped at this many characters.
pub const ERROR_MESSAGE_LIMIT: usize = 1000;

/// Stored descriptions are capped at this many characters.
pub const DESCRIPTION_LIMIT: usize = 500;

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILURE",
        }
    }

    /// Persisted status column: 1 success, 0 failure.
    pub fn status_code(self) -> i16 {
        match self {
            Outcome::Success => 1,
            Outcome::Failure => 0,
        }
    }

    pub fn from_status_code(code: i16) -> Self {
        if code == 1 {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// Entity kinds an audit record can point at.
///
/// The string forms are consumed by downstream log tooling and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    Article,
    Category,
    Tag,
    User,
    Comment,
    System,
    InterviewQuestion,
}

impl TargetType {
    pub const ALL: [TargetType; 7] = [
        TargetType::Article,
        TargetType::Category,
        TargetType::Tag,
        TargetType::User,
        TargetType::Comment,
        TargetType::System,
        TargetType::InterviewQuestion,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TargetType::Article => "ARTICLE",
            TargetType::Category => "CATEGORY",
            TargetType::Tag => "TAG",
            TargetType::User => "USER",
            TargetType::Comment => "COMMENT",
            TargetType::System => "SYSTEM",
            TargetType::InterviewQuestion => "INTERVIEW_QUESTION",
        }
    }
}

/// Operation codes recorded in `operationType`. Stable wire strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    CreateArticle,
    UpdateArticle,
    DeleteArticle,
    BatchOperation,
    BatchDelete,
    BatchPublish,
    BatchUnpublish,
    BatchSetTop,
    BatchCancelTop,
    BatchSetFeatured,
    BatchCancelFeatured,
    CategoryMove,
}

impl OperationType {
    pub const ALL: [OperationType; 12] = [
        OperationType::CreateArticle,
        OperationType::UpdateArticle,
        OperationType::DeleteArticle,
        OperationType::BatchOperation,
        OperationType::BatchDelete,
        OperationType::BatchPublish,
        OperationType::BatchUnpublish,
        OperationType::BatchSetTop,
        OperationType::BatchCancelTop,
        OperationType::BatchSetFeatured,
        OperationType::BatchCancelFeatured,
        OperationType::CategoryMove,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            OperationType::CreateArticle => "CREATE_ARTICLE",
            OperationType::UpdateArticle => "UPDATE_ARTICLE",
            OperationType::DeleteArticle => "DELETE_ARTICLE",
            OperationType::BatchOperation => "BATCH_OPERATION",
            OperationType::BatchDelete => "BATCH_DELETE",
            OperationType::BatchPublish => "BATCH_PUBLISH",
            OperationType::BatchUnpublish => "BATCH_UNPUBLISH",
            OperationType::BatchSetTop => "BATCH_SET_TOP",
            OperationType::BatchCancelTop => "BATCH_CANCEL_TOP",
            OperationType::BatchSetFeatured => "BATCH_SET_FEATURED",
            OperationType::BatchCancelFeatured => "BATCH_CANCEL_FEATURED",
            OperationType::CategoryMove => "CATEGORY_MOVE",
        }
    }
}

/// Cap `text` at `limit` characters, marking the cut with `...`.
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(limit.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

/// Cap `message` at [`ERROR_MESSAGE_LIMIT`] characters.
pub fn truncate_message(message: &str) -> String {
    truncate_chars(message, ERROR_MESSAGE_LIMIT)
}

/// An audit record that has not been persisted yet.
///
/// Built once by the interceptor and handed to an [`AuditStore`](crate::audit::store::AuditStore);
/// `error_message` can only be set together with a failure outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    pub operation_type: String,
    pub description: String,
    pub requester: Option<Principal>,
    pub target_type: String,
    pub target_ids: Option<Vec<i64>>,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub provenance: Provenance,
    outcome: Outcome,
    error_message: Option<String>,
    pub execution_time_ms: i64,
    pub reason: Option<String>,
    pub extra: Map<String, Value>,
}

impl NewAuditRecord {
    /// A successful record; call [`with_failure`](Self::with_failure) to flip it.
    ///
    /// The description is capped at [`DESCRIPTION_LIMIT`] characters.
    pub fn new(
        operation_type: impl Into<String>,
        description: impl AsRef<str>,
        target_type: impl Into<String>,
    ) -> Self {
        Self {
            operation_type: operation_type.into(),
            description: truncate_chars(description.as_ref(), DESCRIPTION_LIMIT),
            requester: None,
            target_type: target_type.into(),
            target_ids: None,
            before_state: None,
            after_state: None,
            provenance: Provenance::default(),
            outcome: Outcome::Success,
            error_message: None,
            execution_time_ms: 0,
            reason: None,
            extra: Map::new(),
        }
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.outcome = Outcome::Failure;
        self.error_message = Some(truncate_message(message));
        self
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// A persisted, write-once audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: i64,
    pub operation_type: String,
    pub description: String,
    pub requester_id: Option<i64>,
    pub requester_name: Option<String>,
    pub requester_role: Option<String>,
    pub target_type: String,
    pub target_ids: Option<Vec<i64>>,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub request_method: Option<String>,
    pub request_url: Option<String>,
    pub caller_ip: Option<String>,
    pub caller_agent: Option<String>,
    pub outcome: Outcome,
    pub error_message: Option<String>,
    pub execution_time_ms: i64,
    pub reason: Option<String>,
    pub extra: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Materialize a pending record with the id and timestamp assigned by a store.
    pub fn from_new(id: i64, created_at: DateTime<Utc>, record: NewAuditRecord) -> Self {
        let (requester_id, requester_name, requester_role) = match record.requester {
            Some(p) => (Some(p.id), p.username, p.role),
            None => (None, None, None),
        };
        Self {
            id,
            operation_type: record.operation_type,
            description: record.description,
            requester_id,
            requester_name,
            requester_role,
            target_type: record.target_type,
            target_ids: record.target_ids,
            before_state: record.before_state,
            after_state: record.after_state,
            request_method: record.provenance.method,
            request_url: record.provenance.url,
            caller_ip: record.provenance.ip,
            caller_agent: record.provenance.user_agent,
            outcome: record.outcome,
            error_message: record.error_message,
            execution_time_ms: record.execution_time_ms,
            reason: record.reason,
            extra: record.extra,
            created_at,
        }
    }
}
