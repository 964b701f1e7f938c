//! Transition kinds, batch requests and the errors a batch can end in.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::audit::record::OperationType;
use crate::batch::gateway::{FieldSet, FieldUpdate, PublishState, StatePredicate};

/// Bulk state transitions, with stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Publish,
    Unpublish,
    Delete,
    SetPin,
    CancelPin,
    SetFeature,
    CancelFeature,
    MoveCategory,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 8] = [
        TransitionKind::Publish,
        TransitionKind::Unpublish,
        TransitionKind::Delete,
        TransitionKind::SetPin,
        TransitionKind::CancelPin,
        TransitionKind::SetFeature,
        TransitionKind::CancelFeature,
        TransitionKind::MoveCategory,
    ];

    pub const fn code(self) -> i64 {
        match self {
            TransitionKind::Publish => 1,
            TransitionKind::Unpublish => 2,
            TransitionKind::Delete => 3,
            TransitionKind::SetPin => 4,
            TransitionKind::CancelPin => 5,
            TransitionKind::SetFeature => 6,
            TransitionKind::CancelFeature => 7,
            TransitionKind::MoveCategory => 8,
        }
    }

    /// Wire name, shared with the audit operation type.
    pub const fn name(self) -> &'static str {
        self.operation_type().as_str()
    }

    pub const fn short_name(self) -> &'static str {
        match self {
            TransitionKind::Publish => "PUBLISH",
            TransitionKind::Unpublish => "UNPUBLISH",
            TransitionKind::Delete => "DELETE",
            TransitionKind::SetPin => "SET_PIN",
            TransitionKind::CancelPin => "CANCEL_PIN",
            TransitionKind::SetFeature => "SET_FEATURE",
            TransitionKind::CancelFeature => "CANCEL_FEATURE",
            TransitionKind::MoveCategory => "MOVE_CATEGORY",
        }
    }

    /// Human-readable label shown in the admin console and audit descriptions.
    pub const fn desc(self) -> &'static str {
        match self {
            TransitionKind::Publish => "批量发布",
            TransitionKind::Unpublish => "批量下架",
            TransitionKind::Delete => "批量删除",
            TransitionKind::SetPin => "批量置顶",
            TransitionKind::CancelPin => "取消置顶",
            TransitionKind::SetFeature => "批量精选",
            TransitionKind::CancelFeature => "取消精选",
            TransitionKind::MoveCategory => "分类移动",
        }
    }

    pub const fn operation_type(self) -> OperationType {
        match self {
            TransitionKind::Publish => OperationType::BatchPublish,
            TransitionKind::Unpublish => OperationType::BatchUnpublish,
            TransitionKind::Delete => OperationType::BatchDelete,
            TransitionKind::SetPin => OperationType::BatchSetTop,
            TransitionKind::CancelPin => OperationType::BatchCancelTop,
            TransitionKind::SetFeature => OperationType::BatchSetFeatured,
            TransitionKind::CancelFeature => OperationType::BatchCancelFeatured,
            TransitionKind::MoveCategory => OperationType::CategoryMove,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Which entities are eligible. `target_category` is only read for category moves.
    pub fn source_predicate(self, target_category: i64) -> StatePredicate {
        const PUBLISHABLE: &[PublishState] = &[PublishState::Draft, PublishState::Unpublished];
        const PUBLISHED: &[PublishState] = &[PublishState::Published];
        match self {
            TransitionKind::Publish => StatePredicate::StatusIn(PUBLISHABLE),
            TransitionKind::Unpublish => StatePredicate::StatusIn(PUBLISHED),
            TransitionKind::Delete => StatePredicate::NotDeleted,
            TransitionKind::SetPin => StatePredicate::Pinned(false),
            TransitionKind::CancelPin => StatePredicate::Pinned(true),
            TransitionKind::SetFeature => StatePredicate::Featured(false),
            TransitionKind::CancelFeature => StatePredicate::Featured(true),
            TransitionKind::MoveCategory => StatePredicate::CategoryNot(target_category),
        }
    }

    /// Column changes for this transition; the modification time is always `now`.
    pub fn field_set(self, request: &BatchTransitionRequest, now: DateTime<Utc>) -> FieldSet {
        let updates = match self {
            TransitionKind::Publish => vec![
                FieldUpdate::Status(PublishState::Published),
                FieldUpdate::PublishedAt(request.publish_time.unwrap_or(now)),
            ],
            TransitionKind::Unpublish => vec![FieldUpdate::Status(PublishState::Unpublished)],
            TransitionKind::Delete => vec![FieldUpdate::Deleted(true)],
            TransitionKind::SetPin => vec![FieldUpdate::Pinned(true)],
            TransitionKind::CancelPin => vec![FieldUpdate::Pinned(false)],
            TransitionKind::SetFeature => vec![FieldUpdate::Featured(true)],
            TransitionKind::CancelFeature => vec![FieldUpdate::Featured(false)],
            TransitionKind::MoveCategory => request
                .target_category_id
                .map(FieldUpdate::Category)
                .into_iter()
                .collect(),
        };
        FieldSet {
            updates,
            updated_at: now,
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transition kind: {0}")]
pub struct UnknownTransition(pub String);

impl FromStr for TransitionKind {
    type Err = UnknownTransition;

    /// Accepts the wire name, the short name, or the numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return Self::from_code(code).ok_or_else(|| UnknownTransition(s.to_owned()));
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s) || kind.short_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownTransition(s.to_owned()))
    }
}

/// Serialized as `{ name, value, desc }` so audit expressions can reach the label.
impl Serialize for TransitionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TransitionKind", 3)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("value", &self.code())?;
        state.serialize_field("desc", self.desc())?;
        state.end()
    }
}

/// Transition kind as sent by clients: a name or a numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TransitionInput {
    Code(i64),
    Name(String),
}

impl TryFrom<&TransitionInput> for TransitionKind {
    type Error = UnknownTransition;

    fn try_from(input: &TransitionInput) -> Result<Self, Self::Error> {
        match input {
            TransitionInput::Code(code) => {
                Self::from_code(*code).ok_or_else(|| UnknownTransition(code.to_string()))
            }
            TransitionInput::Name(name) => name.parse(),
        }
    }
}

/// Request body of a batch endpoint, before the transition kind is resolved.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCommand {
    #[serde(default)]
    pub ids: Vec<i64>,
    pub operation_type: Option<TransitionInput>,
    pub target_category_id: Option<i64>,
    pub publish_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// A resolved batch request. Never persisted; serialized only for audit expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTransitionRequest {
    pub ids: Vec<i64>,
    #[serde(rename = "operationType")]
    pub transition: TransitionKind,
    pub target_category_id: Option<i64>,
    pub publish_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl BatchTransitionRequest {
    pub fn new(transition: TransitionKind, ids: Vec<i64>) -> Self {
        Self {
            ids,
            transition,
            target_category_id: None,
            publish_time: None,
            reason: None,
        }
    }

    pub fn target_category(mut self, category_id: i64) -> Self {
        self.target_category_id = Some(category_id);
        self
    }

    pub fn publish_time(mut self, at: DateTime<Utc>) -> Self {
        self.publish_time = Some(at);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl TryFrom<BatchCommand> for BatchTransitionRequest {
    type Error = BatchError;

    fn try_from(command: BatchCommand) -> Result<Self, Self::Error> {
        let transition = match command.operation_type {
            Some(ref input) => TransitionKind::try_from(input)
                .map_err(|e| BatchError::UnsupportedTransition(e.0))?,
            None => return Err(BatchError::UnsupportedTransition("missing".to_owned())),
        };
        Ok(Self {
            ids: command.ids,
            transition,
            target_category_id: command.target_category_id,
            publish_time: command.publish_time,
            reason: command.reason.filter(|r| !r.trim().is_empty()),
        })
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("target id list must not be empty")]
    EmptyTargets,
    #[error("target ids must be positive, got {0:?}")]
    InvalidIds(Vec<i64>),
    #[error("unsupported transition kind: {0}")]
    UnsupportedTransition(String),
    #[error("target category is required for {0}")]
    MissingTargetCategory(TransitionKind),
    #[error("{field} is not accepted for {transition}")]
    ForbiddenAuxiliary {
        field: &'static str,
        transition: TransitionKind,
    },
    #[error("none of the {requested} requested targets are eligible for {transition}")]
    NoEligibleTargets {
        transition: TransitionKind,
        requested: usize,
    },
    #[error("batch update failed")]
    UpdateFailed,
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl BatchError {
    /// True for errors raised before any storage access.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BatchError::EmptyTargets
                | BatchError::InvalidIds(_)
                | BatchError::UnsupportedTransition(_)
                | BatchError::MissingTargetCategory(_)
                | BatchError::ForbiddenAuxiliary { .. }
        )
    }
}
