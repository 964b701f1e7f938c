//! The persistence seam the batch engine talks to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::record::TargetType;
use crate::batch::transition::TransitionKind;

/// Entity families that accept batch transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Article,
    /// Interview questions carry no pinned/featured flags.
    InterviewQuestion,
}

impl EntityKind {
    pub const fn target_type(self) -> TargetType {
        match self {
            EntityKind::Article => TargetType::Article,
            EntityKind::InterviewQuestion => TargetType::InterviewQuestion,
        }
    }

    pub fn supports(self, transition: TransitionKind) -> bool {
        match self {
            EntityKind::Article => true,
            EntityKind::InterviewQuestion => matches!(
                transition,
                TransitionKind::Publish
                    | TransitionKind::Unpublish
                    | TransitionKind::Delete
                    | TransitionKind::MoveCategory
            ),
        }
    }
}

/// Publication lifecycle, persisted as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishState {
    Draft,
    Published,
    Unpublished,
    Pending,
}

impl PublishState {
    pub const fn code(self) -> i16 {
        match self {
            PublishState::Draft => 0,
            PublishState::Published => 1,
            PublishState::Unpublished => 2,
            PublishState::Pending => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(PublishState::Draft),
            1 => Some(PublishState::Published),
            2 => Some(PublishState::Unpublished),
            3 => Some(PublishState::Pending),
            _ => None,
        }
    }
}

/// Current state of one entity, as far as batch transitions care.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    pub id: i64,
    pub status: PublishState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    pub category_id: Option<i64>,
    pub deleted: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Source-state condition an entity must meet to be eligible for a transition.
///
/// Deleted entities never match, whatever the predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatePredicate {
    NotDeleted,
    StatusIn(&'static [PublishState]),
    Pinned(bool),
    Featured(bool),
    /// Category differs from the given one; an unset category counts as different.
    CategoryNot(i64),
}

impl StatePredicate {
    pub fn matches(&self, state: &EntityState) -> bool {
        if state.deleted {
            return false;
        }
        match *self {
            StatePredicate::NotDeleted => true,
            StatePredicate::StatusIn(statuses) => statuses.contains(&state.status),
            StatePredicate::Pinned(pinned) => state.pinned.unwrap_or(false) == pinned,
            StatePredicate::Featured(featured) => state.featured.unwrap_or(false) == featured,
            StatePredicate::CategoryNot(category) => state.category_id != Some(category),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate {
    Status(PublishState),
    PublishedAt(DateTime<Utc>),
    Deleted(bool),
    Pinned(bool),
    Featured(bool),
    Category(i64),
}

/// Column assignments applied by one bulk update, always including the modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    pub updates: Vec<FieldUpdate>,
    pub updated_at: DateTime<Utc>,
}

impl FieldSet {
    pub fn apply(&self, state: &mut EntityState) {
        for update in &self.updates {
            match *update {
                FieldUpdate::Status(status) => state.status = status,
                FieldUpdate::PublishedAt(at) => state.published_at = Some(at),
                FieldUpdate::Deleted(deleted) => state.deleted = deleted,
                FieldUpdate::Pinned(pinned) => state.pinned = Some(pinned),
                FieldUpdate::Featured(featured) => state.featured = Some(featured),
                FieldUpdate::Category(category) => state.category_id = Some(category),
            }
        }
        state.updated_at = self.updated_at;
    }
}

/// Storage operations needed by batch transitions.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Entities among `ids` that are not deleted and satisfy `predicate`.
    async fn find_matching(
        &self,
        kind: EntityKind,
        ids: &[i64],
        predicate: &StatePredicate,
    ) -> anyhow::Result<Vec<EntityState>>;

    /// Apply `fields` to every entity in `ids` in one atomic statement, returning rows affected.
    async fn bulk_update(&self, kind: EntityKind, ids: &[i64], fields: &FieldSet)
    -> anyhow::Result<u64>;

    /// Current state of `ids`, deleted or not.
    async fn snapshot(&self, kind: EntityKind, ids: &[i64]) -> anyhow::Result<Vec<EntityState>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(status: PublishState) -> EntityState {
        EntityState {
            id: 1,
            status,
            pinned: Some(false),
            featured: Some(false),
            category_id: None,
            deleted: false,
            published_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn deleted_entities_never_match() {
        let mut state = article(PublishState::Draft);
        state.deleted = true;
        assert!(!StatePredicate::NotDeleted.matches(&state));
        assert!(!StatePredicate::Pinned(false).matches(&state));
    }

    #[test]
    fn unset_category_differs_from_any_target() {
        let mut state = article(PublishState::Published);
        assert!(StatePredicate::CategoryNot(4).matches(&state));
        state.category_id = Some(4);
        assert!(!StatePredicate::CategoryNot(4).matches(&state));
    }

    #[test]
    fn field_set_touches_updated_at() {
        let mut state = article(PublishState::Draft);
        let at = Utc::now() + chrono::Duration::seconds(5);
        FieldSet {
            updates: vec![FieldUpdate::Status(PublishState::Published), FieldUpdate::PublishedAt(at)],
            updated_at: at,
        }
        .apply(&mut state);
        assert_eq!(state.status, PublishState::Published);
        assert_eq!(state.published_at, Some(at));
        assert_eq!(state.updated_at, at);
    }

    #[test]
    fn interview_questions_reject_flag_transitions() {
        assert!(EntityKind::InterviewQuestion.supports(TransitionKind::MoveCategory));
        assert!(!EntityKind::InterviewQuestion.supports(TransitionKind::SetPin));
        assert!(!EntityKind::InterviewQuestion.supports(TransitionKind::CancelFeature));
        assert!(TransitionKind::ALL.iter().all(|&t| EntityKind::Article.supports(t)));
    }
}
