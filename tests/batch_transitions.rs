//! Batch engine behavior against an in-memory gateway.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use blog_admin::batch::{
    BatchEngine, BatchError, BatchTransitionRequest, EntityKind, PublishState, TransitionKind,
};
use chrono::{DateTime, TimeZone, Utc};
use helpers::{MemoryGateway, article, question};

fn engine(gateway: &Arc<MemoryGateway>) -> BatchEngine {
    BatchEngine::new(gateway.clone())
}

#[tokio::test]
async fn only_eligible_targets_are_updated() {
    let gateway = Arc::new(MemoryGateway::with(
        EntityKind::Article,
        [
            article(1, PublishState::Draft),
            article(2, PublishState::Published),
            article(3, PublishState::Unpublished),
            article(4, PublishState::Pending),
        ],
    ));
    let request = BatchTransitionRequest::new(TransitionKind::Publish, vec![1, 2, 3, 4]);

    let outcome = engine(&gateway)
        .execute(EntityKind::Article, &request)
        .await
        .unwrap();

    assert_eq!(outcome.requested, 4);
    assert_eq!(outcome.eligible, 2);
    assert_eq!(outcome.affected, 2);
    assert_eq!(outcome.skipped, 2);

    for id in [1, 3] {
        let state = gateway.get(EntityKind::Article, id).unwrap();
        assert_eq!(state.status, PublishState::Published);
        assert!(state.published_at.is_some());
        assert!(state.updated_at > DateTime::<Utc>::UNIX_EPOCH);
    }
    // Ineligible rows are untouched, including their modification time.
    let already = gateway.get(EntityKind::Article, 2).unwrap();
    assert_eq!(already.updated_at, DateTime::<Utc>::UNIX_EPOCH);
    let pending = gateway.get(EntityKind::Article, 4).unwrap();
    assert_eq!(pending.status, PublishState::Pending);
}

#[tokio::test]
async fn empty_id_list_is_rejected_before_storage() {
    let gateway = Arc::new(MemoryGateway::default());
    let request = BatchTransitionRequest::new(TransitionKind::Delete, vec![]);

    let err = engine(&gateway)
        .execute(EntityKind::Article, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::EmptyTargets));
    assert_eq!(err.to_string(), "target id list must not be empty");
    assert_eq!(gateway.total_calls(), 0);
}

#[tokio::test]
async fn category_move_without_target_is_rejected_before_querying() {
    let gateway = Arc::new(MemoryGateway::with(
        EntityKind::Article,
        [article(1, PublishState::Published)],
    ));
    let request = BatchTransitionRequest::new(TransitionKind::MoveCategory, vec![1]);

    let err = engine(&gateway)
        .execute(EntityKind::Article, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::MissingTargetCategory(_)));
    assert_eq!(gateway.find_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn publishing_twice_finds_nothing_eligible() {
    let gateway = Arc::new(MemoryGateway::with(
        EntityKind::Article,
        [article(1, PublishState::Draft), article(2, PublishState::Draft)],
    ));
    let engine = engine(&gateway);
    let request = BatchTransitionRequest::new(TransitionKind::Publish, vec![1, 2]);

    let first = engine.execute(EntityKind::Article, &request).await.unwrap();
    assert_eq!(first.affected, 2);

    let second = engine.execute(EntityKind::Article, &request).await.unwrap_err();
    assert!(matches!(
        second,
        BatchError::NoEligibleTargets {
            transition: TransitionKind::Publish,
            requested: 2
        }
    ));
    assert_eq!(gateway.update_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn explicit_publish_time_is_kept() {
    let gateway = Arc::new(MemoryGateway::with(
        EntityKind::Article,
        [article(7, PublishState::Unpublished)],
    ));
    let at = Utc.with_ymd_and_hms(2024, 9, 20, 14, 30, 0).unwrap();
    let request = BatchTransitionRequest::new(TransitionKind::Publish, vec![7]).publish_time(at);

    engine(&gateway)
        .execute(EntityKind::Article, &request)
        .await
        .unwrap();

    assert_eq!(gateway.get(EntityKind::Article, 7).unwrap().published_at, Some(at));
}

#[tokio::test]
async fn category_move_treats_unset_category_as_different() {
    let mut in_target = article(2, PublishState::Published);
    in_target.category_id = Some(5);
    let mut elsewhere = article(3, PublishState::Draft);
    elsewhere.category_id = Some(9);
    let gateway = Arc::new(MemoryGateway::with(
        EntityKind::Article,
        [article(1, PublishState::Published), in_target, elsewhere],
    ));
    let request =
        BatchTransitionRequest::new(TransitionKind::MoveCategory, vec![1, 2, 3]).target_category(5);

    let outcome = engine(&gateway)
        .execute(EntityKind::Article, &request)
        .await
        .unwrap();

    assert_eq!(outcome.affected, 2);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(gateway.get(EntityKind::Article, 1).unwrap().category_id, Some(5));
    assert_eq!(gateway.get(EntityKind::Article, 3).unwrap().category_id, Some(5));
}

#[tokio::test]
async fn deleted_entities_are_never_eligible() {
    let mut gone = article(1, PublishState::Draft);
    gone.deleted = true;
    let gateway = Arc::new(MemoryGateway::with(EntityKind::Article, [gone]));

    for transition in [TransitionKind::Publish, TransitionKind::Delete, TransitionKind::SetPin] {
        let request = BatchTransitionRequest::new(transition, vec![1]);
        let err = engine(&gateway)
            .execute(EntityKind::Article, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::NoEligibleTargets { .. }), "{transition}");
    }
}

#[tokio::test]
async fn pin_and_feature_flags_toggle() {
    let gateway = Arc::new(MemoryGateway::with(
        EntityKind::Article,
        [article(1, PublishState::Published), article(2, PublishState::Published)],
    ));
    let engine = engine(&gateway);

    let pin = BatchTransitionRequest::new(TransitionKind::SetPin, vec![1]);
    engine.execute(EntityKind::Article, &pin).await.unwrap();
    assert_eq!(gateway.get(EntityKind::Article, 1).unwrap().pinned, Some(true));

    // Only the pinned one is eligible for unpinning.
    let unpin = BatchTransitionRequest::new(TransitionKind::CancelPin, vec![1, 2]);
    let outcome = engine.execute(EntityKind::Article, &unpin).await.unwrap();
    assert_eq!((outcome.affected, outcome.skipped), (1, 1));

    let feature = BatchTransitionRequest::new(TransitionKind::SetFeature, vec![1, 2]);
    assert_eq!(engine.execute(EntityKind::Article, &feature).await.unwrap().affected, 2);
    let unfeature = BatchTransitionRequest::new(TransitionKind::CancelFeature, vec![2]);
    engine.execute(EntityKind::Article, &unfeature).await.unwrap();
    assert_eq!(gateway.get(EntityKind::Article, 2).unwrap().featured, Some(false));
}

#[tokio::test]
async fn duplicate_ids_count_once() {
    let gateway = Arc::new(MemoryGateway::with(
        EntityKind::Article,
        [article(1, PublishState::Published)],
    ));
    let request = BatchTransitionRequest::new(TransitionKind::Unpublish, vec![1, 1, 1]);

    let outcome = engine(&gateway)
        .execute(EntityKind::Article, &request)
        .await
        .unwrap();

    assert_eq!(outcome.requested, 1);
    assert_eq!(outcome.affected, 1);
    assert_eq!(
        gateway.get(EntityKind::Article, 1).unwrap().status,
        PublishState::Unpublished
    );
}

#[tokio::test]
async fn interview_questions_support_a_subset() {
    let gateway = Arc::new(MemoryGateway::with(
        EntityKind::InterviewQuestion,
        [question(1, PublishState::Draft)],
    ));
    let engine = engine(&gateway);

    let pin = BatchTransitionRequest::new(TransitionKind::SetPin, vec![1]);
    let err = engine
        .execute(EntityKind::InterviewQuestion, &pin)
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::UnsupportedTransition(_)));
    assert_eq!(gateway.total_calls(), 0);

    let publish = BatchTransitionRequest::new(TransitionKind::Publish, vec![1]);
    let outcome = engine
        .execute(EntityKind::InterviewQuestion, &publish)
        .await
        .unwrap();
    assert_eq!(outcome.affected, 1);
    // Articles with the same id are a different table.
    assert!(gateway.get(EntityKind::Article, 1).is_none());
}

#[tokio::test]
async fn zero_affected_rows_is_a_failure() {
    let gateway = Arc::new(MemoryGateway::with(
        EntityKind::Article,
        [article(1, PublishState::Draft)],
    ));
    gateway.lose_updates.store(true, Ordering::SeqCst);
    let request = BatchTransitionRequest::new(TransitionKind::Publish, vec![1]);

    let err = engine(&gateway)
        .execute(EntityKind::Article, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::UpdateFailed));
    assert_eq!(err.to_string(), "batch update failed");
}

#[tokio::test]
async fn storage_errors_surface_as_persistence_faults() {
    let gateway = Arc::new(MemoryGateway::with(
        EntityKind::Article,
        [article(1, PublishState::Draft)],
    ));
    gateway.broken.store(true, Ordering::SeqCst);
    let request = BatchTransitionRequest::new(TransitionKind::Delete, vec![1]);

    let err = engine(&gateway)
        .execute(EntityKind::Article, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::Persistence(_)));
    assert!(!err.is_validation());
}
