//! Batch state transitions over articles and interview questions.

pub mod gateway;
pub mod transition;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::audit::StateCapture;
use crate::utils::fmt_duration;

pub use gateway::{EntityKind, EntityState, PersistenceGateway, PublishState};
pub use transition::{BatchCommand, BatchError, BatchTransitionRequest, TransitionKind};

/// Aggregate result of one batch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub transition: TransitionKind,
    pub requested: usize,
    pub eligible: usize,
    pub affected: u64,
    pub skipped: usize,
}

/// Drop duplicates, keeping the first occurrence of each id.
fn dedupe_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = Vec::with_capacity(ids.len());
    for &id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

/// Checks everything that can be checked without touching storage.
fn validate(kind: EntityKind, request: &BatchTransitionRequest) -> Result<Vec<i64>, BatchError> {
    if request.ids.is_empty() {
        return Err(BatchError::EmptyTargets);
    }
    let invalid: Vec<i64> = request.ids.iter().copied().filter(|&id| id <= 0).collect();
    if !invalid.is_empty() {
        return Err(BatchError::InvalidIds(invalid));
    }

    let transition = request.transition;
    if !kind.supports(transition) {
        return Err(BatchError::UnsupportedTransition(transition.name().to_owned()));
    }

    match transition {
        TransitionKind::MoveCategory => {
            if request.target_category_id.is_none() {
                return Err(BatchError::MissingTargetCategory(transition));
            }
        }
        _ if request.target_category_id.is_some() => {
            return Err(BatchError::ForbiddenAuxiliary {
                field: "targetCategoryId",
                transition,
            });
        }
        _ => {}
    }
    if transition != TransitionKind::Publish && request.publish_time.is_some() {
        return Err(BatchError::ForbiddenAuxiliary {
            field: "publishTime",
            transition,
        });
    }

    Ok(dedupe_ids(&request.ids))
}

/// Validates batch requests, narrows them to eligible entities and applies one bulk update.
#[derive(Clone)]
pub struct BatchEngine {
    gateway: Arc<dyn PersistenceGateway>,
}

impl BatchEngine {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    pub async fn execute(
        &self,
        kind: EntityKind,
        request: &BatchTransitionRequest,
    ) -> Result<BatchOutcome, BatchError> {
        let start = Instant::now();
        let ids = validate(kind, request)?;
        let transition = request.transition;

        let predicate = transition.source_predicate(request.target_category_id.unwrap_or_default());
        let matching = self.gateway.find_matching(kind, &ids, &predicate).await?;
        let eligible: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| matching.iter().any(|state| state.id == *id))
            .collect();

        if eligible.is_empty() {
            warn!(
                transition = transition.name(),
                requested = ids.len(),
                "No eligible targets for batch transition"
            );
            return Err(BatchError::NoEligibleTargets {
                transition,
                requested: ids.len(),
            });
        }
        debug!(
            transition = transition.name(),
            eligible = ?eligible,
            "Applying batch transition"
        );

        let fields = transition.field_set(request, Utc::now());
        let affected = self.gateway.bulk_update(kind, &eligible, &fields).await?;
        if affected == 0 {
            return Err(BatchError::UpdateFailed);
        }

        let outcome = BatchOutcome {
            transition,
            requested: ids.len(),
            eligible: eligible.len(),
            affected,
            skipped: ids.len() - eligible.len(),
        };
        info!(
            transition = transition.name(),
            requested = outcome.requested,
            affected = outcome.affected,
            skipped = outcome.skipped,
            duration = fmt_duration(start.elapsed()),
            "Batch transition applied"
        );
        Ok(outcome)
    }
}

/// Before/after audit snapshots backed by the persistence gateway.
pub struct EntitySnapshot {
    gateway: Arc<dyn PersistenceGateway>,
    kind: EntityKind,
}

impl EntitySnapshot {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, kind: EntityKind) -> Self {
        Self { gateway, kind }
    }
}

#[async_trait]
impl StateCapture for EntitySnapshot {
    async fn capture(&self, ids: &[i64]) -> anyhow::Result<Value> {
        let states = self.gateway.snapshot(self.kind, &dedupe_ids(ids)).await?;
        Ok(serde_json::to_value(states)?)
    }
}
