//! Retention purge with a minimum-age floor, plus the optional periodic sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::audit::store::AuditStore;
use crate::utils::fmt_duration;

/// Records younger than this many days can never be purged.
pub const MIN_RETAIN_DAYS: i64 = 7;

pub const DEFAULT_RETAIN_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("retain days must be at least {MIN_RETAIN_DAYS}, got {0}")]
    BelowFloor(i64),
    #[error("retain days {0} reaches past the earliest representable time")]
    OutOfRange(i64),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Check `retain_days` against the floor and compute the purge cutoff.
pub fn cutoff(retain_days: i64, now: DateTime<Utc>) -> Result<DateTime<Utc>, RetentionError> {
    if retain_days < MIN_RETAIN_DAYS {
        return Err(RetentionError::BelowFloor(retain_days));
    }
    chrono::Duration::try_days(retain_days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or(RetentionError::OutOfRange(retain_days))
}

/// Delete audit records older than `retain_days`, returning how many were removed.
///
/// The floor is checked before the store is touched.
pub async fn purge_expired(
    store: &dyn AuditStore,
    retain_days: i64,
) -> Result<u64, RetentionError> {
    let before = cutoff(retain_days, Utc::now())?;
    let start = Instant::now();
    let deleted = store.purge(before).await?;
    info!(
        retain_days,
        before = %before,
        deleted,
        duration = fmt_duration(start.elapsed()),
        "Purged expired audit records"
    );
    Ok(deleted)
}

/// Spawn a task that purges expired records every `interval` until `cancel` fires.
///
/// The first sweep runs immediately.
pub fn spawn_retention_sweep(
    store: Arc<dyn AuditStore>,
    retain_days: i64,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(retain_days, interval = fmt_duration(interval), "Audit retention sweep started");
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match purge_expired(store.as_ref(), retain_days).await {
                        Ok(deleted) => debug!(deleted, "Retention sweep finished"),
                        Err(e) => error!(error = ?e, "Retention sweep failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Audit retention sweep exiting");
                    break;
                }
            }
        }
    })
}
