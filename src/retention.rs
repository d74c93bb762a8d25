//! Retention Manager
//!
//! Enforces a bounded lifetime on the event log. Deletion is the log's
//! only mutation besides append, is scoped to whole sessions (never a
//! partial event sequence), and is irreversible — hence the hard clamp:
//! whatever a caller asks for, the effective retention is within
//! `[MIN_RETENTION_DAYS, MAX_RETENTION_DAYS]`. A clamped request is
//! logged and honored, never fatal.
//!
//! Runs on demand (admin-triggered) or on a fixed schedule via
//! `spawn_schedule`.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::RetentionConfig;
use crate::store::EventStore;

/// Hard lower bound on retention, in days
pub const MIN_RETENTION_DAYS: u32 = 1;
/// Hard upper bound on retention, in days
pub const MAX_RETENTION_DAYS: u32 = 30;

/// Clamp a requested retention into the hard safety bounds
pub fn clamp_retention_days(requested: u32) -> u32 {
    let clamped = requested.clamp(MIN_RETENTION_DAYS, MAX_RETENTION_DAYS);
    if clamped != requested {
        warn!(requested, clamped, "retention request outside bounds, clamped");
    }
    clamped
}

/// Effective retention for a request under the configured operator
/// ceiling: the tighter of the two, still subject to the hard clamp.
/// `max_days` lets operators narrow retention without redeploying; it can
/// never widen the `[1, 30]` bound.
pub fn effective_retention_days(requested: u32, config: &RetentionConfig) -> u32 {
    let max = config.max_days.clamp(MIN_RETENTION_DAYS, MAX_RETENTION_DAYS);
    clamp_retention_days(requested.min(max))
}

/// Delete whole sessions whose newest event is older than the retention
/// cutoff. Returns the number of sessions removed.
pub fn cleanup(store: &EventStore, retention_days: u32) -> usize {
    let days = clamp_retention_days(retention_days);
    let cutoff = Utc::now() - Duration::days(i64::from(days));
    let removed = store.remove_sessions_older_than(cutoff);
    if removed > 0 {
        info!(retention_days = days, removed, "retention cleanup removed sessions");
    }
    removed
}

/// Background sweep: run `cleanup` every `interval_hours`.
///
/// The returned handle aborts the sweep when dropped by the caller.
pub fn spawn_schedule(
    store: Arc<EventStore>,
    retention_days: u32,
    interval_hours: u64,
) -> JoinHandle<()> {
    let days = clamp_retention_days(retention_days);
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(interval_hours.max(1) * 3600);
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately; skip it so a fresh start
        // does not race session registration.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            cleanup(&store, days);
        }
    })
}
