//! Background housekeeping: presence sweeps, consumed marking, retention.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Housekeeping Tasks                                  │
//! │                                                                         │
//! │  PRESENCE SWEEP (every 30s)                                            │
//! │    drop sessions idle past 3 heartbeat intervals                       │
//! │                                                                         │
//! │  CONSUMED MARKING (every 60s)                                          │
//! │    per workspace with live sessions:                                   │
//! │      floor = min acked sequence across its sessions                    │
//! │      mark_consumed_up_to(floor)                                        │
//! │    the consumed flag gates RETENTION ONLY - catch-up reads it anyway   │
//! │                                                                         │
//! │  RETENTION (every 6h)                                                  │
//! │    delete consumed rows older than the retention window;               │
//! │    unconsumed rows are never deleted regardless of age                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Retention pass period.
const RETENTION_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Spawns all housekeeping tasks. They run until the process exits.
pub fn spawn_all(state: Arc<AppState>) {
    tokio::spawn(presence_sweeper(state.clone()));
    tokio::spawn(consumed_marker(state.clone()));
    tokio::spawn(retention_pass(state));
}

/// Drops sessions that stopped heartbeating.
async fn presence_sweeper(state: Arc<AppState>) {
    let mut ticker = interval(Duration::from_secs(state.config.sweep_interval_secs));

    loop {
        ticker.tick().await;
        let expired = state.presence.sweep_expired();
        if !expired.is_empty() {
            info!(count = expired.len(), "Swept expired sessions");
        }
    }
}

/// Marks events consumed once every live device in a workspace has acked
/// past them.
async fn consumed_marker(state: Arc<AppState>) {
    let mut ticker = interval(Duration::from_secs(state.config.housekeeping_interval_secs));

    loop {
        ticker.tick().await;

        for workspace_id in state.presence.workspaces() {
            let Some(floor) = state.presence.min_acked_sequence(&workspace_id) else {
                continue;
            };
            if floor == 0 {
                continue; // someone hasn't acked anything yet
            }

            match state
                .db
                .events()
                .mark_consumed_up_to(&workspace_id, floor)
                .await
            {
                Ok(marked) if marked > 0 => {
                    debug!(workspace_id, floor, marked, "Marked events consumed");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(workspace_id, error = %e, "Consumed marking failed");
                }
            }
        }
    }
}

/// Deletes old consumed rows.
async fn retention_pass(state: Arc<AppState>) {
    let mut ticker = interval(RETENTION_INTERVAL);

    loop {
        ticker.tick().await;

        match state
            .db
            .events()
            .delete_consumed_before(state.config.retention_days)
            .await
        {
            Ok(deleted) if deleted > 0 => {
                info!(
                    deleted,
                    retention_days = state.config.retention_days,
                    "Retention pass complete"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Retention pass failed");
            }
        }
    }
}
