//! # Event Log Repository
//!
//! The append-only event log: one strictly increasing sequence per workspace.
//!
//! ## Sequence Assignment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Append With Sequence Claim                             │
//! │                                                                         │
//! │  publish(workspace, draft)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              BEGIN IMMEDIATE (write lock)                       │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT COALESCE(MAX(sequence_number), 0) + 1               │   │
//! │  │     FROM workspace_events WHERE workspace_id = ?               │   │
//! │  │                                                                 │   │
//! │  │  2. INSERT INTO workspace_events (..., sequence_number, ...)   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Claim and insert are one atomic unit                         │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • Concurrent appenders serialize on the write lock                    │
//! │  • UNIQUE(workspace_id, sequence_number) rejects any duplicate slot    │
//! │  • An existing event is never overwritten, the violator is rejected    │
//! │  • Sequences never decrease; gaps only appear via retention cleanup    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use beacon_core::{EventDraft, WorkspaceEvent, MAX_CATCHUP_LIMIT};

/// Repository for event log operations.
#[derive(Debug, Clone)]
pub struct EventLogRepository {
    pool: SqlitePool,
}

impl EventLogRepository {
    /// Creates a new EventLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EventLogRepository { pool }
    }

    /// Appends an event, assigning the next sequence number for the workspace.
    ///
    /// ## Arguments
    /// * `workspace_id` - Workspace whose order the event joins
    /// * `draft` - Event content; identity fields are assigned here
    ///
    /// ## Returns
    /// The stored event including its assigned `sequence_number`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let event = repo.append("ws-1", &draft).await?;
    /// assert!(event.sequence_number >= 1);
    /// ```
    pub async fn append(&self, workspace_id: &str, draft: &EventDraft) -> DbResult<WorkspaceEvent> {
        let mut conn = self.pool.acquire().await?;

        // IMMEDIATE takes the write lock up front so the MAX() read and the
        // INSERT cannot interleave with another appender.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::claim_and_insert(&mut conn, workspace_id, draft).await {
            Ok(event) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;

                debug!(
                    workspace_id = %event.workspace_id,
                    sequence = event.sequence_number,
                    event_type = %event.event_type,
                    "Event appended"
                );

                Ok(event)
            }
            Err(err) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(err.into())
            }
        }
    }

    /// Claims the next sequence slot and inserts the row. Must run inside
    /// an open write transaction.
    async fn claim_and_insert(
        conn: &mut SqliteConnection,
        workspace_id: &str,
        draft: &EventDraft,
    ) -> Result<WorkspaceEvent, sqlx::Error> {
        let next: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(sequence_number), 0) + 1
            FROM workspace_events
            WHERE workspace_id = ?1
            "#,
        )
        .bind(workspace_id)
        .fetch_one(&mut *conn)
        .await?;

        let event = WorkspaceEvent {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.to_string(),
            sequence_number: next,
            event_type: draft.event_type.clone(),
            entity_type: draft.entity_type.clone(),
            entity_id: draft.entity_id.clone(),
            payload: draft.payload.clone(),
            device_id: draft.device_id.clone(),
            user_id: draft.user_id.clone(),
            consumed: false,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO workspace_events (
                id, workspace_id, sequence_number, event_type, entity_type,
                entity_id, payload, device_id, user_id, consumed, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10, ?11
            )
            "#,
        )
        .bind(&event.id)
        .bind(&event.workspace_id)
        .bind(event.sequence_number)
        .bind(&event.event_type)
        .bind(&event.entity_type)
        .bind(&event.entity_id)
        .bind(&event.payload)
        .bind(&event.device_id)
        .bind(&event.user_id)
        .bind(event.consumed)
        .bind(event.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(event)
    }

    /// Returns events strictly after `since_sequence`, ascending.
    ///
    /// ## Arguments
    /// * `since_sequence` - Exclusive lower bound; 0 means "from the start"
    /// * `limit` - Maximum events to return (clamped to [`MAX_CATCHUP_LIMIT`])
    ///
    /// ## Returns
    /// Events with `sequence_number > since_sequence`, ordered ascending,
    /// at most `limit` of them. Consumed rows are included: the flag is
    /// housekeeping, not a delivery gate.
    pub async fn range_after(
        &self,
        workspace_id: &str,
        since_sequence: i64,
        limit: i64,
    ) -> DbResult<Vec<WorkspaceEvent>> {
        let limit = limit.clamp(1, MAX_CATCHUP_LIMIT);

        let events = sqlx::query_as::<_, WorkspaceEvent>(
            r#"
            SELECT
                id, workspace_id, sequence_number, event_type, entity_type,
                entity_id, payload, device_id, user_id, consumed, created_at
            FROM workspace_events
            WHERE workspace_id = ?1 AND sequence_number > ?2
            ORDER BY sequence_number ASC
            LIMIT ?3
            "#,
        )
        .bind(workspace_id)
        .bind(since_sequence)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Returns the highest assigned sequence for a workspace (0 if none).
    pub async fn latest_sequence(&self, workspace_id: &str) -> DbResult<i64> {
        let latest: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM workspace_events WHERE workspace_id = ?1",
        )
        .bind(workspace_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(latest)
    }

    /// Marks all events up to and including `sequence` as consumed.
    ///
    /// Best-effort housekeeping driven by presence acks. A lost update here
    /// costs nothing: the flag is recomputed on the next housekeeping pass
    /// and is never consulted for delivery.
    ///
    /// ## Returns
    /// Number of rows newly flagged.
    pub async fn mark_consumed_up_to(&self, workspace_id: &str, sequence: i64) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE workspace_events
            SET consumed = 1
            WHERE workspace_id = ?1 AND sequence_number <= ?2 AND consumed = 0
            "#,
        )
        .bind(workspace_id)
        .bind(sequence)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes consumed events older than the given age (retention cleanup).
    ///
    /// Only consumed rows are eligible; an event no session has acknowledged
    /// is kept so late catch-up still finds it.
    ///
    /// ## Returns
    /// Number of deleted events.
    pub async fn delete_consumed_before(&self, days_old: u32) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM workspace_events
            WHERE consumed = 1
            AND created_at < datetime('now', '-' || ?1 || ' days')
            "#,
        )
        .bind(days_old)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Counts events in a workspace. Diagnostics only.
    pub async fn count_for_workspace(&self, workspace_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM workspace_events WHERE workspace_id = ?1")
                .bind(workspace_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
