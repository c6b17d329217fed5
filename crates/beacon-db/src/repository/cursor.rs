//! # Sync Cursor Repository
//!
//! Persists each session's last-applied sequence so catch-up survives
//! process restarts.
//!
//! ## Cursor Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Cursor Flow                                         │
//! │                                                                         │
//! │  EventManager connects                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  last_applied(key) ──► 0 for a brand-new device                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  catch-up: range_after(last_applied) ──► apply ──► store(key, seq)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  live events ──► apply ──► store(key, seq)                             │
//! │                                                                         │
//! │  The cursor only moves forward; a stale store is ignored.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use beacon_core::SessionKey;

/// Repository for sync cursor operations.
#[derive(Debug, Clone)]
pub struct SyncCursorRepository {
    pool: SqlitePool,
}

impl SyncCursorRepository {
    /// Creates a new SyncCursorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncCursorRepository { pool }
    }

    /// Returns the last applied sequence for a session key (0 if none).
    pub async fn last_applied(&self, key: &SessionKey) -> DbResult<i64> {
        let cursor: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT last_applied_sequence
            FROM sync_cursors
            WHERE workspace_id = ?1 AND user_id = ?2 AND device_id = ?3
            "#,
        )
        .bind(&key.workspace_id)
        .bind(&key.user_id)
        .bind(&key.device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cursor.unwrap_or(0))
    }

    /// Stores the last applied sequence for a session key.
    ///
    /// The cursor never moves backwards: a store with a lower sequence than
    /// the persisted one is a no-op. This makes the call safe from racing
    /// catch-up and live-apply paths.
    pub async fn store(&self, key: &SessionKey, sequence: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (
                workspace_id, user_id, device_id, last_applied_sequence, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (workspace_id, user_id, device_id) DO UPDATE SET
                last_applied_sequence = excluded.last_applied_sequence,
                updated_at = excluded.updated_at
            WHERE excluded.last_applied_sequence > sync_cursors.last_applied_sequence
            "#,
        )
        .bind(&key.workspace_id)
        .bind(&key.user_id)
        .bind(&key.device_id)
        .bind(sequence)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(key = %key, sequence, "Cursor stored");
        Ok(())
    }

    /// Removes the cursor for a session key (workspace switch cleanup).
    pub async fn remove(&self, key: &SessionKey) -> DbResult<()> {
        sqlx::query(
            r#"
            DELETE FROM sync_cursors
            WHERE workspace_id = ?1 AND user_id = ?2 AND device_id = ?3
            "#,
        )
        .bind(&key.workspace_id)
        .bind(&key.user_id)
        .bind(&key.device_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_cursor_reads_zero() {
        let db = test_db().await;
        let key = SessionKey::new("ws-1", "user-1", "dev-a");

        assert_eq!(db.cursors().last_applied(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_and_read_back() {
        let db = test_db().await;
        let repo = db.cursors();
        let key = SessionKey::new("ws-1", "user-1", "dev-a");

        repo.store(&key, 7).await.unwrap();
        assert_eq!(repo.last_applied(&key).await.unwrap(), 7);

        repo.store(&key, 12).await.unwrap();
        assert_eq!(repo.last_applied(&key).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_cursor_never_moves_backwards() {
        let db = test_db().await;
        let repo = db.cursors();
        let key = SessionKey::new("ws-1", "user-1", "dev-a");

        repo.store(&key, 10).await.unwrap();
        repo.store(&key, 4).await.unwrap();

        assert_eq!(repo.last_applied(&key).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_cursors_isolated_per_device() {
        let db = test_db().await;
        let repo = db.cursors();
        let a = SessionKey::new("ws-1", "user-1", "dev-a");
        let b = SessionKey::new("ws-1", "user-1", "dev-b");

        repo.store(&a, 5).await.unwrap();

        assert_eq!(repo.last_applied(&a).await.unwrap(), 5);
        assert_eq!(repo.last_applied(&b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let db = test_db().await;
        let repo = db.cursors();
        let key = SessionKey::new("ws-1", "user-1", "dev-a");

        repo.store(&key, 5).await.unwrap();
        repo.remove(&key).await.unwrap();

        assert_eq!(repo.last_applied(&key).await.unwrap(), 0);
    }
}
