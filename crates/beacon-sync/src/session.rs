//! # Sync Session
//!
//! Per-device sync session: authenticate, catch up from the event log, then
//! apply live events from the broker.
//!
//! ## Session Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EventManager Lifecycle                           │
//! │                                                                         │
//! │  connect()                                                             │
//! │     │                                                                   │
//! │     ├─ 1. AUTHORIZE  token ──► validator ──reject──► refresh ONCE      │
//! │     │                                         │                         │
//! │     │                                         └──reject──► Auth (term.) │
//! │     │                                                                   │
//! │     ├─ 2. SUBSCRIBE  to the workspace topic BEFORE catch-up, so no     │
//! │     │                event falls between replay and live delivery      │
//! │     │                                                                   │
//! │     ├─ 3. CATCH UP   page range_after(last_applied) until drained,     │
//! │     │                applying in sequence order, cursor after each page │
//! │     │                                                                   │
//! │     └─ 4. GO LIVE    spawn the apply loop over the subscription        │
//! │                                                                         │
//! │  DEDUP: any event with sequence ≤ last_applied is skipped. Catch-up    │
//! │  and live delivery overlap by design; the cursor makes that harmless.  │
//! │                                                                         │
//! │  GAPS: a live frame with sequence > last_applied + 1 means earlier     │
//! │  events missed delivery; the loop replays from the log before the      │
//! │  cursor may move past them.                                            │
//! │                                                                         │
//! │  OWN EVENTS: frames originated by this device advance the cursor       │
//! │  without re-applying (the local store already has the change).         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use beacon_core::{workspace_topic, SessionKey, WorkspaceEvent};
use beacon_db::{EventLogRepository, SyncCursorRepository};

use crate::broker::Broker;
use crate::error::{SyncError, SyncResult};
use crate::protocol::SyncMessage;

// =============================================================================
// Session Traits
// =============================================================================

/// Supplies the bearer token for a session.
pub trait TokenProvider: Send + Sync {
    /// Returns the current token.
    fn token(&self) -> SyncResult<String>;
}

/// Obtains a fresh token when the current one is rejected.
///
/// Consulted at most ONCE per connect attempt; a second rejection is
/// terminal.
pub trait TokenRefresher: Send + Sync {
    /// Returns a new token, replacing the rejected one.
    fn refresh(&self) -> SyncResult<String>;
}

/// Checks a token against a session identity.
pub trait TokenValidator: Send + Sync {
    /// Returns `Ok` if the token authorizes the given session key.
    fn validate(&self, token: &str, key: &SessionKey) -> SyncResult<()>;
}

/// Applies a synchronized event to the local store.
pub trait EventApplier: Send + Sync {
    /// Applies one event. An error here stops the cursor from advancing,
    /// so the event is replayed on the next connect.
    fn apply(&self, event: &WorkspaceEvent) -> SyncResult<()>;
}

/// Validator that accepts any non-empty token. For tests and trusted
/// single-process deployments.
pub struct AcceptAllValidator;

impl TokenValidator for AcceptAllValidator {
    fn validate(&self, token: &str, _key: &SessionKey) -> SyncResult<()> {
        if token.is_empty() {
            Err(SyncError::Auth("Empty token".into()))
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// Event Manager
// =============================================================================

struct SessionInner {
    key: SessionKey,
    events: EventLogRepository,
    cursors: SyncCursorRepository,
    broker: Broker,
    applier: Arc<dyn EventApplier>,
    tokens: Arc<dyn TokenProvider>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    validator: Arc<dyn TokenValidator>,
    catch_up_limit: i64,
    last_applied: AtomicI64,
    connected: AtomicBool,
}

/// One device's sync session for one workspace.
pub struct EventManager {
    inner: Arc<SessionInner>,
    live_task: Mutex<Option<JoinHandle<()>>>,
}

impl EventManager {
    /// Creates a session. Nothing happens until [`connect`](Self::connect).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: SessionKey,
        events: EventLogRepository,
        cursors: SyncCursorRepository,
        broker: Broker,
        applier: Arc<dyn EventApplier>,
        tokens: Arc<dyn TokenProvider>,
        refresher: Option<Arc<dyn TokenRefresher>>,
        validator: Arc<dyn TokenValidator>,
        catch_up_limit: i64,
    ) -> Self {
        EventManager {
            inner: Arc::new(SessionInner {
                key,
                events,
                cursors,
                broker,
                applier,
                tokens,
                refresher,
                validator,
                catch_up_limit,
                last_applied: AtomicI64::new(0),
                connected: AtomicBool::new(false),
            }),
            live_task: Mutex::new(None),
        }
    }

    /// Returns the session key.
    pub fn key(&self) -> &SessionKey {
        &self.inner.key
    }

    /// Returns the highest applied sequence number.
    pub fn last_applied(&self) -> i64 {
        self.inner.last_applied.load(Ordering::SeqCst)
    }

    /// Returns true while the live loop is running.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Connects the session: authorize, subscribe, catch up, go live.
    ///
    /// Idempotent while connected.
    pub async fn connect(&self) -> SyncResult<()> {
        if self.inner.connected.load(Ordering::SeqCst) {
            debug!(key = %self.inner.key, "Session already connected");
            return Ok(());
        }

        self.authorize().await?;

        // Subscribe before reading the cursor: anything published after this
        // point is either in the catch-up range or in the live stream
        let topic = workspace_topic(&self.inner.key.workspace_id);
        let stream = self.inner.broker.subscribe(&topic).await?;

        let cursor = self.inner.cursors.last_applied(&self.inner.key).await?;
        self.inner.last_applied.store(cursor, Ordering::SeqCst);

        let caught_up = self.catch_up().await?;
        info!(
            key = %self.inner.key,
            from_sequence = cursor,
            applied = caught_up,
            "Catch-up complete"
        );

        let inner = self.inner.clone();
        let task = tokio::spawn(Self::live_loop(inner, stream));
        *self.live_task.lock().await = Some(task);

        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Disconnects the session and stops the live loop.
    pub async fn disconnect(&self) {
        if let Some(task) = self.live_task.lock().await.take() {
            task.abort();
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        info!(key = %self.inner.key, "Session disconnected");
    }

    /// Token check with a single refresh on rejection.
    async fn authorize(&self) -> SyncResult<()> {
        let token = self.inner.tokens.token()?;

        match self.inner.validator.validate(&token, &self.inner.key) {
            Ok(()) => return Ok(()),
            Err(SyncError::Auth(reason)) => {
                let Some(refresher) = self.inner.refresher.as_ref() else {
                    return Err(SyncError::Auth(reason));
                };

                info!(key = %self.inner.key, "Token rejected, refreshing once");
                let fresh = refresher.refresh()?;
                self.inner.validator.validate(&fresh, &self.inner.key)?;
            }
            Err(other) => return Err(other),
        }

        Ok(())
    }

    /// Replays the gap between the cursor and the head of the log.
    /// Returns the number of events handled.
    async fn catch_up(&self) -> SyncResult<u64> {
        Self::catch_up_inner(&self.inner).await
    }

    async fn catch_up_inner(inner: &SessionInner) -> SyncResult<u64> {
        let mut handled = 0u64;

        loop {
            let since = inner.last_applied.load(Ordering::SeqCst);
            let batch = inner
                .events
                .range_after(&inner.key.workspace_id, since, inner.catch_up_limit)
                .await?;

            if batch.is_empty() {
                break;
            }

            let batch_len = batch.len();
            for event in &batch {
                Self::apply_one(inner, event)?;
                handled += 1;
            }

            Self::persist_cursor_inner(inner).await?;

            if (batch_len as i64) < inner.catch_up_limit {
                break;
            }
        }

        Ok(handled)
    }

    /// Applies one event, honoring dedup and own-event rules.
    fn apply_one(inner: &SessionInner, event: &WorkspaceEvent) -> SyncResult<()> {
        let last = inner.last_applied.load(Ordering::SeqCst);
        if event.sequence_number <= last {
            debug!(
                key = %inner.key,
                sequence = event.sequence_number,
                last_applied = last,
                "Skipping already-applied event"
            );
            return Ok(());
        }

        if event.originated_by(&inner.key.device_id) {
            // The local store already reflects this change
            inner
                .last_applied
                .store(event.sequence_number, Ordering::SeqCst);
            return Ok(());
        }

        inner
            .applier
            .apply(event)
            .map_err(|e| SyncError::ApplyFailed(format!("sequence {}: {e}", event.sequence_number)))?;

        inner
            .last_applied
            .store(event.sequence_number, Ordering::SeqCst);
        Ok(())
    }

    async fn persist_cursor_inner(inner: &SessionInner) -> SyncResult<()> {
        inner
            .cursors
            .store(&inner.key, inner.last_applied.load(Ordering::SeqCst))
            .await?;
        Ok(())
    }

    /// Applies live frames until the subscription ends or the task is
    /// aborted by [`disconnect`](Self::disconnect).
    async fn live_loop(inner: Arc<SessionInner>, mut stream: crate::broker::EventStream) {
        while let Some(frame) = stream.recv().await {
            let SyncMessage::Event(event) = frame else {
                debug!(key = %inner.key, "Ignoring non-event frame on topic");
                continue;
            };

            // A non-contiguous frame means earlier events missed live
            // delivery (push failure, lagged channel). Replay the gap from
            // the log first; the frame itself dedups against the replay.
            let last = inner.last_applied.load(Ordering::SeqCst);
            if event.sequence_number > last + 1 {
                warn!(
                    key = %inner.key,
                    sequence = event.sequence_number,
                    last_applied = last,
                    "Gap in live delivery, replaying from the log"
                );
                if let Err(e) = Self::catch_up_inner(&inner).await {
                    // Do not apply past the gap; the next frame or reconnect
                    // retries the replay
                    warn!(key = %inner.key, error = %e, "Gap replay failed");
                    continue;
                }
            }

            match Self::apply_one(&inner, &event) {
                Ok(()) => {
                    if let Err(e) = Self::persist_cursor_inner(&inner).await {
                        warn!(key = %inner.key, error = %e, "Failed to persist cursor");
                    }
                }
                Err(e) => {
                    // Do not advance: the event replays via catch-up on the
                    // next connect
                    warn!(
                        key = %inner.key,
                        sequence = event.sequence_number,
                        error = %e,
                        "Failed to apply live event"
                    );
                }
            }
        }

        inner.connected.store(false, Ordering::SeqCst);
        info!(key = %inner.key, "Live loop ended");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::EventDraft;
    use beacon_db::{Database, DbConfig};
    use parking_lot::Mutex as SyncMutex;

    struct RecordingApplier {
        applied: SyncMutex<Vec<i64>>,
    }

    impl RecordingApplier {
        fn new() -> Arc<Self> {
            Arc::new(RecordingApplier {
                applied: SyncMutex::new(Vec::new()),
            })
        }

        fn sequences(&self) -> Vec<i64> {
            self.applied.lock().clone()
        }
    }

    impl EventApplier for RecordingApplier {
        fn apply(&self, event: &WorkspaceEvent) -> SyncResult<()> {
            self.applied.lock().push(event.sequence_number);
            Ok(())
        }
    }

    struct StaticToken(&'static str);

    impl TokenProvider for StaticToken {
        fn token(&self) -> SyncResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct CountingRefresher {
        calls: SyncMutex<u32>,
    }

    impl TokenRefresher for CountingRefresher {
        fn refresh(&self) -> SyncResult<String> {
            *self.calls.lock() += 1;
            Ok("refreshed-token".to_string())
        }
    }

    /// Rejects every token except "refreshed-token".
    struct PickyValidator;

    impl TokenValidator for PickyValidator {
        fn validate(&self, token: &str, _key: &SessionKey) -> SyncResult<()> {
            if token == "refreshed-token" {
                Ok(())
            } else {
                Err(SyncError::Auth("Token rejected".into()))
            }
        }
    }

    fn draft(device: &str) -> EventDraft {
        EventDraft::new(
            "entity.updated",
            "document",
            "doc-1",
            "{}",
            device,
            "user-1",
        )
    }

    async fn session_over(
        db: &Database,
        broker: &Broker,
        device: &str,
        applier: Arc<dyn EventApplier>,
    ) -> EventManager {
        EventManager::new(
            SessionKey {
                workspace_id: "ws-1".into(),
                user_id: "user-1".into(),
                device_id: device.into(),
            },
            db.events(),
            db.cursors(),
            broker.clone(),
            applier,
            Arc::new(StaticToken("tok")),
            None,
            Arc::new(AcceptAllValidator),
            100,
        )
    }

    #[tokio::test]
    async fn test_catch_up_applies_backlog_in_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let broker = Broker::in_process();

        for _ in 0..3 {
            db.events().append("ws-1", &draft("dev-other")).await.unwrap();
        }

        let applier = RecordingApplier::new();
        let session = session_over(&db, &broker, "dev-a", applier.clone()).await;
        session.connect().await.unwrap();

        assert_eq!(applier.sequences(), vec![1, 2, 3]);
        assert_eq!(session.last_applied(), 3);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_cursor_survives_reconnect() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let broker = Broker::in_process();

        for _ in 0..2 {
            db.events().append("ws-1", &draft("dev-other")).await.unwrap();
        }

        let applier = RecordingApplier::new();
        let session = session_over(&db, &broker, "dev-a", applier.clone()).await;
        session.connect().await.unwrap();
        session.disconnect().await;

        // More events land while disconnected
        for _ in 0..2 {
            db.events().append("ws-1", &draft("dev-other")).await.unwrap();
        }

        let session = session_over(&db, &broker, "dev-a", applier.clone()).await;
        session.connect().await.unwrap();

        // Only the gap is applied; nothing replays twice
        assert_eq!(applier.sequences(), vec![1, 2, 3, 4]);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_own_events_advance_cursor_without_applying() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let broker = Broker::in_process();

        db.events().append("ws-1", &draft("dev-a")).await.unwrap();
        db.events().append("ws-1", &draft("dev-other")).await.unwrap();

        let applier = RecordingApplier::new();
        let session = session_over(&db, &broker, "dev-a", applier.clone()).await;
        session.connect().await.unwrap();

        assert_eq!(applier.sequences(), vec![2]);
        assert_eq!(session.last_applied(), 2);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_auth_refreshes_once_then_fails() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let broker = Broker::in_process();

        let refresher = Arc::new(CountingRefresher {
            calls: SyncMutex::new(0),
        });

        let session = EventManager::new(
            SessionKey {
                workspace_id: "ws-1".into(),
                user_id: "user-1".into(),
                device_id: "dev-a".into(),
            },
            db.events(),
            db.cursors(),
            broker.clone(),
            RecordingApplier::new(),
            Arc::new(StaticToken("stale")),
            Some(refresher.clone()),
            Arc::new(PickyValidator),
            100,
        );

        // Stale token rejected, refresh produces the accepted one
        session.connect().await.unwrap();
        assert_eq!(*refresher.calls.lock(), 1);
        session.disconnect().await;

        // Without a refresher, rejection is terminal
        let session = EventManager::new(
            SessionKey {
                workspace_id: "ws-1".into(),
                user_id: "user-1".into(),
                device_id: "dev-b".into(),
            },
            db.events(),
            db.cursors(),
            broker,
            RecordingApplier::new(),
            Arc::new(StaticToken("stale")),
            None,
            Arc::new(PickyValidator),
            100,
        );

        assert!(matches!(session.connect().await, Err(SyncError::Auth(_))));
    }

    #[tokio::test]
    async fn test_live_events_apply_after_catch_up() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let broker = Broker::in_process();

        let applier = RecordingApplier::new();
        let session = session_over(&db, &broker, "dev-a", applier.clone()).await;
        session.connect().await.unwrap();

        // Publish like the hub does: append, then push
        let stored = db.events().append("ws-1", &draft("dev-other")).await.unwrap();
        broker
            .publish(
                &workspace_topic("ws-1"),
                &SyncMessage::event(stored),
            )
            .await
            .unwrap();

        // Give the live loop a moment to apply
        for _ in 0..50 {
            if session.last_applied() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(applier.sequences(), vec![1]);
        session.disconnect().await;
    }
}
