//! # Session Registry
//!
//! Owns every live [`EventManager`], keyed by (workspace, user, device).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Session Registry                                  │
//! │                                                                         │
//! │  get_or_create(key, ...)                                               │
//! │       │                                                                 │
//! │       ├─ key already registered ──► return the existing session        │
//! │       │                                                                 │
//! │       └─ otherwise: build session ──► connect() ──ok──► REGISTER       │
//! │                                          │                              │
//! │                                          └──err──► propagate,          │
//! │                                                    nothing registered   │
//! │                                                                         │
//! │  A session enters the map only AFTER its connect succeeds, so a failed │
//! │  auth or catch-up never leaves a half-open entry behind. Connects are  │
//! │  gated per key: racing creates for one key serialize, while keys never │
//! │  wait on each other's connects.                                        │
//! │                                                                         │
//! │  dispose(key)      → disconnect + remove (SessionNotFound if absent)   │
//! │  dispose_all()     → shutdown path, drains the map                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use beacon_core::SessionKey;
use beacon_db::{EventLogRepository, SyncCursorRepository};

use crate::broker::Broker;
use crate::error::{SyncError, SyncResult};
use crate::session::{EventApplier, EventManager, TokenProvider, TokenRefresher, TokenValidator};

// =============================================================================
// Session Registry
// =============================================================================

/// Creates and tracks sync sessions.
pub struct SessionRegistry {
    events: EventLogRepository,
    cursors: SyncCursorRepository,
    broker: Broker,
    validator: Arc<dyn TokenValidator>,
    catch_up_limit: i64,

    sessions: Mutex<HashMap<SessionKey, Arc<EventManager>>>,

    // One gate per key: racing creates for the same key serialize against
    // each other, while a slow connect on one key never stalls the others
    connecting: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl SessionRegistry {
    /// Creates a registry over shared infrastructure.
    pub fn new(
        events: EventLogRepository,
        cursors: SyncCursorRepository,
        broker: Broker,
        validator: Arc<dyn TokenValidator>,
        catch_up_limit: i64,
    ) -> Self {
        SessionRegistry {
            events,
            cursors,
            broker,
            validator,
            catch_up_limit,
            sessions: Mutex::new(HashMap::new()),
            connecting: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for `key`, connecting a new one if none exists.
    ///
    /// Idempotent: a second call with the same key returns the live session
    /// without touching the applier or token arguments.
    pub async fn get_or_create(
        &self,
        key: SessionKey,
        applier: Arc<dyn EventApplier>,
        tokens: Arc<dyn TokenProvider>,
        refresher: Option<Arc<dyn TokenRefresher>>,
    ) -> SyncResult<Arc<EventManager>> {
        if let Some(existing) = self.sessions.lock().await.get(&key) {
            return Ok(existing.clone());
        }

        // Connect outside the map lock; the per-key gate keeps a second
        // caller for the same key from building a duplicate session
        let gate = self
            .connecting
            .lock()
            .await
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _connecting = gate.lock().await;

        // The gate winner may have registered while we waited; it also
        // cleaned up the gate entry, so don't touch the map here
        if let Some(existing) = self.sessions.lock().await.get(&key) {
            return Ok(existing.clone());
        }

        let session = Arc::new(EventManager::new(
            key.clone(),
            self.events.clone(),
            self.cursors.clone(),
            self.broker.clone(),
            applier,
            tokens,
            refresher,
            self.validator.clone(),
            self.catch_up_limit,
        ));

        // Register only a session that actually connected
        let connected = session.connect().await;

        if let Err(e) = connected {
            self.connecting.lock().await.remove(&key);
            return Err(e);
        }

        let total = {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(key.clone(), session.clone());
            sessions.len()
        };
        self.connecting.lock().await.remove(&key);

        info!(key = %key, total, "Session registered");
        Ok(session)
    }

    /// Returns the session for `key`, if one is registered.
    pub async fn get(&self, key: &SessionKey) -> Option<Arc<EventManager>> {
        self.sessions.lock().await.get(key).cloned()
    }

    /// Disconnects and removes one session.
    pub async fn dispose(&self, key: &SessionKey) -> SyncResult<()> {
        let removed = self.sessions.lock().await.remove(key);

        let Some(session) = removed else {
            return Err(SyncError::SessionNotFound(key.to_string()));
        };

        session.disconnect().await;
        info!(key = %key, "Session disposed");
        Ok(())
    }

    /// Disconnects and removes every session. Shutdown path.
    pub async fn dispose_all(&self) {
        let drained: Vec<_> = self.sessions.lock().await.drain().collect();
        let count = drained.len();

        for (_, session) in drained {
            session.disconnect().await;
        }

        if count > 0 {
            info!(count, "All sessions disposed");
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AcceptAllValidator;
    use beacon_core::{EventDraft, WorkspaceEvent};
    use beacon_db::{Database, DbConfig};
    use std::time::{Duration, Instant};

    struct NoOpApplier;

    impl EventApplier for NoOpApplier {
        fn apply(&self, _event: &WorkspaceEvent) -> SyncResult<()> {
            Ok(())
        }
    }

    struct StaticToken;

    impl TokenProvider for StaticToken {
        fn token(&self) -> SyncResult<String> {
            Ok("tok".to_string())
        }
    }

    struct RejectAllValidator;

    impl TokenValidator for RejectAllValidator {
        fn validate(&self, _token: &str, _key: &SessionKey) -> SyncResult<()> {
            Err(SyncError::Auth("No".into()))
        }
    }

    fn key(device: &str) -> SessionKey {
        SessionKey {
            workspace_id: "ws-1".into(),
            user_id: "user-1".into(),
            device_id: device.into(),
        }
    }

    async fn registry(db: &Database) -> SessionRegistry {
        SessionRegistry::new(
            db.events(),
            db.cursors(),
            Broker::in_process(),
            Arc::new(AcceptAllValidator),
            100,
        )
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = registry(&db).await;

        let first = registry
            .get_or_create(key("dev-a"), Arc::new(NoOpApplier), Arc::new(StaticToken), None)
            .await
            .unwrap();
        let second = registry
            .get_or_create(key("dev-a"), Arc::new(NoOpApplier), Arc::new(StaticToken), None)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.session_count().await, 1);

        registry.dispose_all().await;
    }

    #[tokio::test]
    async fn test_failed_connect_registers_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = SessionRegistry::new(
            db.events(),
            db.cursors(),
            Broker::in_process(),
            Arc::new(RejectAllValidator),
            100,
        );

        let result = registry
            .get_or_create(key("dev-a"), Arc::new(NoOpApplier), Arc::new(StaticToken), None)
            .await;

        assert!(matches!(result, Err(SyncError::Auth(_))));
        assert_eq!(registry.session_count().await, 0);
    }

    /// Applies each event through a long blocking sleep, so the owning
    /// session's connect (catch-up included) takes a while.
    struct SlowApplier;

    impl EventApplier for SlowApplier {
        fn apply(&self, _event: &WorkspaceEvent) -> SyncResult<()> {
            // block_in_place keeps the sleep from pinning a worker thread,
            // which would strand sqlx's return-to-pool task and hold the
            // single in-memory connection for the whole sleep
            tokio::task::block_in_place(|| std::thread::sleep(Duration::from_millis(300)));
            Ok(())
        }
    }

    fn draft(device: &str) -> EventDraft {
        EventDraft::new("entity.updated", "document", "doc-1", "{}", device, "user-1")
    }

    #[tokio::test]
    async fn test_concurrent_creates_share_one_session() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = Arc::new(registry(&db).await);

        let spawn_create = |r: Arc<SessionRegistry>| {
            tokio::spawn(async move {
                r.get_or_create(key("dev-a"), Arc::new(NoOpApplier), Arc::new(StaticToken), None)
                    .await
            })
        };

        let first = spawn_create(registry.clone());
        let second = spawn_create(registry.clone());

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.session_count().await, 1);

        registry.dispose_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_connect_does_not_stall_other_keys() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = Arc::new(registry(&db).await);

        // dev-a's catch-up crawls through one event via the slow applier
        db.events().append("ws-1", &draft("dev-z")).await.unwrap();

        let slow = {
            let r = registry.clone();
            tokio::spawn(async move {
                r.get_or_create(key("dev-a"), Arc::new(SlowApplier), Arc::new(StaticToken), None)
                    .await
            })
        };

        // Let the slow connect get under way
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        registry
            .get_or_create(key("dev-b"), Arc::new(NoOpApplier), Arc::new(StaticToken), None)
            .await
            .unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(200),
            "connect for another key waited on the slow one"
        );

        slow.await.unwrap().unwrap();
        assert_eq!(registry.session_count().await, 2);

        registry.dispose_all().await;
    }

    #[tokio::test]
    async fn test_dispose_unknown_key_errors() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = registry(&db).await;

        let result = registry.dispose(&key("ghost")).await;
        assert!(matches!(result, Err(SyncError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_dispose_all_drains_sessions() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = registry(&db).await;

        for device in ["dev-a", "dev-b"] {
            registry
                .get_or_create(key(device), Arc::new(NoOpApplier), Arc::new(StaticToken), None)
                .await
                .unwrap();
        }
        assert_eq!(registry.session_count().await, 2);

        registry.dispose_all().await;
        assert_eq!(registry.session_count().await, 0);
    }
}
