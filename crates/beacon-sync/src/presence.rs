//! # Device Presence Tracking
//!
//! In-memory registry of live sessions, fed by the hub's WebSocket layer.
//!
//! ## Presence Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Presence Lifecycle                                │
//! │                                                                         │
//! │  Welcome sent ──► register(session)                                    │
//! │                        │                                                │
//! │  Heartbeat frame ──► update_heartbeat(id) ──► true (refreshed)         │
//! │                        │                      false (unknown/expired)   │
//! │  EventAck frame ───► record_ack(id, seq)                               │
//! │                        │                                                │
//! │  Socket closed ────► remove(id)                                        │
//! │                        │                                                │
//! │  Sweeper (30s) ────► sweep_expired() ──► sessions idle > 3 intervals   │
//! │                                                                         │
//! │  EXPIRY WINDOW: 3 × heartbeat interval (90s at the default 30s).       │
//! │  With the in-process broker heartbeats are disabled and sessions       │
//! │  live exactly as long as their socket - sweep_expired() is a no-op.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Acks also feed housekeeping: `min_acked_sequence` tells the consumed
//! marker how far every live device in a workspace has applied.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

// =============================================================================
// Session Info
// =============================================================================

/// One live session as the presence tracker sees it.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Server-assigned session identifier.
    pub session_id: String,

    /// Workspace the session syncs.
    pub workspace_id: String,

    /// User operating the device.
    pub user_id: String,

    /// Device identifier.
    pub device_id: String,

    /// When the session registered.
    pub connected_at: Instant,

    /// Last heartbeat (or registration) time.
    pub last_heartbeat: Instant,

    /// Highest sequence the device has acknowledged. 0 until the first ack.
    pub last_acked_sequence: i64,
}

impl SessionInfo {
    fn is_expired(&self, expiry: Duration, now: Instant) -> bool {
        now.duration_since(self.last_heartbeat) > expiry
    }
}

// =============================================================================
// Presence Tracker
// =============================================================================

/// Tracks which devices are live, keyed by session ID.
///
/// Shared across connection tasks; the lock is held only for map operations,
/// never across an await point.
pub struct PresenceTracker {
    sessions: Mutex<HashMap<String, SessionInfo>>,

    /// Idle cutoff. `None` disables expiry entirely (heartbeats off).
    expiry: Option<Duration>,
}

impl PresenceTracker {
    /// Creates a tracker with the given expiry window, typically
    /// [`ResolvedBroker::presence_expiry`](crate::ResolvedBroker::presence_expiry).
    pub fn new(expiry: Option<Duration>) -> Self {
        PresenceTracker {
            sessions: Mutex::new(HashMap::new()),
            expiry,
        }
    }

    /// Registers a session. Called only AFTER the handshake succeeds, so a
    /// rejected Hello never appears in presence.
    pub fn register(
        &self,
        session_id: &str,
        workspace_id: &str,
        user_id: &str,
        device_id: &str,
    ) {
        let now = Instant::now();
        let info = SessionInfo {
            session_id: session_id.to_string(),
            workspace_id: workspace_id.to_string(),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            connected_at: now,
            last_heartbeat: now,
            last_acked_sequence: 0,
        };

        self.sessions.lock().insert(session_id.to_string(), info);
        info!(session_id, workspace_id, device_id, "Session registered");
    }

    /// Refreshes a session's liveness. Returns false if the session is
    /// unknown or already past the expiry window - the caller should treat
    /// that as a dead session and close the socket.
    pub fn update_heartbeat(&self, session_id: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();

        let Some(info) = sessions.get_mut(session_id) else {
            debug!(session_id, "Heartbeat for unknown session");
            return false;
        };

        if let Some(expiry) = self.expiry {
            if info.is_expired(expiry, now) {
                debug!(session_id, "Heartbeat arrived after expiry, dropping session");
                sessions.remove(session_id);
                return false;
            }
        }

        info.last_heartbeat = now;
        true
    }

    /// Records the highest sequence a device has applied.
    ///
    /// Acks are monotone: a stale (lower) ack never regresses the recorded
    /// value.
    pub fn record_ack(&self, session_id: &str, sequence: i64) {
        let mut sessions = self.sessions.lock();
        if let Some(info) = sessions.get_mut(session_id) {
            if sequence > info.last_acked_sequence {
                info.last_acked_sequence = sequence;
            }
        }
    }

    /// Removes a session. Idempotent.
    pub fn remove(&self, session_id: &str) -> Option<SessionInfo> {
        let removed = self.sessions.lock().remove(session_id);
        if let Some(ref info) = removed {
            info!(
                session_id,
                workspace_id = %info.workspace_id,
                device_id = %info.device_id,
                "Session removed"
            );
        }
        removed
    }

    /// Drops every session idle past the expiry window and returns them.
    ///
    /// No-op when heartbeats are disabled.
    pub fn sweep_expired(&self) -> Vec<SessionInfo> {
        let Some(expiry) = self.expiry else {
            return Vec::new();
        };

        let now = Instant::now();
        let mut sessions = self.sessions.lock();

        let expired_ids: Vec<String> = sessions
            .values()
            .filter(|info| info.is_expired(expiry, now))
            .map(|info| info.session_id.clone())
            .collect();

        let mut expired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(info) = sessions.remove(&id) {
                info!(
                    session_id = %info.session_id,
                    workspace_id = %info.workspace_id,
                    device_id = %info.device_id,
                    idle_secs = now.duration_since(info.last_heartbeat).as_secs(),
                    "Session expired"
                );
                expired.push(info);
            }
        }

        expired
    }

    /// Lowest acked sequence across live sessions of a workspace, or `None`
    /// when the workspace has no live sessions.
    ///
    /// Everything at or below this sequence has been applied by every
    /// connected device, which makes it safe to mark consumed.
    pub fn min_acked_sequence(&self, workspace_id: &str) -> Option<i64> {
        self.sessions
            .lock()
            .values()
            .filter(|info| info.workspace_id == workspace_id)
            .map(|info| info.last_acked_sequence)
            .min()
    }

    /// Live sessions for one workspace.
    pub fn sessions_for_workspace(&self, workspace_id: &str) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .values()
            .filter(|info| info.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// Workspaces that currently have at least one live session.
    pub fn workspaces(&self) -> Vec<String> {
        let sessions = self.sessions.lock();
        let mut ids: Vec<String> = sessions
            .values()
            .map(|info| info.workspace_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Total live session count (for health output).
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(expiry_ms: u64) -> PresenceTracker {
        PresenceTracker::new(Some(Duration::from_millis(expiry_ms)))
    }

    #[test]
    fn test_register_and_heartbeat() {
        let tracker = tracker(1_000);
        tracker.register("s1", "ws-1", "user-1", "dev-a");

        assert!(tracker.update_heartbeat("s1"));
        assert_eq!(tracker.session_count(), 1);
    }

    #[test]
    fn test_heartbeat_for_unknown_session_is_false() {
        let tracker = tracker(1_000);
        assert!(!tracker.update_heartbeat("ghost"));
    }

    #[test]
    fn test_expired_session_rejects_heartbeat_and_is_dropped() {
        let tracker = tracker(20);
        tracker.register("s1", "ws-1", "user-1", "dev-a");

        std::thread::sleep(Duration::from_millis(60));

        assert!(!tracker.update_heartbeat("s1"));
        assert_eq!(tracker.session_count(), 0);
    }

    #[test]
    fn test_sweep_expired_drops_only_idle_sessions() {
        let tracker = tracker(50);
        tracker.register("old", "ws-1", "user-1", "dev-a");

        std::thread::sleep(Duration::from_millis(80));
        tracker.register("fresh", "ws-1", "user-1", "dev-b");

        let expired = tracker.sweep_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].session_id, "old");
        assert_eq!(tracker.session_count(), 1);
    }

    #[test]
    fn test_sweep_is_noop_when_heartbeats_disabled() {
        let tracker = PresenceTracker::new(None);
        tracker.register("s1", "ws-1", "user-1", "dev-a");

        std::thread::sleep(Duration::from_millis(20));

        assert!(tracker.sweep_expired().is_empty());
        assert_eq!(tracker.session_count(), 1);
        // And heartbeats still refresh rather than expire
        assert!(tracker.update_heartbeat("s1"));
    }

    #[test]
    fn test_acks_are_monotone() {
        let tracker = tracker(1_000);
        tracker.register("s1", "ws-1", "user-1", "dev-a");

        tracker.record_ack("s1", 7);
        tracker.record_ack("s1", 3); // stale ack, must not regress

        assert_eq!(tracker.min_acked_sequence("ws-1"), Some(7));
    }

    #[test]
    fn test_min_acked_sequence_across_devices() {
        let tracker = tracker(1_000);
        tracker.register("s1", "ws-1", "user-1", "dev-a");
        tracker.register("s2", "ws-1", "user-2", "dev-b");
        tracker.register("s3", "ws-2", "user-3", "dev-c");

        tracker.record_ack("s1", 10);
        tracker.record_ack("s2", 4);
        tracker.record_ack("s3", 99);

        // The slowest device in the workspace bounds the answer
        assert_eq!(tracker.min_acked_sequence("ws-1"), Some(4));
        assert_eq!(tracker.min_acked_sequence("ws-2"), Some(99));
        assert_eq!(tracker.min_acked_sequence("ws-nobody"), None);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tracker = tracker(1_000);
        tracker.register("s1", "ws-1", "user-1", "dev-a");

        assert!(tracker.remove("s1").is_some());
        assert!(tracker.remove("s1").is_none());
        assert_eq!(tracker.session_count(), 0);
    }
}
