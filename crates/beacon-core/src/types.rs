//! # Domain Types
//!
//! Core domain types used throughout Beacon.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌─────────────────┐   ┌─────────────────┐   │
//! │  │   WorkspaceEvent    │   │   EventDraft    │   │   SessionKey    │   │
//! │  │  ─────────────────  │   │  ─────────────  │   │  ─────────────  │   │
//! │  │  id (UUID)          │   │  event_type     │   │  workspace_id   │   │
//! │  │  workspace_id       │   │  entity_type    │   │  user_id        │   │
//! │  │  sequence_number ★  │   │  entity_id      │   │  device_id      │   │
//! │  │  event_type         │   │  payload        │   └─────────────────┘   │
//! │  │  entity / payload   │   │  device/user    │                         │
//! │  │  device / user      │   └─────────────────┘                         │
//! │  │  consumed           │                                               │
//! │  │  created_at         │   ★ the ONLY ordering authority              │
//! │  └─────────────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every event has:
//! - `id`: UUID v4 - immutable, globally unique without coordination
//! - `(workspace_id, sequence_number)`: the delivery identity - strictly
//!   increasing per workspace, assigned by the event log at append time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Workspace Event
// =============================================================================

/// A single append-only change notification within one workspace.
///
/// ## Invariants
/// - `sequence_number` is strictly increasing per `workspace_id` with no
///   reuse; it is assigned by the event log, never by callers
/// - `payload` is an opaque JSON string; the sync machinery routes it but
///   never interprets it
/// - `created_at` is informational only - consumers MUST order by
///   `sequence_number`, never by timestamp
/// - `consumed` is a housekeeping flag; it never gates delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WorkspaceEvent {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Workspace this event belongs to. Events never cross workspaces.
    pub workspace_id: String,

    /// Position in the workspace's total order. Assigned at append time.
    pub sequence_number: i64,

    /// What happened (e.g., "entity.created", "entity.updated").
    pub event_type: String,

    /// Kind of entity the event concerns.
    pub entity_type: String,

    /// Identifier of the affected entity.
    pub entity_id: String,

    /// Opaque JSON payload. Carried verbatim, never inspected.
    pub payload: String,

    /// Device that originated the change.
    pub device_id: String,

    /// User that originated the change.
    pub user_id: String,

    /// Housekeeping flag: all live sessions have acknowledged past this
    /// event. Advisory only - catch-up reads consumed rows too.
    pub consumed: bool,

    /// When the event was appended. Informational only.
    pub created_at: DateTime<Utc>,
}

impl WorkspaceEvent {
    /// Returns true if this event was originated by the given device.
    ///
    /// Used by client sessions to skip echoes of their own writes.
    #[inline]
    pub fn originated_by(&self, device_id: &str) -> bool {
        self.device_id == device_id
    }
}

// =============================================================================
// Event Draft
// =============================================================================

/// An event as submitted by a publisher, before the log assigns identity.
///
/// The draft carries everything except `id`, `sequence_number`, `consumed`
/// and `created_at` - those belong to the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: String,
    pub device_id: String,
    pub user_id: String,
}

impl EventDraft {
    pub fn new(
        event_type: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: impl Into<String>,
        device_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        EventDraft {
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            payload: payload.into(),
            device_id: device_id.into(),
            user_id: user_id.into(),
        }
    }
}

// =============================================================================
// Session Key
// =============================================================================

/// Identity of one sync session: a (workspace, user, device) triple.
///
/// The session registry is keyed by this triple, so one device holds at most
/// one live session per workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub workspace_id: String,
    pub user_id: String,
    pub device_id: String,
}

impl SessionKey {
    pub fn new(
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        SessionKey {
            workspace_id: workspace_id.into(),
            user_id: user_id.into(),
            device_id: device_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.workspace_id, self.user_id, self.device_id
        )
    }
}

// =============================================================================
// Topic Naming
// =============================================================================

/// Returns the pub/sub topic name for a workspace.
///
/// One topic per workspace; all devices of a workspace subscribe to the
/// same topic regardless of broker flavor.
#[inline]
pub fn workspace_topic(workspace_id: &str) -> String {
    format!("beacon:events:{workspace_id}")
}

// =============================================================================
// Unit Tests
// =============================================================================
