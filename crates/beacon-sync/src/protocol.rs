//! # Sync Protocol Messages
//!
//! Message types for the hub/device sync channel.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Protocol Messages                             │
//! │                                                                         │
//! │  HANDSHAKE FLOW                                                        │
//! │  ──────────────                                                        │
//! │  DEVICE ───► Hello { token, workspace_id, user_id, device_id, ver }    │
//! │  HUB    ◄─── Welcome { session_id, heartbeat_interval_secs, time }     │
//! │                                                                         │
//! │  LIVE DELIVERY (HUB → DEVICE)                                          │
//! │  ────────────────────────────                                          │
//! │  HUB    ───► Event { ...workspace event incl. sequence_number }        │
//! │  DEVICE ───► EventAck { sequence_number }                              │
//! │                                                                         │
//! │  KEEPALIVE (external broker only; interval 0 disables)                 │
//! │  ─────────                                                             │
//! │  DEVICE ───► Heartbeat { }                                             │
//! │                                                                         │
//! │  ERROR                                                                 │
//! │  ─────                                                                 │
//! │  Both   ◄──► Error { code, message }                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format (JSON)
//! Messages are serialized as tagged JSON using serde's adjacently tagged enum:
//! ```json
//! { "type": "Hello", "payload": { "deviceId": "...", ... } }
//! ```
//!
//! The same envelope travels over the WebSocket channel and over broker
//! topics, so the hub republishes broker frames to sockets verbatim.

use serde::{Deserialize, Serialize};

use beacon_core::WorkspaceEvent;

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// Main Message Enum (Tagged Union)
// =============================================================================

/// All sync protocol messages.
///
/// Uses serde's adjacently tagged enum for clean JSON serialization:
/// `{ "type": "Hello", "payload": { ... } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncMessage {
    // =========================================================================
    // Handshake Messages
    // =========================================================================
    /// Initial connection message from a device.
    Hello(HelloPayload),

    /// Response from the hub after successful handshake.
    Welcome(WelcomePayload),

    // =========================================================================
    // Delivery Messages
    // =========================================================================
    /// A workspace event pushed from the hub, sequence number included.
    Event(WorkspaceEvent),

    /// Acknowledgement that a device applied events up to a sequence.
    EventAck(EventAckPayload),

    // =========================================================================
    // Keepalive Messages
    // =========================================================================
    /// Liveness signal from a device. No body required.
    Heartbeat {},

    // =========================================================================
    // Error Messages
    // =========================================================================
    /// Error message.
    Error { code: String, message: String },
}

// =============================================================================
// Handshake Payloads
// =============================================================================

/// Hello message sent by a device on connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    /// Bearer token for this session.
    pub token: String,

    /// Workspace the device wants to sync.
    pub workspace_id: String,

    /// User operating the device.
    pub user_id: String,

    /// Device identifier.
    pub device_id: String,

    /// Protocol version supported by this device.
    pub protocol_version: u32,
}

/// Welcome message sent by the hub after successful handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    /// Server-assigned session identifier.
    pub session_id: String,

    /// Heartbeat period the device must honor. 0 means heartbeats are
    /// disabled (in-process broker: socket liveness suffices).
    pub heartbeat_interval_secs: u64,

    /// Server time for clock sync reference (ISO8601).
    pub server_time: String,
}

// =============================================================================
// Delivery Payloads
// =============================================================================

/// Acknowledgement for applied events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAckPayload {
    /// Highest sequence number the device has applied.
    pub sequence_number: i64,
}

// =============================================================================
// Helper Functions
// =============================================================================

impl SyncMessage {
    /// Returns the message type name as a string (for logging).
    pub fn type_name(&self) -> &'static str {
        match self {
            SyncMessage::Hello(_) => "Hello",
            SyncMessage::Welcome(_) => "Welcome",
            SyncMessage::Event(_) => "Event",
            SyncMessage::EventAck(_) => "EventAck",
            SyncMessage::Heartbeat {} => "Heartbeat",
            SyncMessage::Error { .. } => "Error",
        }
    }

    /// Creates a Hello message.
    pub fn hello(token: &str, workspace_id: &str, user_id: &str, device_id: &str) -> Self {
        SyncMessage::Hello(HelloPayload {
            token: token.to_string(),
            workspace_id: workspace_id.to_string(),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            protocol_version: PROTOCOL_VERSION,
        })
    }

    /// Creates a Welcome message.
    pub fn welcome(session_id: &str, heartbeat_interval_secs: u64) -> Self {
        SyncMessage::Welcome(WelcomePayload {
            session_id: session_id.to_string(),
            heartbeat_interval_secs,
            server_time: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Creates an Event message.
    pub fn event(event: WorkspaceEvent) -> Self {
        SyncMessage::Event(event)
    }

    /// Creates an EventAck message.
    pub fn event_ack(sequence_number: i64) -> Self {
        SyncMessage::EventAck(EventAckPayload { sequence_number })
    }

    /// Creates an Error message.
    pub fn error(code: &str, message: &str) -> Self {
        SyncMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_hello_serialization() {
        let hello = SyncMessage::hello("tok-abc", "ws-1", "user-1", "dev-a");
        let json = hello.to_json().unwrap();
        assert!(json.contains("\"type\":\"Hello\""));
        assert!(json.contains("dev-a"));

        let parsed = SyncMessage::from_json(&json).unwrap();
        if let SyncMessage::Hello(payload) = parsed {
            assert_eq!(payload.workspace_id, "ws-1");
            assert_eq!(payload.protocol_version, PROTOCOL_VERSION);
        } else {
            panic!("Expected Hello message");
        }
    }

    #[test]
    fn test_welcome_heartbeat_interval() {
        let welcome = SyncMessage::welcome("sess-1", 0);
        let json = welcome.to_json().unwrap();
        assert!(json.contains("\"heartbeatIntervalSecs\":0"));
    }

    #[test]
    fn test_event_carries_sequence() {
        let event = WorkspaceEvent {
            id: "evt-1".to_string(),
            workspace_id: "ws-1".to_string(),
            sequence_number: 42,
            event_type: "entity.updated".to_string(),
            entity_type: "document".to_string(),
            entity_id: "doc-1".to_string(),
            payload: "{}".to_string(),
            device_id: "dev-a".to_string(),
            user_id: "user-1".to_string(),
            consumed: false,
            created_at: Utc::now(),
        };

        let json = SyncMessage::event(event).to_json().unwrap();
        assert!(json.contains("\"type\":\"Event\""));
        assert!(json.contains("\"sequence_number\":42"));
    }

    #[test]
    fn test_heartbeat_round_trip() {
        let json = SyncMessage::Heartbeat {}.to_json().unwrap();
        let parsed = SyncMessage::from_json(&json).unwrap();
        assert_eq!(parsed.type_name(), "Heartbeat");
    }

    #[test]
    fn test_error_message() {
        let error = SyncMessage::error("AUTH_FAILED", "Token rejected");
        let json = error.to_json().unwrap();
        assert!(json.contains("AUTH_FAILED"));
    }
}
