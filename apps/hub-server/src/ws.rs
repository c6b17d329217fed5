//! # WebSocket Session Endpoint
//!
//! Per-device connection handling: handshake, live event fan-out, heartbeats
//! and acks.
//!
//! ## Connection Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Device Connection Lifecycle                         │
//! │                                                                         │
//! │  upgrade ──► Hello (10s deadline)                                      │
//! │                │                                                        │
//! │                ├─ version mismatch ──► Error UNSUPPORTED_VERSION, close│
//! │                ├─ token rejected ────► Error AUTH_FAILED, close        │
//! │                │   (nothing is registered on either rejection)         │
//! │                ▼                                                        │
//! │          register presence ──► Welcome { session_id, heartbeat }       │
//! │                │                                                        │
//! │        ┌───────┼──────────────┐                                        │
//! │        ▼       ▼              ▼                                        │
//! │  writer task  broker-forward  ping task (30s)                          │
//! │  (outgoing    (topic frames,                                           │
//! │   queue)      skip own device)                                         │
//! │                │                                                        │
//! │  receive loop: Heartbeat ──► refresh presence (expired? close)         │
//! │                EventAck ───► record ack for consumed marking           │
//! │                Close/error ► break                                     │
//! │                │                                                        │
//! │                ▼                                                        │
//! │  cleanup: abort tasks, remove presence (every exit path)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use beacon_core::{workspace_topic, SessionKey};
use beacon_sync::protocol::{HelloPayload, SyncMessage, PROTOCOL_VERSION};
use beacon_sync::{ContextGuard, SyncError, SyncResult, TokenValidator};

use crate::state::AppState;

/// Ping interval to keep connections alive.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline for the Hello frame after upgrade.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum message size (1MB).
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Capacity of the per-connection outgoing queue.
const OUTGOING_BUFFER: usize = 64;

// =============================================================================
// Upgrade Handler
// =============================================================================

/// WebSocket upgrade handler for `/sync`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    info!(addr = %addr, "New WebSocket connection");
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, addr))
}

// =============================================================================
// Connection Handler
// =============================================================================

/// Handles one device connection from handshake to cleanup.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    let hello = match receive_hello(&mut receiver).await {
        Ok(hello) => hello,
        Err(e) => {
            warn!(addr = %addr, ?e, "Failed to receive Hello - closing connection");
            return;
        }
    };

    if hello.protocol_version != PROTOCOL_VERSION {
        warn!(
            addr = %addr,
            device_id = %hello.device_id,
            version = hello.protocol_version,
            "Unsupported protocol version - rejecting connection"
        );
        let reject = SyncMessage::error(
            "UNSUPPORTED_VERSION",
            &format!("Hub speaks protocol version {}", PROTOCOL_VERSION),
        );
        let _ = send_message(&mut sender, &reject).await;
        return;
    }

    let key = SessionKey {
        workspace_id: hello.workspace_id.clone(),
        user_id: hello.user_id.clone(),
        device_id: hello.device_id.clone(),
    };

    // Rejected devices never show up in presence
    if let Err(e) = state.jwt.validate(&hello.token, &key) {
        warn!(addr = %addr, key = %key, error = %e, "Token rejected");
        let reject = SyncMessage::error("AUTH_FAILED", "Token rejected");
        let _ = send_message(&mut sender, &reject).await;
        return;
    }

    let session_id = Uuid::new_v4().to_string();
    info!(session_id = %session_id, key = %key, addr = %addr, "Device authenticated");

    state
        .presence
        .register(&session_id, &key.workspace_id, &key.user_id, &key.device_id);

    let welcome = SyncMessage::welcome(&session_id, state.broker.heartbeat_interval_secs());
    if let Err(e) = send_message(&mut sender, &welcome).await {
        warn!(session_id = %session_id, ?e, "Failed to send Welcome");
        state.presence.remove(&session_id);
        return;
    }

    // Live delivery: subscribe this workspace's topic and forward frames
    let topic = workspace_topic(&key.workspace_id);
    let mut event_stream = match state.broker.broker().subscribe(&topic).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Broker subscribe failed");
            state.presence.remove(&session_id);
            return;
        }
    };

    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(OUTGOING_BUFFER);

    // Outgoing message task
    let outgoing_handle = tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Broker forwarding task
    let forward_tx = outgoing_tx.clone();
    let forward_device = key.device_id.clone();
    let forward_session = session_id.clone();
    let forward_handle = tokio::spawn(async move {
        while let Some(frame) = event_stream.recv().await {
            // Never echo a device's own events back at it
            if let SyncMessage::Event(ref event) = frame {
                if event.originated_by(&forward_device) {
                    continue;
                }
            }

            match frame.to_json() {
                Ok(json) => {
                    if forward_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(session_id = %forward_session, ?e, "Failed to serialize frame");
                }
            }
        }
    });

    // Ping task
    let ping_tx = outgoing_tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_interval = interval(PING_INTERVAL);
        loop {
            ping_interval.tick().await;
            if ping_tx
                .send(Message::Ping(axum::body::Bytes::new()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Main receive loop
    loop {
        match receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => match SyncMessage::from_json(&text) {
                    Ok(frame) => {
                        if !handle_device_frame(&state, &session_id, &key, frame, &outgoing_tx)
                            .await
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(session_id = %session_id, ?e, "Invalid message format");
                    }
                },
                Message::Ping(data) => {
                    let _ = outgoing_tx.send(Message::Pong(data)).await;
                }
                Message::Pong(_) => {
                    // Connection is alive
                }
                Message::Close(_) => {
                    info!(session_id = %session_id, "Device requested close");
                    break;
                }
                Message::Binary(_) => {
                    debug!(session_id = %session_id, "Ignoring binary frame");
                }
            },
            Some(Err(e)) => {
                warn!(session_id = %session_id, ?e, "WebSocket error");
                break;
            }
            None => {
                info!(session_id = %session_id, "Device disconnected");
                break;
            }
        }
    }

    // Cleanup - runs on every exit path above
    ping_handle.abort();
    forward_handle.abort();
    outgoing_handle.abort();
    state.presence.remove(&session_id);
}

/// Handles one frame from the device. Returns false when the connection
/// should close.
async fn handle_device_frame(
    state: &AppState,
    session_id: &str,
    key: &SessionKey,
    frame: SyncMessage,
    outgoing_tx: &mpsc::Sender<Message>,
) -> bool {
    match frame {
        SyncMessage::Heartbeat {} => {
            let alive = {
                let _ctx = ContextGuard::bind(&key.workspace_id, &key.device_id);
                state.presence.update_heartbeat(session_id)
            };

            if !alive {
                warn!(session_id, "Heartbeat for expired session, closing");
                let expired = SyncMessage::error("SESSION_EXPIRED", "Session expired, reconnect");
                if let Ok(json) = expired.to_json() {
                    let _ = outgoing_tx.send(Message::Text(json.into())).await;
                }
                return false;
            }
            true
        }

        SyncMessage::EventAck(ack) => {
            let _ctx = ContextGuard::bind(&key.workspace_id, &key.device_id);
            state.presence.record_ack(session_id, ack.sequence_number);
            debug!(session_id, sequence = ack.sequence_number, "Ack recorded");
            true
        }

        SyncMessage::Error { code, message } => {
            warn!(session_id, code = %code, message = %message, "Error frame from device");
            true
        }

        other => {
            debug!(session_id, frame = other.type_name(), "Unexpected frame from device");
            true
        }
    }
}

// =============================================================================
// Frame Helpers
// =============================================================================

/// Receives and parses the Hello message.
async fn receive_hello(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
) -> SyncResult<HelloPayload> {
    let deadline = tokio::time::timeout(HELLO_TIMEOUT, receiver.next()).await;

    match deadline {
        Ok(Some(Ok(msg))) => {
            let text = match msg {
                Message::Text(t) => t.to_string(),
                Message::Binary(b) => String::from_utf8_lossy(&b).to_string(),
                _ => return Err(SyncError::InvalidMessage("Expected text frame".into())),
            };

            let frame = SyncMessage::from_json(&text)
                .map_err(|e| SyncError::InvalidMessage(format!("Invalid JSON: {}", e)))?;

            match frame {
                SyncMessage::Hello(payload) => Ok(payload),
                other => Err(SyncError::UnexpectedMessageType {
                    expected: "Hello".into(),
                    actual: other.type_name().into(),
                }),
            }
        }
        Ok(Some(Err(e))) => Err(SyncError::WebSocketError(e.to_string())),
        Ok(None) => Err(SyncError::Disconnected),
        Err(_) => Err(SyncError::Timeout(HELLO_TIMEOUT.as_secs())),
    }
}

/// Sends a SyncMessage on the raw sink (pre-task handshake phase only).
async fn send_message(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    msg: &SyncMessage,
) -> SyncResult<()> {
    let json = msg
        .to_json()
        .map_err(|e| SyncError::SerializationFailed(e.to_string()))?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| SyncError::WebSocketError(e.to_string()))?;
    Ok(())
}
