//! # Delivery Broker
//!
//! The pub/sub channel that carries live events from the publisher to
//! connected sessions. Two flavors behind one enum:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Broker Flavors                                   │
//! │                                                                         │
//! │  IN-PROCESS                                                            │
//! │  ──────────                                                            │
//! │  ┌───────────┐   broadcast::channel per topic    ┌──────────────┐      │
//! │  │ Publisher │ ────────────────────────────────► │ Subscribers  │      │
//! │  └───────────┘   (same process only)             └──────────────┘      │
//! │                                                                         │
//! │  EXTERNAL (Redis)                                                      │
//! │  ────────────────                                                      │
//! │  ┌───────────┐   PUBLISH beacon:events:<ws>      ┌──────────────┐      │
//! │  │ Publisher │ ────────────► Redis ────────────► │ Subscribers  │      │
//! │  └───────────┘                                   │ (any process)│      │
//! │                                                  └──────────────┘      │
//! │                                                                         │
//! │  Both flavors are at-least-once at best; a dropped frame is never      │
//! │  an error because catch-up replays from the event log by sequence.     │
//! │                                                                         │
//! │  Laggards: the in-process channel holds 256 frames per topic. A        │
//! │  subscriber that falls further behind gets a warning and relies on     │
//! │  catch-up, same as a device that was offline.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The enum shape (instead of a trait object) keeps call sites free of
//! dynamic dispatch and makes the resolved flavor visible in logs and
//! health output.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::protocol::SyncMessage;

// =============================================================================
// Constants
// =============================================================================

/// Per-topic in-process channel capacity.
const TOPIC_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the per-subscriber bridge queue.
const STREAM_BUFFER: usize = 64;

// =============================================================================
// Event Stream
// =============================================================================

/// A subscription to one topic, regardless of broker flavor.
///
/// Both flavors bridge into an mpsc queue so subscribers never see which
/// broker is behind them.
pub struct EventStream {
    rx: mpsc::Receiver<SyncMessage>,
}

impl EventStream {
    /// Receives the next message. Returns `None` when the subscription ends
    /// (broker dropped, connection lost, or topic closed).
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        self.rx.recv().await
    }
}

// =============================================================================
// Broker
// =============================================================================

/// The resolved delivery broker.
#[derive(Clone)]
pub enum Broker {
    /// Broadcast channels inside this process.
    InProcess(InProcessBroker),

    /// Redis pub/sub, shared across hub instances.
    External(ExternalBroker),
}

impl Broker {
    /// Creates the in-process flavor.
    pub fn in_process() -> Self {
        Broker::InProcess(InProcessBroker::new())
    }

    /// Connects the external flavor.
    ///
    /// Establishes the publish connection eagerly so a dead broker fails
    /// here rather than on the first publish.
    pub async fn external(redis_url: &str) -> SyncResult<Self> {
        Ok(Broker::External(ExternalBroker::connect(redis_url).await?))
    }

    /// Publishes a message to a topic.
    ///
    /// No subscribers is not an error: offline devices recover via catch-up.
    pub async fn publish(&self, topic: &str, message: &SyncMessage) -> SyncResult<()> {
        match self {
            Broker::InProcess(broker) => broker.publish(topic, message),
            Broker::External(broker) => broker.publish(topic, message).await,
        }
    }

    /// Subscribes to a topic.
    pub async fn subscribe(&self, topic: &str) -> SyncResult<EventStream> {
        match self {
            Broker::InProcess(broker) => Ok(broker.subscribe(topic)),
            Broker::External(broker) => broker.subscribe(topic).await,
        }
    }

    /// Returns the flavor name (for logs and health output).
    pub fn flavor(&self) -> &'static str {
        match self {
            Broker::InProcess(_) => "in_process",
            Broker::External(_) => "external",
        }
    }

    /// Returns true if this broker reaches other hub instances.
    pub fn is_external(&self) -> bool {
        matches!(self, Broker::External(_))
    }
}

// =============================================================================
// In-Process Broker
// =============================================================================

/// Broadcast-channel broker: one channel per workspace topic, lazily created.
#[derive(Clone)]
pub struct InProcessBroker {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<SyncMessage>>>>,
}

impl InProcessBroker {
    fn new() -> Self {
        InProcessBroker {
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn publish(&self, topic: &str, message: &SyncMessage) -> SyncResult<()> {
        let topics = self.topics.read();
        if let Some(tx) = topics.get(topic) {
            // send() errors when there are no receivers; that's a quiet
            // topic, not a failure
            let delivered = tx.send(message.clone()).unwrap_or(0);
            debug!(topic, delivered, "Published to in-process topic");
        } else {
            debug!(topic, "No subscribers for topic, message dropped");
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> EventStream {
        let rx = {
            let mut topics = self.topics.write();
            topics
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(TOPIC_CHANNEL_CAPACITY).0)
                .subscribe()
        };

        let (tx, stream_rx) = mpsc::channel(STREAM_BUFFER);
        let topic = topic.to_string();

        tokio::spawn(async move {
            let mut rx = rx;
            loop {
                match rx.recv().await {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            break; // subscriber dropped its stream
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "Subscriber lagged, relying on catch-up");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        EventStream { rx: stream_rx }
    }
}

// =============================================================================
// External Broker (Redis)
// =============================================================================

/// Redis pub/sub broker for multi-instance deployments.
#[derive(Clone)]
pub struct ExternalBroker {
    client: redis::Client,
    publish_conn: ConnectionManager,
}

impl ExternalBroker {
    async fn connect(redis_url: &str) -> SyncResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| SyncError::BrokerFailed(format!("Invalid Redis URL: {e}")))?;

        // ConnectionManager reconnects on its own after transient drops
        let publish_conn = ConnectionManager::new(client.clone()).await?;

        Ok(ExternalBroker {
            client,
            publish_conn,
        })
    }

    async fn publish(&self, topic: &str, message: &SyncMessage) -> SyncResult<()> {
        let json = message.to_json()?;
        let mut conn = self.publish_conn.clone();
        let delivered: i64 = conn.publish(topic, json).await?;
        debug!(topic, delivered, "Published to Redis topic");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> SyncResult<EventStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        let (tx, stream_rx) = mpsc::channel(STREAM_BUFFER);
        let topic = topic.to_string();

        tokio::spawn(async move {
            use futures_util::StreamExt;

            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(topic = %topic, ?e, "Unreadable broker frame, skipping");
                        continue;
                    }
                };

                match SyncMessage::from_json(&payload) {
                    Ok(parsed) => {
                        if tx.send(parsed).await.is_err() {
                            break; // subscriber dropped its stream
                        }
                    }
                    Err(e) => {
                        warn!(topic = %topic, ?e, "Malformed broker frame, skipping");
                    }
                }
            }
        });

        Ok(EventStream { rx: stream_rx })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
