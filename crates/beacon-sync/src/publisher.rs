//! # Event Publisher
//!
//! The single write path for workspace events: append to the durable log,
//! then push to the delivery broker.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Publish Semantics                                   │
//! │                                                                         │
//! │  publish(workspace, draft)                                             │
//! │       │                                                                 │
//! │       ├─ 1. validate draft ────────────── error? → propagate           │
//! │       │                                                                 │
//! │       ├─ 2. APPEND to event log ───────── error? → propagate           │
//! │       │      (sequence assigned here)      the event does NOT exist    │
//! │       │                                                                 │
//! │       └─ 3. PUSH to broker topic ──────── error? → warn + swallow      │
//! │              (best-effort)                 catch-up will deliver it    │
//! │                                                                         │
//! │  Durability and delivery fail differently on purpose: an event that    │
//! │  reached the log is real even if nobody heard about it yet.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, warn};

use beacon_core::{validate_draft, workspace_topic, EventDraft, WorkspaceEvent};
use beacon_db::EventLogRepository;

use crate::broker::Broker;
use crate::error::{SyncError, SyncResult};
use crate::protocol::SyncMessage;

// =============================================================================
// Publisher
// =============================================================================

/// Append-then-push event publisher.
#[derive(Clone)]
pub struct Publisher {
    events: EventLogRepository,
    broker: Broker,
}

impl Publisher {
    /// Creates a publisher over the given log and broker.
    pub fn new(events: EventLogRepository, broker: Broker) -> Self {
        Publisher { events, broker }
    }

    /// Publishes one event: validate, append, push.
    ///
    /// Returns the stored event with its assigned sequence number. A broker
    /// push failure is logged and swallowed - the event is durable and
    /// catch-up delivers it.
    pub async fn publish(
        &self,
        workspace_id: &str,
        draft: &EventDraft,
    ) -> SyncResult<WorkspaceEvent> {
        validate_draft(draft)
            .map_err(|e| SyncError::InvalidMessage(format!("Invalid event draft: {e}")))?;

        let event = self.events.append(workspace_id, draft).await?;

        debug!(
            workspace_id,
            sequence = event.sequence_number,
            event_type = %event.event_type,
            "Event appended"
        );

        let topic = workspace_topic(workspace_id);
        if let Err(e) = self
            .broker
            .publish(&topic, &SyncMessage::event(event.clone()))
            .await
        {
            warn!(
                workspace_id,
                sequence = event.sequence_number,
                error = %e,
                "Broker push failed, devices will receive the event via catch-up"
            );
        }

        Ok(event)
    }

    /// Returns the underlying event log.
    pub fn events(&self) -> &EventLogRepository {
        &self.events
    }

    /// Returns the broker.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_db::{Database, DbConfig};

    async fn test_publisher() -> Publisher {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Publisher::new(db.events(), Broker::in_process())
    }

    fn draft() -> EventDraft {
        EventDraft::new(
            "entity.updated",
            "document",
            "doc-1",
            r#"{"title":"hello"}"#,
            "dev-a",
            "user-1",
        )
    }

    #[tokio::test]
    async fn test_publish_appends_and_pushes() {
        let publisher = test_publisher().await;
        let topic = workspace_topic("ws-1");
        let mut stream = publisher.broker().subscribe(&topic).await.unwrap();

        let stored = publisher.publish("ws-1", &draft()).await.unwrap();
        assert_eq!(stored.sequence_number, 1);

        let frame = stream.recv().await.unwrap();
        match frame {
            SyncMessage::Event(event) => {
                assert_eq!(event.id, stored.id);
                assert_eq!(event.sequence_number, 1);
            }
            other => panic!("Expected Event frame, got {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_publish_survives_missing_subscribers() {
        let publisher = test_publisher().await;

        // Nobody subscribed; the append must still succeed and be readable
        let stored = publisher.publish("ws-quiet", &draft()).await.unwrap();

        let replay = publisher
            .events()
            .range_after("ws-quiet", 0, 10)
            .await
            .unwrap();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].id, stored.id);
    }

    #[tokio::test]
    async fn test_invalid_draft_is_rejected_before_append() {
        let publisher = test_publisher().await;

        let mut bad = draft();
        bad.payload = "not json".to_string();

        let result = publisher.publish("ws-1", &bad).await;
        assert!(matches!(result, Err(SyncError::InvalidMessage(_))));

        // Nothing reached the log
        let count = publisher
            .events()
            .count_for_workspace("ws-1")
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_sequences_advance_per_publish() {
        let publisher = test_publisher().await;

        for expected in 1..=3 {
            let stored = publisher.publish("ws-1", &draft()).await.unwrap();
            assert_eq!(stored.sequence_number, expected);
        }
    }
}
