//! Shared hub state, passed to every handler.

use std::sync::Arc;

use beacon_db::Database;
use beacon_sync::{PresenceTracker, Publisher, ResolvedBroker};

use crate::auth::JwtManager;
use crate::config::HubConfig;

/// Everything the HTTP and WebSocket layers need, behind one `Arc`.
pub struct AppState {
    /// Event log and cursors.
    pub db: Database,

    /// Append-then-push write path.
    pub publisher: Publisher,

    /// The broker resolved at startup, with its heartbeat mapping.
    pub broker: ResolvedBroker,

    /// Live session tracking.
    pub presence: Arc<PresenceTracker>,

    /// Token validation.
    pub jwt: Arc<JwtManager>,

    /// Hub configuration.
    pub config: HubConfig,
}

impl AppState {
    /// Assembles the shared state from resolved components.
    pub fn new(db: Database, broker: ResolvedBroker, config: HubConfig) -> Arc<Self> {
        let publisher = Publisher::new(db.events(), broker.broker().clone());
        let presence = Arc::new(PresenceTracker::new(broker.presence_expiry()));
        let jwt = Arc::new(JwtManager::new(
            config.jwt_secret.clone(),
            config.jwt_lifetime_secs,
        ));

        Arc::new(AppState {
            db,
            publisher,
            broker,
            presence,
            jwt,
            config,
        })
    }
}
