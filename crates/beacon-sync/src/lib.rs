//! # beacon-sync: Sync Engine for Beacon
//!
//! This crate provides the synchronization layer for Beacon: how change
//! notifications reach devices, how devices reconcile after a gap, and how
//! the hub knows who is alive.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  SERVER SIDE (hub)                                                     │
//! │  ─────────────────                                                     │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ BrokerSelector │  │   Publisher    │  │  PresenceTracker       │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Probes Redis,  │  │ Append to log  │  │ Heartbeats, expiry     │    │
//! │  │ falls back to  │─►│ THEN push to   │  │ sweeps, ack tracking   │    │
//! │  │ in-process     │  │ broker         │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  ┌────────────────────────────────────────────────────────────────┐    │
//! │  │                        Broker                                  │    │
//! │  │  External (Redis pub/sub)  or  InProcess (broadcast channels)  │    │
//! │  │  One topic per workspace: beacon:events:<workspace_id>         │    │
//! │  └────────────────────────────────────────────────────────────────┘    │
//! │          │                                                              │
//! │  CLIENT SIDE (devices)                                                 │
//! │  ─────────────────────                                                 │
//! │          ▼                                                              │
//! │  ┌────────────────────────┐  ┌────────────────────────────────────┐    │
//! │  │    SessionRegistry     │  │          EventManager              │    │
//! │  │                        │  │                                    │    │
//! │  │ One session per        │  │ subscribe → catch-up → live with   │    │
//! │  │ (ws, user, dev);       │─►│ dedup, gap replay, and durable     │    │
//! │  │ register after connect │  │ cursors                            │    │
//! │  └────────────────────────┘  └────────────────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────────────────────────────────────────────────────┐    │
//! │  │                   RequestContext / ContextGuard                 │    │
//! │  │  Scoped workspace+device identity on pooled workers;            │    │
//! │  │  Drop clears unconditionally (early return, panic, success)     │    │
//! │  └────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Server-side modules
//! - [`selector`] - Broker mode resolution (probe + fallback)
//! - [`broker`] - In-process and Redis-backed pub/sub
//! - [`publisher`] - Durable append, then best-effort push
//! - [`presence`] - Heartbeat-driven session liveness
//! - [`context`] - Request-scoped workspace/device propagation
//!
//! ### Client-side modules
//! - [`session`] - `EventManager`: catch-up, live apply, dedup, cursors
//! - [`registry`] - Keyed session registry (one per workspace/user/device)
//!
//! ### Shared modules
//! - [`config`] - Sync configuration (broker mode, probe timeout, heartbeat)
//! - [`error`] - Sync error types
//! - [`protocol`] - Wire message types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_sync::{BrokerSelector, Publisher, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None)?;
//! let broker = BrokerSelector::new(&config).resolve().await;
//! let publisher = Publisher::new(db.events(), broker.broker().clone());
//!
//! let event = publisher
//!     .publish("ws-1", draft)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Server-side modules
pub mod broker;
pub mod context;
pub mod presence;
pub mod publisher;
pub mod selector;

// Client-side modules
pub mod registry;
pub mod session;

// Shared modules
pub mod config;
pub mod error;
pub mod protocol;

// =============================================================================
// Re-exports
// =============================================================================

pub use broker::{Broker, EventStream};
pub use config::{BrokerMode, SyncConfig};
pub use context::{current_device, current_workspace, ContextGuard, RequestContext};
pub use error::{SyncError, SyncResult};
pub use presence::{PresenceTracker, SessionInfo};
pub use protocol::{SyncMessage, PROTOCOL_VERSION};
pub use publisher::Publisher;
pub use registry::SessionRegistry;
pub use selector::{BrokerSelector, ResolvedBroker};
pub use session::{
    AcceptAllValidator, EventApplier, EventManager, TokenProvider, TokenRefresher, TokenValidator,
};
