//! # beacon-core: Pure Domain Types for Beacon
//!
//! This crate is the **shared vocabulary** of Beacon. It contains the domain
//! types every other crate speaks, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Beacon Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/hub-server                              │   │
//! │  │    WebSocket channel ──► catch-up API ──► publish ingress      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    beacon-sync (Engine)                         │   │
//! │  │    broker • presence • publisher • client sessions             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    beacon-db (Event Log)                        │   │
//! │  │              SQLite queries, migrations, cursors                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ beacon-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │   types   │  │   error   │  │ validation│                  │   │
//! │  │   │  Workspace│  │ CoreError │  │   ids     │                  │   │
//! │  │   │  Event    │  │ Validation│  │  payloads │                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • JUST TYPES               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (WorkspaceEvent, EventDraft, SessionKey)
//! - [`error`] - Domain error types
//! - [`validation`] - Identifier and payload validation
//!
//! ## Design Principles
//!
//! 1. **Ordering lives in the sequence number**: `created_at` is informational
//!    only; no consumer may order events by wall clock
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Opaque payloads**: event payloads are carried as JSON strings and
//!    never interpreted by the sync machinery
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use beacon_core::WorkspaceEvent` instead of
// `use beacon_core::types::WorkspaceEvent`

pub use error::{CoreError, ValidationError};
pub use types::*;
pub use validation::{validate_draft, validate_since_sequence};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default catch-up page size when a client does not specify a limit.
///
/// ## Why 500?
/// Large enough that a device offline for a working day usually catches up
/// in one request, small enough to keep response bodies bounded.
pub const DEFAULT_CATCHUP_LIMIT: i64 = 500;

/// Hard ceiling on a single catch-up page.
///
/// Requests asking for more are clamped, not rejected.
pub const MAX_CATCHUP_LIMIT: i64 = 2000;

/// Maximum accepted event payload size in bytes.
///
/// Payloads are opaque JSON; this bound exists so one oversized entity
/// cannot stall the delivery channel for a whole workspace.
pub const MAX_PAYLOAD_BYTES: usize = 262_144;
