//! # Repository Module
//!
//! Database repository implementations for the event log store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Publisher / Session                                                   │
//! │       │                                                                 │
//! │       │  db.events().range_after("ws-1", 10, 500)                      │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  EventLogRepository                                                    │
//! │  ├── append(&self, workspace_id, draft)                                │
//! │  ├── range_after(&self, workspace_id, since, limit)                    │
//! │  ├── mark_consumed_up_to(&self, workspace_id, sequence)                │
//! │  └── delete_consumed_before(&self, days_old)                           │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Clean separation of concerns                                        │
//! │  • SQL is isolated in one place                                        │
//! │  • Sequence assignment has exactly one implementation                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`event_log::EventLogRepository`] - Append-only event log
//! - [`cursor::SyncCursorRepository`] - Client last-applied cursors

pub mod cursor;
pub mod event_log;
