//! # Error Types
//!
//! Domain-specific error types for beacon-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  beacon-core errors (this file)                                        │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  beacon-db errors (separate crate)                                     │
//! │  └── DbError          - Event log operation failures                   │
//! │                                                                         │
//! │  beacon-sync errors (separate crate)                                   │
//! │  └── SyncError        - Delivery, auth, and session failures           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError/SyncError → HubError      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (workspace ID, sequence, etc.)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These errors represent violations of the event model itself, independent
/// of any storage or transport.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Event cannot be found.
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// A sequence number broke the strictly-increasing invariant.
    ///
    /// ## When This Occurs
    /// - Two writers raced for the same per-workspace slot and one lost
    /// - A replayed event claims a slot that is already taken
    ///
    /// The losing write is rejected; an existing event is never overwritten.
    #[error("Sequence {sequence} already assigned in workspace {workspace_id}")]
    SequenceConflict {
        workspace_id: String,
        sequence: i64,
    },

    /// Event payload exceeds the accepted size bound.
    #[error("Payload of {actual} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { actual: usize, max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when identifiers or payloads don't meet requirements.
/// Used for early validation before any storage or delivery work runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustBeNonNegative { field: String },

    /// Invalid format (e.g., invalid identifier characters, invalid JSON).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::SequenceConflict {
            workspace_id: "ws-1".to_string(),
            sequence: 42,
        };
        assert_eq!(
            err.to_string(),
            "Sequence 42 already assigned in workspace ws-1"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "workspace_id".to_string(),
        };
        assert_eq!(err.to_string(), "workspace_id is required");

        let err = ValidationError::TooLong {
            field: "event_type".to_string(),
            max: 100,
        };
        assert_eq!(err.to_string(), "event_type must be at most 100 characters");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "device_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
