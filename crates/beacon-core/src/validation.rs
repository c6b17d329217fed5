//! # Validation Module
//!
//! Input validation for identifiers and drafts before they reach the
//! event log.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Hub boundary (axum extractors / handshake)                   │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── Bearer token claims                                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Identifier shape (empty, length, characters)                      │
//! │  └── Payload size and JSON well-formedness                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  └── UNIQUE(workspace_id, sequence_number)                             │
//! │                                                                         │
//! │  Defense in depth: each layer catches different failures               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::EventDraft;
use crate::MAX_PAYLOAD_BYTES;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates an opaque identifier (workspace, device, user, entity).
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must be at most 64 characters
/// - Must contain only alphanumeric characters, hyphens, underscores
///
/// Identifiers appear in pub/sub topic names, so the character set is kept
/// deliberately narrow.
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates an event or entity type label.
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 100 characters
/// - Dots are allowed in addition to the identifier set ("entity.updated")
pub fn validate_type_label(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 100 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 100,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, underscores, and dots"
                .to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Payload & Draft Validators
// =============================================================================

/// Validates an event payload.
///
/// ## Rules
/// - Must be well-formed JSON (the content is otherwise opaque)
/// - Must not exceed [`MAX_PAYLOAD_BYTES`]
pub fn validate_payload(payload: &str) -> ValidationResult<()> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(ValidationError::OutOfRange {
            field: "payload".to_string(),
            min: 0,
            max: MAX_PAYLOAD_BYTES as i64,
        });
    }

    if serde_json::from_str::<serde_json::Value>(payload).is_err() {
        return Err(ValidationError::InvalidFormat {
            field: "payload".to_string(),
            reason: "must be well-formed JSON".to_string(),
        });
    }

    Ok(())
}

/// Validates a complete event draft before it is handed to the event log.
pub fn validate_draft(draft: &EventDraft) -> ValidationResult<()> {
    validate_type_label("event_type", &draft.event_type)?;
    validate_type_label("entity_type", &draft.entity_type)?;
    validate_identifier("entity_id", &draft.entity_id)?;
    validate_identifier("device_id", &draft.device_id)?;
    validate_identifier("user_id", &draft.user_id)?;
    validate_payload(&draft.payload)?;
    Ok(())
}

/// Validates a `since` sequence bound supplied by a catch-up caller.
///
/// Zero means "from the beginning"; negative values are rejected.
pub fn validate_since_sequence(since: i64) -> ValidationResult<()> {
    if since < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: "since".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
