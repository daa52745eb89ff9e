//! # Error Types
//!
//! Domain-specific error types for catering-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  catering-core errors (this file)                                       │
//! │  ├── CoreError        - Workflow and schedule rule violations           │
//! │  └── ValidationError  - Malformed patches and inputs                    │
//! │                                                                         │
//! │  catering-db errors                                                     │
//! │  └── DbError          - Persistence failures, version conflicts         │
//! │                                                                         │
//! │  catering-engine errors                                                 │
//! │  └── EngineError      - What admin actions see (code + message)         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the pure domain layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A status change that the transition table does not allow.
    ///
    /// ## When This Occurs
    /// - Advancing an invoice from `draft` straight to `paid`
    /// - Moving a `completed` quote anywhere without a forcing trigger
    #[error("Invalid {entity} transition: {from} -> {to} ({trigger})")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
        trigger: String,
    },

    /// Milestone rules that cannot be turned into amounts.
    #[error("Invalid payment schedule: {reason}")]
    InvalidSchedule { reason: String },

    /// Amount outside the allowed range (e.g. a negative invoice total).
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any mutation happens, so a patch that fails validation never
/// leaves partial writes behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
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

    /// Invalid format (e.g., malformed email, unknown discount type).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Date lies before the earliest allowed date.
    #[error("{field} cannot be before {earliest}")]
    DateInPast { field: String, earliest: String },

    /// The same selection appears in both the add and remove list.
    #[error("{field}: '{value}' is both added and removed")]
    Conflicting { field: String, value: String },
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
    fn test_transition_error_message() {
        let err = CoreError::InvalidTransition {
            entity: "invoice".to_string(),
            from: "draft".to_string(),
            to: "paid".to_string(),
            trigger: "admin".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid invoice transition: draft -> paid (admin)"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::OutOfRange {
            field: "guest_count".to_string(),
            min: 1,
            max: 5000,
        };
        assert_eq!(err.to_string(), "guest_count must be between 1 and 5000");

        let err = ValidationError::Conflicting {
            field: "menu_changes.proteins".to_string(),
            value: "Catfish".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "menu_changes.proteins: 'Catfish' is both added and removed"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::Required {
            field: "location".to_string(),
        }
        .into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
