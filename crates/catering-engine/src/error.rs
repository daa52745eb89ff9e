//! # Engine Error Types
//!
//! Error types for quote workflow operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐  │
//! │  │  Concurrency    │  │     Input       │  │     Workflow            │  │
//! │  │                 │  │                 │  │                         │  │
//! │  │  Conflict       │  │  Validation     │  │  AlreadyResolved        │  │
//! │  │                 │  │  InvalidSchedule│  │  InvalidTransition      │  │
//! │  │                 │  │  NotFound       │  │  StepFailed (saga)      │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                               │
//! │  │   Persistence   │  │  Configuration  │                               │
//! │  │                 │  │                 │                               │
//! │  │  Persistence    │  │  InvalidConfig  │                               │
//! │  │                 │  │  ConfigLoad/Save│                               │
//! │  └─────────────────┘  └─────────────────┘                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant maps to a stable machine code ([`EngineError::code`]) and a
//! message safe to show an admin ([`EngineError::user_message`]).

use thiserror::Error;

use crate::processor::SagaStep;
use catering_core::{CoreError, ValidationError};
use catering_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type covering every workflow failure.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Concurrency Errors
    // =========================================================================
    /// Optimistic lock lost; the record moved since it was read.
    #[error("{entity} {id} changed since it was read")]
    Conflict { entity: String, id: String },

    // =========================================================================
    // Input Errors
    // =========================================================================
    /// Requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Input rejected before any mutation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A payment schedule could not be produced.
    #[error("Invalid payment schedule: {0}")]
    InvalidSchedule(String),

    // =========================================================================
    // Workflow Errors
    // =========================================================================
    /// The change request was already approved or rejected.
    #[error("{entity} {id} is already {status}")]
    AlreadyResolved {
        entity: String,
        id: String,
        status: String,
    },

    /// The status change is not in the transition table.
    #[error("Invalid {entity} transition: {from} -> {to} ({trigger})")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
        trigger: String,
    },

    /// An approval step failed; the steps before it are already committed.
    #[error("Approval step {step} failed: {source}")]
    StepFailed {
        step: SagaStep,
        #[source]
        source: Box<EngineError>,
    },

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// Storage failed for a reason other than the ones above.
    #[error("Persistence error: {0}")]
    Persistence(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::VersionConflict { entity, id, .. } => EngineError::Conflict { entity, id },
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::AlreadyResolved { entity, id, status } => {
                EngineError::AlreadyResolved { entity, id, status }
            }
            other => EngineError::Persistence(other.to_string()),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition {
                entity,
                from,
                to,
                trigger,
            } => EngineError::InvalidTransition {
                entity,
                from,
                to,
                trigger,
            },
            CoreError::Validation(v) => EngineError::Validation(v),
            CoreError::InvalidSchedule { reason } | CoreError::InvalidAmount { reason } => {
                EngineError::InvalidSchedule(reason)
            }
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Wraps a failure with the approval step it happened in.
    pub fn at_step(step: SagaStep, source: EngineError) -> Self {
        EngineError::StepFailed {
            step,
            source: Box::new(source),
        }
    }

    /// The error with any step wrapper removed.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stable machine-readable code for API responses.
    ///
    /// A step failure reports the code of the error underneath it.
    pub fn code(&self) -> &'static str {
        match self.root() {
            EngineError::Conflict { .. } => "OPTIMISTIC_LOCK_CONFLICT",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::Validation(_) | EngineError::InvalidSchedule(_) => "VALIDATION_ERROR",
            EngineError::AlreadyResolved { .. } => "ALREADY_RESOLVED",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::Persistence(_) | EngineError::StepFailed { .. } => "PERSISTENCE_ERROR",
            EngineError::InvalidConfig(_)
            | EngineError::ConfigLoadFailed(_)
            | EngineError::ConfigSaveFailed(_) => "CONFIG_ERROR",
        }
    }

    /// Message suitable for showing to an admin.
    pub fn user_message(&self) -> String {
        match self.root() {
            EngineError::Conflict { .. } => {
                "This record changed while you were editing it. Please refresh and try again."
                    .to_string()
            }
            EngineError::NotFound { entity, .. } => {
                format!("The requested {} could not be found.", entity.replace('_', " "))
            }
            EngineError::Validation(v) => format!("Please check your input: {}.", v),
            EngineError::InvalidSchedule(_) => {
                "A payment schedule could not be built for this invoice.".to_string()
            }
            EngineError::AlreadyResolved { status, .. } => {
                format!("This change request has already been {}.", status)
            }
            EngineError::InvalidTransition { to, .. } => {
                format!("The record cannot be moved to '{}' from its current status.", to)
            }
            EngineError::InvalidConfig(_)
            | EngineError::ConfigLoadFailed(_)
            | EngineError::ConfigSaveFailed(_) => {
                "The service is misconfigured. Contact support.".to_string()
            }
            EngineError::Persistence(_) | EngineError::StepFailed { .. } => {
                "Your changes could not be saved. Please try again.".to_string()
            }
        }
    }

    /// Returns true if re-reading and retrying the operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            EngineError::Conflict { .. } | EngineError::Persistence(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.root(),
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}
