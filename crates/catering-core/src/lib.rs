//! # catering-core: Pure Business Logic for the Catering Quote Engine
//!
//! This crate holds every pricing, workflow and reconciliation rule as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Catering Engine Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │          Admin actions / customer portal / webhooks             │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │ in-process calls                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │              catering-engine (services + saga)                  │    │
//! │  │    ChangeRequestProcessor, QuoteUpdateService, HistoryLogger    │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │              ★ catering-core (THIS CRATE) ★                     │    │
//! │  │                                                                 │    │
//! │  │   workflow · menu · patch · reconcile · schedule · tax          │    │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │                catering-db (Database Layer)                     │    │
//! │  │         SQLite queries, migrations, repositories                │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities (QuoteRequest, Invoice, ChangeRequest, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`workflow`] - Status enums, transition tables, per-phase progress
//! - [`tax`] - Discounts and two-component tax
//! - [`schedule`] - Customer classification and payment milestones
//! - [`menu`] - Price book and canonical line-item generation
//! - [`patch`] - Change-request patches and partial quote updates
//! - [`reconcile`] - Merging regenerated items into persisted items
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use catering_core::money::Money;
//! use catering_core::tax::TaxCalculationService;
//!
//! let totals = TaxCalculationService::default().calculate(Money::from_cents(100_000), None, false);
//! assert_eq!(totals.total.cents(), 109_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod menu;
pub mod money;
pub mod patch;
pub mod reconcile;
pub mod schedule;
pub mod tax;
pub mod types;
pub mod validation;
pub mod workflow;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod test_fixtures;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;
pub use workflow::{InvoiceStatus, QuoteWorkflowStatus, TransitionTrigger, WorkflowState};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest event the kitchen will quote.
pub const MAX_GUEST_COUNT: i64 = 5_000;

/// Selections allowed per menu category.
pub const MAX_SELECTIONS_PER_CATEGORY: usize = 12;

/// Days a customer access token stays valid.
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 90;
