//! # catering-engine: Quote Workflow and Change Request Engine
//!
//! Runs the quote → invoice workflow of a catering business and applies
//! customer change requests to live quotes and invoices without losing
//! admin edits.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Catering Engine Architecture                      │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │               ChangeRequestProcessor (approval saga)             │  │
//! │  │                                                                  │  │
//! │  │  approve / reject / request_more_info / submit                   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │      ┌───────────────┬────────┼────────┬──────────────────┐            │
//! │      ▼               ▼        ▼        ▼                  ▼             │
//! │  ┌──────────┐  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌────────────┐   │
//! │  │ Quote    │  │ Estimate │ │ History  │ │ Workflow │ │ Payment    │   │
//! │  │ Update   │  │ Versions │ │ Logger   │ │ Service  │ │ Schedule   │   │
//! │  │          │  │          │ │          │ │          │ │            │   │
//! │  │ patch,   │  │ frozen   │ │ field    │ │ status   │ │ deposit /  │   │
//! │  │ regen,   │  │ invoice  │ │ deltas,  │ │ table,   │ │ milestone /│   │
//! │  │ reconcile│  │ snapshots│ │ state log│ │ progress │ │ balance    │   │
//! │  └──────────┘  └──────────┘ └──────────┘ └──────────┘ └────────────┘   │
//! │                                                                         │
//! │  catering-core: pure rules (menu, reconcile, tax, schedule, workflow)   │
//! │  catering-db:   SQLite repositories (sqlx)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `CateringEngine` and its builder
//! - [`processor`] - Change request decisions and the approval saga
//! - [`quote_update`] - Quote writes, line item regeneration, invoice reconciliation
//! - [`estimate_version`] - Invoice snapshots
//! - [`history`] - Quote history and workflow state log
//! - [`workflow`] - Validated status changes and progress
//! - [`schedule`] - Payment schedules with due dates
//! - [`notification`] - Customer email port
//! - [`token`] - Customer access tokens and portal links
//! - [`config`] - Engine configuration (TOML + environment)
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use catering_engine::{CateringEngine, EngineConfig, TracingNotifier};
//!
//! let config = EngineConfig::load_or_default(None);
//! let engine = CateringEngine::open(config, Arc::new(TracingNotifier)).await?;
//!
//! let outcome = engine
//!     .processor()
//!     .approve(&change_request_id, "admin-1", Some("Updated your menu"))
//!     .await?;
//! println!("New total: {} ({})", outcome.totals.total, outcome.cost_change());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod estimate_version;
pub mod history;
pub mod notification;
pub mod processor;
pub mod quote_update;
pub mod schedule;
pub mod token;
pub mod workflow;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DatabaseSettings, EngineConfig, PortalSettings, TaxSettings};
pub use engine::{CateringEngine, CateringEngineBuilder};
pub use error::{EngineError, EngineResult};
pub use estimate_version::EstimateVersionService;
pub use history::{FieldDelta, HistoryLogger};
pub use notification::{EmailAction, EmailNotifier, EmailRequest, EmailResponse, TracingNotifier};
pub use processor::{ApprovalOutcome, ChangeRequestProcessor, DecisionOutcome, SagaStep};
pub use quote_update::{QuoteUpdateService, ReconciliationOutcome};
pub use schedule::{PaymentSchedule, PaymentScheduleService, ScheduledPayment};
pub use workflow::WorkflowService;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise engine and core logs are shown at
/// debug and SQL statements only when they warn.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,catering=debug,sqlx=warn"));

    // A second call (tests, embedding apps) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::{Days, Duration, NaiveDate, Utc};

    use crate::config::EngineConfig;
    use crate::engine::CateringEngine;
    use crate::notification::{EmailNotifier, TracingNotifier};
    use catering_core::test_fixtures::{sample_invoice, sample_quote};
    use catering_core::{Invoice, Money, NewQuoteRequest, QuoteRequest};
    use catering_db::{CustomLineItem, Database, DbConfig};

    /// Event date half a year from today; approval and schedule rules run
    /// against the wall clock.
    pub fn upcoming_event_date() -> NaiveDate {
        Utc::now().date_naive().checked_add_days(Days::new(180)).unwrap()
    }

    pub fn new_quote() -> NewQuoteRequest {
        NewQuoteRequest {
            event_date: upcoming_event_date(),
            ..catering_core::test_fixtures::new_quote()
        }
    }

    /// In-memory engine holding [`sample_quote`] and its sent invoice with
    /// freshly generated line items, moved to an upcoming event date.
    pub async fn seeded_engine() -> (CateringEngine, QuoteRequest, Invoice) {
        seeded_engine_with(Arc::new(TracingNotifier)).await
    }

    pub async fn seeded_engine_with(
        notifier: Arc<dyn EmailNotifier>,
    ) -> (CateringEngine, QuoteRequest, Invoice) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = CateringEngine::new(db, EngineConfig::default(), notifier);

        let quote = QuoteRequest {
            event_date: upcoming_event_date(),
            ..sample_quote()
        };
        engine.database().quotes().insert(&quote).await.unwrap();
        let items = engine.quotes().regenerate_line_items(&quote).await.unwrap();

        let invoice = Invoice {
            token_expires_at: Some(Utc::now() + Duration::days(90)),
            ..sample_invoice()
        };
        engine
            .database()
            .invoices()
            .create_with_items(&invoice, &items, engine.tax())
            .await
            .unwrap();

        let quote = engine.database().quotes().get_by_id(&quote.id).await.unwrap().unwrap();
        let invoice = engine
            .database()
            .invoices()
            .get_by_id(&invoice.id)
            .await
            .unwrap()
            .unwrap();
        (engine, quote, invoice)
    }

    pub fn cake() -> CustomLineItem {
        CustomLineItem {
            title: "Custom Cake".to_string(),
            description: Some("Three tiers".to_string()),
            quantity: 1,
            unit_price: Money::from_cents(15_000),
        }
    }
}
