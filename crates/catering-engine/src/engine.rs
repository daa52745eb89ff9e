//! # Catering Engine
//!
//! Wires the services of this crate to one database and one configuration.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            CateringEngine                               │
//! │                                                                         │
//! │   EngineConfig ──┬── TaxCalculationService                              │
//! │                  ├── PaymentScheduleBuilder (SchedulePolicy)            │
//! │                  └── PortalSettings (base URL, token TTL)               │
//! │                                                                         │
//! │   Database ──────┬── QuoteUpdateService ────────┐                       │
//! │                  ├── EstimateVersionService ────┤                       │
//! │                  ├── HistoryLogger ─────────────┼── ChangeRequest       │
//! │                  ├── WorkflowService ───────────┤   Processor           │
//! │                  └── PaymentScheduleService ────┘       │               │
//! │                                                         ▼               │
//! │                                             Arc<dyn EmailNotifier>      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::estimate_version::EstimateVersionService;
use crate::history::HistoryLogger;
use crate::notification::{EmailNotifier, TracingNotifier};
use crate::processor::ChangeRequestProcessor;
use crate::quote_update::QuoteUpdateService;
use crate::schedule::PaymentScheduleService;
use crate::workflow::WorkflowService;
use catering_core::menu::PriceBook;
use catering_core::schedule::PaymentScheduleBuilder;
use catering_core::tax::TaxCalculationService;
use catering_db::Database;

pub struct CateringEngine {
    db: Database,
    config: EngineConfig,
    tax: TaxCalculationService,
    quotes: QuoteUpdateService,
    versions: EstimateVersionService,
    history: HistoryLogger,
    workflow: WorkflowService,
    schedules: PaymentScheduleService,
    processor: ChangeRequestProcessor,
}

impl CateringEngine {
    /// Engine with the default price book.
    pub fn new(db: Database, config: EngineConfig, notifier: Arc<dyn EmailNotifier>) -> Self {
        CateringEngine::builder(config)
            .with_notifier(notifier)
            .build(db)
    }

    /// Opens the configured database, running migrations, and builds the
    /// engine on it.
    pub async fn open(config: EngineConfig, notifier: Arc<dyn EmailNotifier>) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        Ok(CateringEngine::new(db, config, notifier))
    }

    pub fn builder(config: EngineConfig) -> CateringEngineBuilder {
        CateringEngineBuilder::new(config)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tax(&self) -> &TaxCalculationService {
        &self.tax
    }

    pub fn quotes(&self) -> &QuoteUpdateService {
        &self.quotes
    }

    pub fn estimate_versions(&self) -> &EstimateVersionService {
        &self.versions
    }

    pub fn history(&self) -> &HistoryLogger {
        &self.history
    }

    pub fn workflow(&self) -> &WorkflowService {
        &self.workflow
    }

    pub fn schedules(&self) -> &PaymentScheduleService {
        &self.schedules
    }

    pub fn processor(&self) -> &ChangeRequestProcessor {
        &self.processor
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`CateringEngine`].
pub struct CateringEngineBuilder {
    config: EngineConfig,
    price_book: PriceBook,
    notifier: Arc<dyn EmailNotifier>,
}

impl CateringEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        CateringEngineBuilder {
            config,
            price_book: PriceBook::default(),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_price_book(mut self, price_book: PriceBook) -> Self {
        self.price_book = price_book;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn EmailNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self, db: Database) -> CateringEngine {
        let config = self.config;
        let tax = TaxCalculationService::new(config.tax_config());
        let history = HistoryLogger::new(&db);
        let quotes = QuoteUpdateService::new(
            db.clone(),
            Arc::new(self.price_book),
            tax,
            history.clone(),
            config.portal.token_ttl_days,
        );
        let versions = EstimateVersionService::new(db.clone());
        let workflow = WorkflowService::new(db.clone(), history.clone());
        let schedules = PaymentScheduleService::new(
            db.clone(),
            PaymentScheduleBuilder::new(config.schedule_policy()),
        );
        let processor = ChangeRequestProcessor::new(
            db.clone(),
            quotes.clone(),
            versions.clone(),
            history.clone(),
            workflow.clone(),
            schedules.clone(),
            self.notifier,
            config.portal.clone(),
        );

        info!(
            portal = %config.portal.base_url,
            token_ttl_days = config.portal.token_ttl_days,
            "Catering engine ready"
        );

        CateringEngine {
            db,
            config,
            tax,
            quotes,
            versions,
            history,
            workflow,
            schedules,
            processor,
        }
    }
}
