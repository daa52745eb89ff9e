//! # Quote Update Service
//!
//! Everything that rewrites a quote or its invoice line items.
//!
//! ## Change Application
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply_changes(quote, patch)           pure: QuoteUpdates               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  update_quote(quote, updates)          UPDATE ... WHERE version = ?     │
//! │       │                                (conflict → nothing written)     │
//! │       ▼                                                                 │
//! │  regenerate_line_items(quote)          planning items, replaced whole   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  update_invoice_line_items(..)         one transaction:                 │
//! │                                         delete removed                  │
//! │                                         update matched (keep overrides) │
//! │                                         insert new                      │
//! │                                         recompute totals                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Custom items an admin added by hand have no source key and are never
//! matched by a generated item, so they survive every reconciliation unless a
//! patch names them in `remove_line_items`.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::history::HistoryLogger;
use crate::token::generate_access_token;
use catering_core::menu::{generate_line_items, CanonicalLineItem, PriceBook};
use catering_core::patch::{self, removals, QuoteUpdates, RequestedChanges};
use catering_core::reconcile::{plan_reconciliation, ReconciliationPlan};
use catering_core::tax::{Discount, TaxBreakdown, TaxCalculationService};
use catering_core::validation::validate_new_quote;
use catering_core::workflow::{validate_transition, TransitionTrigger, WorkflowEntity};
use catering_core::{
    Invoice, InvoiceLineItem, InvoiceStatus, ManualOverrides, Money, NewQuoteRequest,
    QuoteRequest, QuoteWorkflowStatus, ValidationError,
};
use catering_db::{CustomLineItem, Database};

/// What a reconciliation did to an invoice.
#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub plan: ReconciliationPlan,
    pub previous_total: Money,
    pub totals: TaxBreakdown,
}

impl ReconciliationOutcome {
    pub fn cost_change(&self) -> Money {
        self.totals.total - self.previous_total
    }
}

#[derive(Debug, Clone)]
pub struct QuoteUpdateService {
    db: Database,
    price_book: Arc<PriceBook>,
    tax: TaxCalculationService,
    history: HistoryLogger,
    token_ttl_days: i64,
}

impl QuoteUpdateService {
    pub fn new(
        db: Database,
        price_book: Arc<PriceBook>,
        tax: TaxCalculationService,
        history: HistoryLogger,
        token_ttl_days: i64,
    ) -> Self {
        QuoteUpdateService {
            db,
            price_book,
            tax,
            history,
            token_ttl_days,
        }
    }

    // =========================================================================
    // Quotes
    // =========================================================================

    /// Validates and stores a new quote request with its planning items.
    pub async fn create_quote(
        &self,
        input: &NewQuoteRequest,
        created_by: &str,
    ) -> EngineResult<QuoteRequest> {
        let now = Utc::now();
        validate_new_quote(input, now.date_naive())?;

        let quote = QuoteRequest::from_submission(Uuid::new_v4().to_string(), input, now);
        self.db.quotes().insert(&quote).await?;
        self.regenerate_line_items(&quote).await?;

        self.history
            .log_transition(
                WorkflowEntity::Quote,
                &quote.id,
                None,
                QuoteWorkflowStatus::Pending.as_str(),
                created_by,
                Some("quote requested"),
                json!({ "guest_count": quote.guest_count }),
            )
            .await?;

        info!(quote_id = %quote.id, event = %quote.event_name, "Quote created");
        self.load_quote(&quote.id).await
    }

    /// Computes the partial update a patch makes to `current`.
    pub fn apply_changes(
        &self,
        current: &QuoteRequest,
        changes: &RequestedChanges,
        now: DateTime<Utc>,
    ) -> QuoteUpdates {
        patch::apply_changes(current, changes, now)
    }

    /// Writes `updates` under the optimistic lock held by `current.version`.
    ///
    /// ## Errors
    /// * `Conflict` - the quote changed since `current` was read
    /// * `InvalidTransition` - the status move is not allowed
    pub async fn update_quote(
        &self,
        current: &QuoteRequest,
        updates: &QuoteUpdates,
    ) -> EngineResult<QuoteRequest> {
        validate_transition(
            current.workflow_status,
            updates.workflow_status,
            TransitionTrigger::ChangeRequestApproved,
        )?;

        let version = self
            .db
            .quotes()
            .update_versioned(&current.id, current.version, updates)
            .await?;
        debug!(quote_id = %current.id, version, "Quote updated");

        self.load_quote(&current.id).await
    }

    /// Replaces the planning items of `quote` with a fresh canonical set.
    pub async fn regenerate_line_items(
        &self,
        quote: &QuoteRequest,
    ) -> EngineResult<Vec<CanonicalLineItem>> {
        let items = generate_line_items(quote, &self.price_book);
        let total = self.db.quotes().replace_line_items(&quote.id, &items).await?;
        debug!(quote_id = %quote.id, items = items.len(), %total, "Planning items regenerated");
        Ok(items)
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    /// Creates the draft invoice of a quote with generated items.
    ///
    /// A quote has at most one invoice.
    pub async fn generate_invoice(&self, quote_id: &str, created_by: &str) -> EngineResult<Invoice> {
        let quote = self.load_quote(quote_id).await?;
        if self.db.invoices().get_by_quote(quote_id).await?.is_some() {
            return Err(ValidationError::Conflicting {
                field: "quote_request_id".to_string(),
                value: quote_id.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let token = generate_access_token(now, self.token_ttl_days)?;
        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            quote_request_id: quote.id.clone(),
            invoice_number: self.db.invoices().next_invoice_number(now).await?,
            status: InvoiceStatus::Draft,
            workflow_status: InvoiceStatus::Draft,
            subtotal_cents: 0,
            discount: None,
            discount_cents: 0,
            tax_amount_cents: 0,
            total_amount_cents: 0,
            manual_overrides: ManualOverrides::default(),
            customer_access_token: Some(token.token),
            token_expires_at: Some(token.expires_at),
            created_at: now,
            updated_at: now,
        };

        let items = generate_line_items(&quote, &self.price_book);
        let totals = self
            .db
            .invoices()
            .create_with_items(&invoice, &items, &self.tax)
            .await?;

        self.history
            .log_transition(
                WorkflowEntity::Invoice,
                &invoice.id,
                None,
                InvoiceStatus::Draft.as_str(),
                created_by,
                Some("invoice generated"),
                json!({ "total_cents": totals.total.cents() }),
            )
            .await?;

        info!(
            invoice_id = %invoice.id,
            number = %invoice.invoice_number,
            total = %totals.total,
            "Invoice generated"
        );
        self.load_invoice(&invoice.id).await
    }

    /// Brings an invoice's items in line with the changed quote.
    ///
    /// `before` is the quote as it was when the patch was applied; its
    /// canonical set tells a generated price from an admin override.
    pub async fn update_invoice_line_items(
        &self,
        invoice_id: &str,
        before: &QuoteRequest,
        after: &QuoteRequest,
        changes: &RequestedChanges,
    ) -> EngineResult<ReconciliationOutcome> {
        let invoice = self.load_invoice(invoice_id).await?;
        let persisted = self.db.invoices().get_line_items(invoice_id).await?;

        let previous = generate_line_items(before, &self.price_book);
        let canonical = generate_line_items(after, &self.price_book);
        let plan = plan_reconciliation(
            &persisted,
            &canonical,
            &previous,
            &removals(before, changes),
        );

        let totals = self
            .db
            .invoices()
            .apply_reconciliation(invoice_id, &plan, &self.tax)
            .await?;

        info!(
            invoice_id = %invoice_id,
            deleted = plan.deletes.len(),
            updated = plan.updates.len(),
            inserted = plan.inserts.len(),
            kept = plan.untouched.len(),
            total = %totals.total,
            "Invoice line items reconciled"
        );

        Ok(ReconciliationOutcome {
            plan,
            previous_total: invoice.total(),
            totals,
        })
    }

    pub async fn recalculate_totals(&self, invoice_id: &str) -> EngineResult<TaxBreakdown> {
        Ok(self.db.invoices().recompute_totals(invoice_id, &self.tax).await?)
    }

    /// Adds a hand-entered item; it survives later regenerations.
    pub async fn add_custom_line_item(
        &self,
        invoice_id: &str,
        item: &CustomLineItem,
    ) -> EngineResult<InvoiceLineItem> {
        if item.title.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "title".to_string(),
            }
            .into());
        }
        if item.quantity <= 0 || item.unit_price.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 1,
                max: i64::MAX,
            }
            .into());
        }
        Ok(self
            .db
            .invoices()
            .insert_line_item(invoice_id, item, &self.tax)
            .await?)
    }

    /// Sets a negotiated unit price that regeneration will not overwrite.
    pub async fn override_line_item_price(
        &self,
        item_id: &str,
        unit_price: Money,
    ) -> EngineResult<TaxBreakdown> {
        if unit_price.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "unit_price".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }
        Ok(self
            .db
            .invoices()
            .override_line_item_price(item_id, unit_price, &self.tax)
            .await?)
    }

    pub async fn set_discount(
        &self,
        invoice_id: &str,
        discount: Option<Discount>,
    ) -> EngineResult<TaxBreakdown> {
        Ok(self
            .db
            .invoices()
            .set_discount(invoice_id, discount, &self.tax)
            .await?)
    }

    pub async fn set_manual_overrides(
        &self,
        invoice_id: &str,
        overrides: &ManualOverrides,
    ) -> EngineResult<TaxBreakdown> {
        Ok(self
            .db
            .invoices()
            .set_manual_overrides(invoice_id, overrides, &self.tax)
            .await?)
    }

    async fn load_quote(&self, quote_id: &str) -> EngineResult<QuoteRequest> {
        self.db
            .quotes()
            .get_by_id(quote_id)
            .await?
            .ok_or_else(|| EngineError::not_found("quote_request", quote_id))
    }

    async fn load_invoice(&self, invoice_id: &str) -> EngineResult<Invoice> {
        self.db
            .invoices()
            .get_by_id(invoice_id)
            .await?
            .ok_or_else(|| EngineError::not_found("invoice", invoice_id))
    }
}
