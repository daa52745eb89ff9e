//! # Change Request Processor
//!
//! Decides customer change requests: approve, reject, or ask for more
//! information.
//!
//! ## Approval Saga
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  #   Step                    On failure                                 │
//! │  ──  ──────────────────────  ─────────────────────────────────────────  │
//! │   1  load_context            fail fast (not found, resolved, invalid,   │
//! │                              token TTL out of range)                    │
//! │   2  snapshot                warn and continue                          │
//! │   3  compute_updates         abort                                      │
//! │   4  write_quote             abort (version conflict writes nothing)    │
//! │   5  regenerate_quote_items  abort                                      │
//! │   6  refresh_invoice         abort                                      │
//! │   7  reconcile_invoice       abort (single transaction)                 │
//! │   8  record_history          warn and continue                          │
//! │   9  mark_approved           abort (guarded: WHERE status = 'pending')  │
//! │  10  rotate_token            abort                                      │
//! │  11  reset_invoice_status    abort                                      │
//! │  12  log_transition          abort                                      │
//! │  13  notify_customer         warn and continue                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps are not one database transaction. A failure after step 4 leaves the
//! committed steps in place and reports which step failed through
//! [`EngineError::StepFailed`]; the request stays `pending` until step 9, so
//! it can be approved again once the cause is fixed. A retried approval
//! reports its cost change against the invoice total held in the first
//! snapshot taken for the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::PortalSettings;
use crate::error::{EngineError, EngineResult};
use crate::estimate_version::EstimateVersionService;
use crate::history::{HistoryContext, HistoryLogger};
use crate::notification::{notify_best_effort, EmailAction, EmailNotifier, EmailRequest, EmailResponse};
use crate::quote_update::QuoteUpdateService;
use crate::schedule::{build_schedule, PaymentSchedule, PaymentScheduleService};
use crate::token::{generate_access_token, portal_link};
use crate::workflow::WorkflowService;
use catering_core::patch::RequestedChanges;
use catering_core::tax::TaxBreakdown;
use catering_core::validation::validate_requested_changes;
use catering_core::workflow::{TransitionTrigger, WorkflowEntity};
use catering_core::{
    ChangeRequest, ChangeRequestStatus, Invoice, InvoiceStatus, Money, QuoteRequest,
};
use catering_db::{Database, Resolution};

// =============================================================================
// Saga Steps
// =============================================================================

/// One step of the approval saga, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStep {
    LoadContext,
    Snapshot,
    ComputeUpdates,
    WriteQuote,
    RegenerateQuoteItems,
    RefreshInvoice,
    ReconcileInvoice,
    RecordHistory,
    MarkApproved,
    RotateToken,
    ResetInvoiceStatus,
    LogTransition,
    NotifyCustomer,
}

impl SagaStep {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SagaStep::LoadContext => "load_context",
            SagaStep::Snapshot => "snapshot",
            SagaStep::ComputeUpdates => "compute_updates",
            SagaStep::WriteQuote => "write_quote",
            SagaStep::RegenerateQuoteItems => "regenerate_quote_items",
            SagaStep::RefreshInvoice => "refresh_invoice",
            SagaStep::ReconcileInvoice => "reconcile_invoice",
            SagaStep::RecordHistory => "record_history",
            SagaStep::MarkApproved => "mark_approved",
            SagaStep::RotateToken => "rotate_token",
            SagaStep::ResetInvoiceStatus => "reset_invoice_status",
            SagaStep::LogTransition => "log_transition",
            SagaStep::NotifyCustomer => "notify_customer",
        }
    }

    /// 1-based position in the saga.
    pub const fn number(&self) -> u8 {
        *self as u8 + 1
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.as_str())
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of an approval.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub change_request_id: String,
    pub quote: QuoteRequest,
    pub invoice_id: String,
    /// `None` when the snapshot step failed.
    pub snapshot_version: Option<i64>,
    pub previous_total: Money,
    pub totals: TaxBreakdown,
    pub items_deleted: usize,
    pub items_updated: usize,
    pub items_inserted: usize,
    pub access_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub estimate_link: String,
    /// `None` when no schedule could be built for the new total.
    pub payment_schedule: Option<PaymentSchedule>,
    pub notification: EmailResponse,
}

impl ApprovalOutcome {
    pub fn cost_change(&self) -> Money {
        self.totals.total - self.previous_total
    }
}

/// Result of a rejection or a request for more information.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub change_request: ChangeRequest,
    pub notification: EmailResponse,
}

/// Change request, invoice and quote as read at the start of a decision.
struct DecisionContext {
    request: ChangeRequest,
    invoice: Invoice,
    quote: QuoteRequest,
}

// =============================================================================
// Processor
// =============================================================================

pub struct ChangeRequestProcessor {
    db: Database,
    quotes: QuoteUpdateService,
    versions: EstimateVersionService,
    history: HistoryLogger,
    workflow: WorkflowService,
    schedules: PaymentScheduleService,
    notifier: Arc<dyn EmailNotifier>,
    portal: PortalSettings,
}

impl ChangeRequestProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        quotes: QuoteUpdateService,
        versions: EstimateVersionService,
        history: HistoryLogger,
        workflow: WorkflowService,
        schedules: PaymentScheduleService,
        notifier: Arc<dyn EmailNotifier>,
        portal: PortalSettings,
    ) -> Self {
        ChangeRequestProcessor {
            db,
            quotes,
            versions,
            history,
            workflow,
            schedules,
            notifier,
            portal,
        }
    }

    /// Stores a new pending change request from the customer portal.
    ///
    /// The patch is validated here so a request that can never be approved
    /// is refused at the door.
    pub async fn submit(
        &self,
        invoice_id: &str,
        changes: RequestedChanges,
        customer_comments: Option<String>,
    ) -> EngineResult<ChangeRequest> {
        let now = Utc::now();
        validate_requested_changes(&changes, now.date_naive())?;
        self.db
            .invoices()
            .get_by_id(invoice_id)
            .await?
            .ok_or_else(|| EngineError::not_found("invoice", invoice_id))?;

        let request = ChangeRequest {
            id: uuid::Uuid::new_v4().to_string(),
            invoice_id: invoice_id.to_string(),
            requested_changes: changes,
            customer_comments,
            status: ChangeRequestStatus::Pending,
            admin_response: None,
            estimated_cost_change_cents: None,
            resolved_by: None,
            created_at: now,
            resolved_at: None,
        };
        self.db.change_requests().insert(&request).await?;

        self.history
            .log_transition(
                WorkflowEntity::ChangeRequest,
                &request.id,
                None,
                ChangeRequestStatus::Pending.as_str(),
                "customer",
                None,
                json!({ "invoice_id": invoice_id }),
            )
            .await?;

        info!(change_request_id = %request.id, invoice_id = %invoice_id, "Change request submitted");
        Ok(request)
    }

    /// Applies a pending change request to its quote and invoice.
    pub async fn approve(
        &self,
        change_request_id: &str,
        admin_id: &str,
        admin_response: Option<&str>,
    ) -> EngineResult<ApprovalOutcome> {
        let context = self.load_pending(change_request_id).await?;
        self.approve_loaded(context, admin_id, admin_response, Utc::now())
            .await
    }

    /// Steps 1 to 13 for a context read by [`Self::load_pending`].
    async fn approve_loaded(
        &self,
        context: DecisionContext,
        admin_id: &str,
        admin_response: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<ApprovalOutcome> {
        // 1. Validate; nothing has been written yet
        let DecisionContext {
            request,
            invoice,
            quote,
        } = context;
        validate_requested_changes(&request.requested_changes, now.date_naive())?;
        let token = generate_access_token(now, self.portal.token_ttl_days)?;
        info!(
            step = SagaStep::LoadContext.as_str(),
            change_request_id = %request.id,
            invoice_id = %invoice.id,
            quote_id = %quote.id,
            quote_version = quote.version,
            "Approving change request"
        );

        // 2. Snapshot (best effort)
        let snapshot_version = match self
            .versions
            .create_snapshot(&invoice.id, Some(&request.id), admin_id)
            .await
        {
            Ok(version) => Some(version.version_number),
            Err(e) => {
                warn!(
                    step = SagaStep::Snapshot.as_str(),
                    invoice_id = %invoice.id,
                    error = %e,
                    "Estimate snapshot failed; continuing without it"
                );
                None
            }
        };

        // 3. Compute the quote patch
        let updates = self
            .quotes
            .apply_changes(&quote, &request.requested_changes, now);

        // 4. Write the quote under the optimistic lock
        let updated_quote = self
            .quotes
            .update_quote(&quote, &updates)
            .await
            .map_err(|e| abort(SagaStep::WriteQuote, &request.id, e))?;

        // 5. Regenerate planning items
        self.quotes
            .regenerate_line_items(&updated_quote)
            .await
            .map_err(|e| abort(SagaStep::RegenerateQuoteItems, &request.id, e))?;

        // 6. Re-read the invoice; its totals may have moved since step 1
        let current_invoice = self
            .db
            .invoices()
            .get_by_id(&invoice.id)
            .await
            .map_err(EngineError::from)
            .and_then(|found| found.ok_or_else(|| EngineError::not_found("invoice", &invoice.id)))
            .map_err(|e| abort(SagaStep::RefreshInvoice, &request.id, e))?;

        // 7. Reconcile invoice items and recompute totals
        let reconciled = self
            .quotes
            .update_invoice_line_items(
                &current_invoice.id,
                &quote,
                &updated_quote,
                &request.requested_changes,
            )
            .await
            .map_err(|e| abort(SagaStep::ReconcileInvoice, &request.id, e))?;
        let previous_total = self
            .approval_baseline(&invoice.id, &request.id)
            .await
            .unwrap_or(reconciled.previous_total);
        let cost_change = reconciled.totals.total - previous_total;

        // 8. Field-level history (best effort)
        let ctx = HistoryContext {
            quote_id: &quote.id,
            change_request_id: Some(&request.id),
            changed_by: admin_id,
            at: now,
        };
        if let Err(e) = self
            .history
            .record_quote_change(ctx, &quote, &updated_quote, Some(&reconciled.plan))
            .await
        {
            warn!(
                step = SagaStep::RecordHistory.as_str(),
                quote_id = %quote.id,
                error = %e,
                "Quote history not recorded"
            );
        }

        // 9. Mark approved; only one decision can win
        self.db
            .change_requests()
            .resolve(
                &request.id,
                &Resolution {
                    status: ChangeRequestStatus::Approved,
                    resolved_by: admin_id,
                    admin_response,
                    estimated_cost_change: Some(cost_change),
                    resolved_at: now,
                },
            )
            .await
            .map_err(|e| abort(SagaStep::MarkApproved, &request.id, e.into()))?;

        // 10. Rotate the customer access token
        self.db
            .invoices()
            .rotate_token(&current_invoice.id, &token.token, token.expires_at)
            .await
            .map_err(|e| abort(SagaStep::RotateToken, &request.id, e.into()))?;

        // 11. Force the invoice back to `sent` for the customer to review
        self.workflow
            .advance_invoice(
                &current_invoice.id,
                InvoiceStatus::Sent,
                TransitionTrigger::ChangeRequestApproved,
                admin_id,
            )
            .await
            .map_err(|e| abort(SagaStep::ResetInvoiceStatus, &request.id, e))?;

        // 12. Status log for the request and the quote
        self.log_approval(
            &request,
            &quote,
            &updated_quote,
            admin_id,
            json!({
                "invoice_id": current_invoice.id,
                "previous_total_cents": previous_total.cents(),
                "new_total_cents": reconciled.totals.total.cents(),
                "cost_change_cents": cost_change.cents(),
                "snapshot_version": snapshot_version,
            }),
        )
        .await
        .map_err(|e| abort(SagaStep::LogTransition, &request.id, e))?;

        // 13. Notify the customer (best effort)
        let estimate_link = portal_link(&self.portal.base_url, &token.token);
        let notification = notify_best_effort(
            self.notifier.as_ref(),
            email_for(&updated_quote, EmailAction::Approved).map(|mut email| {
                email.admin_response = admin_response.map(str::to_string);
                email.cost_change = Some(cost_change);
                email.estimate_link = Some(estimate_link.clone());
                email
            }),
        )
        .await;

        let mut final_invoice = current_invoice;
        final_invoice.total_amount_cents = reconciled.totals.total.cents();
        final_invoice.workflow_status = InvoiceStatus::Sent;
        let payment_schedule = match build_schedule(
            self.schedules.builder(),
            &final_invoice,
            &updated_quote,
            now.date_naive(),
        ) {
            Ok(schedule) => Some(schedule),
            Err(e) => {
                warn!(invoice_id = %final_invoice.id, error = %e, "Payment schedule unavailable");
                None
            }
        };

        info!(
            change_request_id = %request.id,
            quote_version = updated_quote.version,
            previous_total = %previous_total,
            new_total = %reconciled.totals.total,
            cost_change = %cost_change,
            "Change request approved"
        );

        Ok(ApprovalOutcome {
            change_request_id: request.id,
            quote: updated_quote,
            invoice_id: final_invoice.id,
            snapshot_version,
            previous_total,
            totals: reconciled.totals,
            items_deleted: reconciled.plan.deletes.len(),
            items_updated: reconciled.plan.updates.len(),
            items_inserted: reconciled.plan.inserts.len(),
            access_token: token.token,
            token_expires_at: token.expires_at,
            estimate_link,
            payment_schedule,
            notification,
        })
    }

    /// Declines a pending change request. The quote and invoice are left as
    /// they are.
    pub async fn reject(
        &self,
        change_request_id: &str,
        admin_id: &str,
        admin_response: Option<&str>,
    ) -> EngineResult<DecisionOutcome> {
        let DecisionContext { request, quote, .. } = self.load_pending(change_request_id).await?;
        let now = Utc::now();

        self.db
            .change_requests()
            .resolve(
                &request.id,
                &Resolution {
                    status: ChangeRequestStatus::Rejected,
                    resolved_by: admin_id,
                    admin_response,
                    estimated_cost_change: None,
                    resolved_at: now,
                },
            )
            .await?;

        self.history
            .log_transition(
                WorkflowEntity::ChangeRequest,
                &request.id,
                Some(ChangeRequestStatus::Pending.as_str()),
                ChangeRequestStatus::Rejected.as_str(),
                admin_id,
                admin_response,
                json!({ "invoice_id": request.invoice_id }),
            )
            .await?;

        let notification = notify_best_effort(
            self.notifier.as_ref(),
            email_for(&quote, EmailAction::Rejected).map(|mut email| {
                email.admin_response = admin_response.map(str::to_string);
                email
            }),
        )
        .await;

        info!(change_request_id = %request.id, "Change request rejected");
        Ok(DecisionOutcome {
            change_request: self.load_request(&request.id).await?,
            notification,
        })
    }

    /// Asks the customer for details. The request stays pending.
    pub async fn request_more_info(
        &self,
        change_request_id: &str,
        admin_id: &str,
        message: &str,
    ) -> EngineResult<DecisionOutcome> {
        if message.trim().is_empty() {
            return Err(catering_core::ValidationError::Required {
                field: "admin_response".to_string(),
            }
            .into());
        }
        let DecisionContext {
            request,
            invoice,
            quote,
        } = self.load_pending(change_request_id).await?;

        self.db
            .change_requests()
            .set_admin_response(&request.id, message)
            .await?;

        self.history
            .log_transition(
                WorkflowEntity::ChangeRequest,
                &request.id,
                Some(ChangeRequestStatus::Pending.as_str()),
                ChangeRequestStatus::Pending.as_str(),
                admin_id,
                Some("more information requested"),
                json!({ "invoice_id": invoice.id }),
            )
            .await?;

        let link = invoice
            .customer_access_token
            .as_deref()
            .filter(|token| invoice.token_is_valid(token, Utc::now()))
            .map(|token| portal_link(&self.portal.base_url, token));
        let notification = notify_best_effort(
            self.notifier.as_ref(),
            email_for(&quote, EmailAction::RequestMoreInfo).map(|mut email| {
                email.admin_response = Some(message.to_string());
                email.estimate_link = link;
                email
            }),
        )
        .await;

        info!(change_request_id = %request.id, "More information requested");
        Ok(DecisionOutcome {
            change_request: self.load_request(&request.id).await?,
            notification,
        })
    }

    /// Schedule of an invoice as of `approval_date`.
    pub async fn payment_schedule(
        &self,
        invoice_id: &str,
        approval_date: chrono::NaiveDate,
    ) -> EngineResult<PaymentSchedule> {
        self.schedules.for_invoice(invoice_id, approval_date).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load_request(&self, id: &str) -> EngineResult<ChangeRequest> {
        self.db
            .change_requests()
            .get_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found("change_request", id))
    }

    /// Invoice total before the first attempt at a request, from the
    /// earliest snapshot taken for it.
    async fn approval_baseline(&self, invoice_id: &str, change_request_id: &str) -> Option<Money> {
        match self.versions.list_versions(invoice_id).await {
            Ok(versions) => versions
                .into_iter()
                .filter(|v| v.change_request_id.as_deref() == Some(change_request_id))
                .min_by_key(|v| v.version_number)
                .map(|v| v.snapshot.invoice.total()),
            Err(e) => {
                warn!(
                    invoice_id = %invoice_id,
                    error = %e,
                    "Estimate versions unreadable; using the reconciled baseline"
                );
                None
            }
        }
    }

    /// Loads a request with its invoice and quote, refusing resolved ones.
    async fn load_pending(&self, change_request_id: &str) -> EngineResult<DecisionContext> {
        let request = self.load_request(change_request_id).await?;
        if request.status.is_resolved() {
            return Err(EngineError::AlreadyResolved {
                entity: "change_request".to_string(),
                id: request.id,
                status: request.status.as_str().to_string(),
            });
        }

        let invoice = self
            .db
            .invoices()
            .get_by_id(&request.invoice_id)
            .await?
            .ok_or_else(|| EngineError::not_found("invoice", &request.invoice_id))?;
        let quote = self
            .db
            .quotes()
            .get_by_id(&invoice.quote_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("quote_request", &invoice.quote_request_id))?;

        Ok(DecisionContext {
            request,
            invoice,
            quote,
        })
    }

    async fn log_approval(
        &self,
        request: &ChangeRequest,
        before: &QuoteRequest,
        after: &QuoteRequest,
        admin_id: &str,
        metadata: serde_json::Value,
    ) -> EngineResult<()> {
        self.history
            .log_transition(
                WorkflowEntity::ChangeRequest,
                &request.id,
                Some(ChangeRequestStatus::Pending.as_str()),
                ChangeRequestStatus::Approved.as_str(),
                admin_id,
                None,
                metadata,
            )
            .await?;
        self.history
            .log_transition(
                WorkflowEntity::Quote,
                &before.id,
                Some(before.workflow_status.as_str()),
                after.workflow_status.as_str(),
                admin_id,
                Some(TransitionTrigger::ChangeRequestApproved.as_str()),
                json!({ "change_request_id": request.id, "version": after.version }),
            )
            .await
    }
}

/// Logs and wraps a failure of an aborting step.
fn abort(step: SagaStep, change_request_id: &str, err: EngineError) -> EngineError {
    error!(
        step = step.as_str(),
        change_request_id = %change_request_id,
        code = err.code(),
        error = %err,
        "Approval aborted"
    );
    EngineError::at_step(step, err)
}

/// Base email for a quote's contact, if they have an address.
fn email_for(quote: &QuoteRequest, action: EmailAction) -> Option<EmailRequest> {
    let to = quote.email.as_deref()?.trim();
    if to.is_empty() {
        return None;
    }
    Some(EmailRequest {
        to: to.to_string(),
        customer_name: quote.contact_name.clone(),
        event_name: quote.event_name.clone(),
        action,
        admin_response: None,
        cost_change: None,
        estimate_link: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CateringEngine;
    use crate::notification::testing::{FailingNotifier, RecordingNotifier};
    use crate::notification::TracingNotifier;
    use crate::test_support::{cake, seeded_engine, seeded_engine_with};
    use catering_core::patch::{CategoryChange, MenuChanges};
    use catering_core::{InvoiceLineItem, ManualOverrides, QuoteWorkflowStatus};

    fn swap_pork_for_catfish() -> RequestedChanges {
        RequestedChanges {
            menu_changes: Some(MenuChanges {
                proteins: Some(CategoryChange {
                    add: vec!["Catfish".to_string()],
                    remove: vec!["Pulled Pork".to_string()],
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn guests(n: i64) -> RequestedChanges {
        RequestedChanges {
            guest_count: Some(n),
            ..Default::default()
        }
    }

    fn find<'a>(items: &'a [InvoiceLineItem], title: &str) -> Option<&'a InvoiceLineItem> {
        items.iter().find(|i| i.title == title)
    }

    #[test]
    fn test_saga_step_display() {
        assert_eq!(SagaStep::LoadContext.number(), 1);
        assert_eq!(SagaStep::NotifyCustomer.number(), 13);
        assert_eq!(SagaStep::WriteQuote.to_string(), "4 (write_quote)");
    }

    #[tokio::test]
    async fn test_approve_protein_swap_keeps_custom_item() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (engine, quote, invoice) = seeded_engine_with(notifier.clone()).await;
        let db = engine.database();
        engine.quotes().add_custom_line_item(&invoice.id, &cake()).await.unwrap();

        let request = engine
            .processor()
            .submit(&invoice.id, swap_pork_for_catfish(), Some("No pork please".to_string()))
            .await
            .unwrap();
        let outcome = engine
            .processor()
            .approve(&request.id, "admin-1", Some("Swapped"))
            .await
            .unwrap();

        // invoice items
        let items = db.invoices().get_line_items(&invoice.id).await.unwrap();
        assert!(find(&items, "Pulled Pork").is_none());
        let catfish = find(&items, "Catfish").unwrap();
        assert_eq!(catfish.quantity, 100);
        assert_eq!(catfish.unit_price(), Money::from_cents(1_400));
        assert!(find(&items, "Custom Cake").is_some());
        assert_eq!(outcome.items_deleted, 1);
        assert_eq!(outcome.items_inserted, 1);

        // totals derive from the items
        let stored = db.invoices().get_by_id(&invoice.id).await.unwrap().unwrap();
        let sum: Money = items.iter().map(InvoiceLineItem::total_price).sum();
        assert_eq!(stored.subtotal(), sum);
        assert_eq!(stored.total(), outcome.totals.total);
        assert_eq!(outcome.totals.total, outcome.totals.taxable + outcome.totals.tax);
        assert_eq!(outcome.cost_change(), stored.total() - outcome.previous_total);

        // quote moved to estimated with a new version
        assert_eq!(outcome.quote.version, quote.version + 1);
        assert_eq!(outcome.quote.workflow_status, QuoteWorkflowStatus::Estimated);
        assert_eq!(
            outcome.quote.menu.proteins,
            vec!["Fried Chicken".to_string(), "Catfish".to_string()]
        );

        // request resolved with the cost change
        let resolved = db.change_requests().get_by_id(&request.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, ChangeRequestStatus::Approved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("admin-1"));
        assert_eq!(resolved.estimated_cost_change_cents, Some(outcome.cost_change().cents()));

        // snapshot holds the invoice as it was before approval
        assert_eq!(outcome.snapshot_version, Some(1));
        let snapshot = engine.estimate_versions().get_version(&invoice.id, 1).await.unwrap();
        assert!(find(&snapshot.snapshot.line_items, "Pulled Pork").is_some());
        assert_eq!(snapshot.change_request_id.as_deref(), Some(request.id.as_str()));

        // notification carries the new link
        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].action, EmailAction::Approved);
        assert_eq!(sent[0].to, "jordan@acme-events.com");
        assert_eq!(sent[0].estimate_link.as_deref(), Some(outcome.estimate_link.as_str()));
        assert!(outcome.estimate_link.ends_with(&outcome.access_token));
        assert!(outcome.notification.success);
    }

    #[tokio::test]
    async fn test_approve_preserves_price_override() {
        let (engine, _, invoice) = seeded_engine().await;
        let db = engine.database();
        let items = db.invoices().get_line_items(&invoice.id).await.unwrap();
        let chicken = find(&items, "Fried Chicken").unwrap();
        engine
            .quotes()
            .override_line_item_price(&chicken.id, Money::from_cents(999))
            .await
            .unwrap();

        let request = engine.processor().submit(&invoice.id, guests(120), None).await.unwrap();
        let outcome = engine.processor().approve(&request.id, "admin-1", None).await.unwrap();

        let items = db.invoices().get_line_items(&invoice.id).await.unwrap();
        let chicken = find(&items, "Fried Chicken").unwrap();
        assert_eq!(chicken.quantity, 120);
        assert_eq!(chicken.unit_price(), Money::from_cents(999));
        assert!(chicken.is_override);

        let pork = find(&items, "Pulled Pork").unwrap();
        assert_eq!(pork.quantity, 120);
        assert_eq!(pork.unit_price(), Money::from_cents(1_100));
        assert!(outcome.cost_change() > Money::from_cents(0));
    }

    #[tokio::test]
    async fn test_approve_rotates_token_and_resets_paid_invoice() {
        let (engine, _, invoice) = seeded_engine().await;
        let db = engine.database();
        engine
            .workflow()
            .advance_invoice(&invoice.id, InvoiceStatus::Paid, TransitionTrigger::Payment, "stripe")
            .await
            .unwrap();

        let request = engine.processor().submit(&invoice.id, guests(110), None).await.unwrap();
        let outcome = engine.processor().approve(&request.id, "admin-1", None).await.unwrap();

        let now = Utc::now();
        let old = invoice.customer_access_token.clone().unwrap();
        assert!(db.invoices().find_by_access_token(&old, now).await.unwrap().is_none());
        let found = db
            .invoices()
            .find_by_access_token(&outcome.access_token, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, invoice.id);
        assert_eq!(found.workflow_status, InvoiceStatus::Sent);
        assert_eq!(found.status, InvoiceStatus::Sent);
        assert_eq!(outcome.access_token.len(), 64);

        let log = engine
            .history()
            .workflow_log(WorkflowEntity::Invoice, &invoice.id)
            .await
            .unwrap();
        let reset = log.last().unwrap();
        assert_eq!(reset.previous_status.as_deref(), Some("paid"));
        assert_eq!(reset.new_status, "sent");
        assert_eq!(reset.reason.as_deref(), Some("change_request_approved"));
    }

    #[tokio::test]
    async fn test_approve_records_history_and_state_log() {
        let (engine, quote, invoice) = seeded_engine().await;
        let request = engine.processor().submit(&invoice.id, guests(150), None).await.unwrap();
        let outcome = engine.processor().approve(&request.id, "admin-1", None).await.unwrap();

        let history = engine.history().quote_history(&quote.id).await.unwrap();
        let guest_row = history.iter().find(|h| h.field == "guest_count").unwrap();
        assert_eq!(guest_row.old_value.as_deref(), Some("100"));
        assert_eq!(guest_row.new_value.as_deref(), Some("150"));
        assert_eq!(guest_row.change_request_id.as_deref(), Some(request.id.as_str()));
        assert!(history.iter().any(|h| h.field == "line_item"));

        let log = engine
            .history()
            .workflow_log(WorkflowEntity::ChangeRequest, &request.id)
            .await
            .unwrap();
        let approved = log.last().unwrap();
        assert_eq!(approved.previous_status.as_deref(), Some("pending"));
        assert_eq!(approved.new_status, "approved");
        assert_eq!(
            approved.metadata["cost_change_cents"],
            json!(outcome.cost_change().cents())
        );
        assert_eq!(approved.metadata["snapshot_version"], json!(1));

        let quote_log = engine
            .history()
            .workflow_log(WorkflowEntity::Quote, &quote.id)
            .await
            .unwrap();
        assert_eq!(quote_log.last().unwrap().new_status, "estimated");
    }

    #[tokio::test]
    async fn test_second_approval_is_already_resolved() {
        let (engine, quote, invoice) = seeded_engine().await;
        let request = engine.processor().submit(&invoice.id, guests(120), None).await.unwrap();
        engine.processor().approve(&request.id, "admin-1", None).await.unwrap();

        let err = engine
            .processor()
            .approve(&request.id, "admin-2", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_RESOLVED");

        // the losing call wrote nothing
        let current = engine.database().quotes().get_by_id(&quote.id).await.unwrap().unwrap();
        assert_eq!(current.version, quote.version + 1);
        assert_eq!(
            engine.estimate_versions().list_versions(&invoice.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_reject_leaves_quote_and_invoice_untouched() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (engine, quote, invoice) = seeded_engine_with(notifier.clone()).await;
        let db = engine.database();
        let items_before = db.invoices().get_line_items(&invoice.id).await.unwrap();

        let request = engine
            .processor()
            .submit(&invoice.id, swap_pork_for_catfish(), None)
            .await
            .unwrap();
        let outcome = engine
            .processor()
            .reject(&request.id, "admin-1", Some("Catfish is out of season"))
            .await
            .unwrap();

        assert_eq!(outcome.change_request.status, ChangeRequestStatus::Rejected);
        assert_eq!(
            outcome.change_request.admin_response.as_deref(),
            Some("Catfish is out of season")
        );
        assert_eq!(outcome.change_request.estimated_cost_change_cents, None);

        let current = db.quotes().get_by_id(&quote.id).await.unwrap().unwrap();
        assert_eq!(current, quote);
        let stored = db.invoices().get_by_id(&invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.total(), invoice.total());
        assert_eq!(stored.customer_access_token, invoice.customer_access_token);
        assert_eq!(db.invoices().get_line_items(&invoice.id).await.unwrap(), items_before);

        let sent = notifier.sent().await;
        assert_eq!(sent[0].action, EmailAction::Rejected);

        let err = engine.processor().approve(&request.id, "admin-1", None).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_RESOLVED");
    }

    #[tokio::test]
    async fn test_request_more_info_keeps_request_pending() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (engine, quote, invoice) = seeded_engine_with(notifier.clone()).await;
        let request = engine.processor().submit(&invoice.id, guests(130), None).await.unwrap();

        let outcome = engine
            .processor()
            .request_more_info(&request.id, "admin-1", "Is the venue indoors?")
            .await
            .unwrap();
        assert_eq!(outcome.change_request.status, ChangeRequestStatus::Pending);
        assert_eq!(
            outcome.change_request.admin_response.as_deref(),
            Some("Is the venue indoors?")
        );
        let sent = notifier.sent().await;
        assert_eq!(sent[0].action, EmailAction::RequestMoreInfo);
        // the current token is still valid, so the link is reused
        assert!(sent[0].estimate_link.as_deref().unwrap().ends_with("token-1"));

        let current = engine.database().quotes().get_by_id(&quote.id).await.unwrap().unwrap();
        assert_eq!(current.version, quote.version);

        // still approvable afterwards
        let approved = engine.processor().approve(&request.id, "admin-1", None).await.unwrap();
        assert_eq!(approved.quote.guest_count, 130);

        let err = engine
            .processor()
            .request_more_info(&request.id, "admin-1", " ")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_email_failure_does_not_fail_approval() {
        let (engine, _, invoice) = seeded_engine_with(Arc::new(FailingNotifier)).await;
        let request = engine.processor().submit(&invoice.id, guests(90), None).await.unwrap();

        let outcome = engine.processor().approve(&request.id, "admin-1", None).await.unwrap();
        assert!(!outcome.notification.success);
        assert!(outcome.cost_change() < Money::from_cents(0));

        let resolved = engine
            .database()
            .change_requests()
            .get_by_id(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, ChangeRequestStatus::Approved);
    }

    #[tokio::test]
    async fn test_empty_patch_fails_before_any_write() {
        let (engine, quote, invoice) = seeded_engine().await;
        let db = engine.database();

        let err = engine
            .processor()
            .submit(&invoice.id, RequestedChanges::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        // a stored empty patch is refused at approval time too
        let request = ChangeRequest {
            id: "cr-empty".to_string(),
            invoice_id: invoice.id.clone(),
            requested_changes: RequestedChanges::default(),
            customer_comments: None,
            status: ChangeRequestStatus::Pending,
            admin_response: None,
            estimated_cost_change_cents: None,
            resolved_by: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        db.change_requests().insert(&request).await.unwrap();

        let err = engine.processor().approve("cr-empty", "admin-1", None).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let current = db.quotes().get_by_id(&quote.id).await.unwrap().unwrap();
        assert_eq!(current.version, quote.version);
        let stored = db.change_requests().get_by_id("cr-empty").await.unwrap().unwrap();
        assert_eq!(stored.status, ChangeRequestStatus::Pending);
        assert!(engine.estimate_versions().list_versions(&invoice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_change_request_is_not_found() {
        let (engine, _, _) = seeded_engine().await;
        let err = engine.processor().approve("missing", "admin-1", None).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_government_invoice_is_tax_exempt_with_single_payment() {
        let (engine, _, invoice) = seeded_engine().await;
        engine
            .quotes()
            .set_manual_overrides(
                &invoice.id,
                &ManualOverrides {
                    is_government_contract: Some(true),
                    deposit_required: None,
                },
            )
            .await
            .unwrap();

        let request = engine.processor().submit(&invoice.id, guests(120), None).await.unwrap();
        let outcome = engine.processor().approve(&request.id, "admin-1", None).await.unwrap();

        assert_eq!(outcome.totals.tax, Money::from_cents(0));
        assert_eq!(outcome.totals.total, outcome.totals.taxable);

        let schedule = outcome.payment_schedule.unwrap();
        assert_eq!(schedule.payments.len(), 1);
        assert_eq!(schedule.scheduled_total(), outcome.totals.total);
    }

    #[tokio::test]
    async fn test_company_schedule_follows_new_total() {
        let (engine, _, invoice) = seeded_engine().await;
        let request = engine.processor().submit(&invoice.id, guests(140), None).await.unwrap();
        let outcome = engine.processor().approve(&request.id, "admin-1", None).await.unwrap();

        let schedule = outcome.payment_schedule.unwrap();
        assert_eq!(schedule.total, outcome.totals.total);
        assert_eq!(schedule.scheduled_total(), outcome.totals.total);
        assert!(schedule.payments.len() > 1);
    }

    /// Makes every `op` on `table` fail inside SQLite until dropped.
    async fn fail_writes(engine: &CateringEngine, table: &str, op: &str) {
        let sql = format!(
            "CREATE TRIGGER fail_{op}_{table} BEFORE {op} ON {table} \
             BEGIN SELECT RAISE(ABORT, '{table} unavailable'); END"
        );
        sqlx::query(&sql).execute(engine.database().pool()).await.unwrap();
    }

    async fn restore_writes(engine: &CateringEngine, table: &str, op: &str) {
        let sql = format!("DROP TRIGGER fail_{op}_{table}");
        sqlx::query(&sql).execute(engine.database().pool()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_quote_aborts_at_write_without_flipping_status() {
        let (engine, quote, invoice) = seeded_engine().await;
        let db = engine.database();
        let items_before = db.invoices().get_line_items(&invoice.id).await.unwrap();
        let request = engine.processor().submit(&invoice.id, guests(120), None).await.unwrap();

        // the customer approves the quote after the saga read it
        let context = engine.processor().load_pending(&request.id).await.unwrap();
        engine
            .workflow()
            .advance_quote(
                &quote.id,
                QuoteWorkflowStatus::Approved,
                TransitionTrigger::Customer,
                "customer",
            )
            .await
            .unwrap();

        let err = engine
            .processor()
            .approve_loaded(context, "admin-1", None, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "OPTIMISTIC_LOCK_CONFLICT");
        assert!(matches!(
            err,
            EngineError::StepFailed {
                step: SagaStep::WriteQuote,
                ..
            }
        ));

        let stored_request = db.change_requests().get_by_id(&request.id).await.unwrap().unwrap();
        assert_eq!(stored_request.status, ChangeRequestStatus::Pending);
        assert!(stored_request.resolved_at.is_none());

        let current = db.quotes().get_by_id(&quote.id).await.unwrap().unwrap();
        assert_eq!(current.guest_count, 100);
        assert_eq!(current.workflow_status, QuoteWorkflowStatus::Approved);

        let stored = db.invoices().get_by_id(&invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.workflow_status, invoice.workflow_status);
        assert_eq!(stored.customer_access_token, invoice.customer_access_token);
        assert_eq!(stored.total(), invoice.total());
        assert_eq!(db.invoices().get_line_items(&invoice.id).await.unwrap(), items_before);
    }

    #[tokio::test]
    async fn test_snapshot_failure_does_not_fail_approval() {
        let (engine, _, invoice) = seeded_engine().await;
        fail_writes(&engine, "estimate_versions", "INSERT").await;

        let request = engine.processor().submit(&invoice.id, guests(120), None).await.unwrap();
        let outcome = engine.processor().approve(&request.id, "admin-1", None).await.unwrap();

        assert_eq!(outcome.snapshot_version, None);
        assert_eq!(outcome.previous_total, invoice.total());
        assert_eq!(outcome.quote.guest_count, 120);
        assert!(engine.estimate_versions().list_versions(&invoice.id).await.unwrap().is_empty());

        let log = engine
            .history()
            .workflow_log(WorkflowEntity::ChangeRequest, &request.id)
            .await
            .unwrap();
        assert_eq!(log.last().unwrap().new_status, "approved");
        assert_eq!(log.last().unwrap().metadata["snapshot_version"], json!(null));
    }

    #[tokio::test]
    async fn test_retried_approval_measures_cost_from_first_snapshot() {
        let (engine, _, invoice) = seeded_engine().await;
        let db = engine.database();
        let request = engine.processor().submit(&invoice.id, guests(120), None).await.unwrap();

        // steps 1-8 commit, step 9 fails
        fail_writes(&engine, "change_requests", "UPDATE").await;
        let err = engine.processor().approve(&request.id, "admin-1", None).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::StepFailed {
                step: SagaStep::MarkApproved,
                ..
            }
        ));
        let reconciled = db.invoices().get_by_id(&invoice.id).await.unwrap().unwrap();
        assert!(reconciled.total() > invoice.total());

        restore_writes(&engine, "change_requests", "UPDATE").await;
        let outcome = engine.processor().approve(&request.id, "admin-1", None).await.unwrap();

        assert_eq!(outcome.snapshot_version, Some(2));
        assert_eq!(outcome.previous_total, invoice.total());
        assert_eq!(outcome.totals.total, reconciled.total());
        assert_eq!(outcome.cost_change(), reconciled.total() - invoice.total());

        let resolved = db.change_requests().get_by_id(&request.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, ChangeRequestStatus::Approved);
        assert_eq!(
            resolved.estimated_cost_change_cents,
            Some(outcome.cost_change().cents())
        );
    }

    #[tokio::test]
    async fn test_out_of_range_token_ttl_fails_before_any_write() {
        let (seeded, quote, invoice) = seeded_engine().await;
        let request = seeded.processor().submit(&invoice.id, guests(120), None).await.unwrap();

        let mut config = seeded.config().clone();
        config.portal.token_ttl_days = 1_000_000_000;
        let engine = CateringEngine::new(
            seeded.database().clone(),
            config,
            Arc::new(TracingNotifier),
        );

        let err = engine.processor().approve(&request.id, "admin-1", None).await.unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");

        let stored_request = engine
            .database()
            .change_requests()
            .get_by_id(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored_request.status, ChangeRequestStatus::Pending);
        let current = engine.database().quotes().get_by_id(&quote.id).await.unwrap().unwrap();
        assert_eq!(current.version, quote.version);
        assert!(engine.estimate_versions().list_versions(&invoice.id).await.unwrap().is_empty());
        let stored = engine.database().invoices().get_by_id(&invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.customer_access_token, invoice.customer_access_token);
    }
}
