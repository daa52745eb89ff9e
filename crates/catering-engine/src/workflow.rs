//! # Workflow Service
//!
//! Validated, logged status changes for quotes and invoices, plus the
//! two-phase progress view the admin UI renders.
//!
//! ```text
//!   advance_quote(id, to, trigger)            advance_invoice(id, to, trigger)
//!        │                                          │
//!        ├── validate_transition(from, to)          ├── validate_transition(from, to)
//!        ├── update_status (optimistic lock)        ├── set_status
//!        └── workflow_state_log                     └── workflow_state_log
//! ```

use serde_json::json;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::history::HistoryLogger;
use catering_core::workflow::{
    validate_transition, workflow_progress, Transition, TransitionTrigger, WorkflowEntity,
    WorkflowProgress, WorkflowState,
};
use catering_core::{Invoice, InvoiceStatus, QuoteRequest, QuoteStatus, QuoteWorkflowStatus};
use catering_db::Database;

/// Coarse status shown in quote lists for a fine-grained workflow status.
pub fn coarse_status(status: QuoteWorkflowStatus) -> QuoteStatus {
    match status {
        QuoteWorkflowStatus::Pending => QuoteStatus::Pending,
        QuoteWorkflowStatus::UnderReview => QuoteStatus::Reviewing,
        QuoteWorkflowStatus::Estimated | QuoteWorkflowStatus::Sent => QuoteStatus::Quoted,
        QuoteWorkflowStatus::Approved
        | QuoteWorkflowStatus::Confirmed
        | QuoteWorkflowStatus::InProgress => QuoteStatus::Approved,
        QuoteWorkflowStatus::Completed => QuoteStatus::Completed,
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowService {
    db: Database,
    history: HistoryLogger,
}

impl WorkflowService {
    pub fn new(db: Database, history: HistoryLogger) -> Self {
        WorkflowService { db, history }
    }

    /// Moves a quote to `to` if the transition table allows it.
    pub async fn advance_quote(
        &self,
        quote_id: &str,
        to: QuoteWorkflowStatus,
        trigger: TransitionTrigger,
        changed_by: &str,
    ) -> EngineResult<QuoteRequest> {
        let quote = self.load_quote(quote_id).await?;
        let transition = validate_transition(quote.workflow_status, to, trigger)?;

        self.db
            .quotes()
            .update_status(quote_id, quote.version, coarse_status(to), to)
            .await?;
        self.log(&transition, WorkflowEntity::Quote, quote_id, changed_by)
            .await?;

        self.load_quote(quote_id).await
    }

    /// Moves an invoice to `to` if the transition table allows it.
    pub async fn advance_invoice(
        &self,
        invoice_id: &str,
        to: InvoiceStatus,
        trigger: TransitionTrigger,
        changed_by: &str,
    ) -> EngineResult<Transition<InvoiceStatus>> {
        let invoice = self.load_invoice(invoice_id).await?;
        let transition = validate_transition(invoice.workflow_status, to, trigger)?;

        self.db.invoices().set_status(invoice_id, to).await?;
        self.log(&transition, WorkflowEntity::Invoice, invoice_id, changed_by)
            .await?;

        Ok(transition)
    }

    /// Progress of the quote and, once generated, its invoice.
    pub async fn progress(&self, quote_id: &str) -> EngineResult<WorkflowProgress> {
        let quote = self.load_quote(quote_id).await?;
        let invoice = self.db.invoices().get_by_quote(quote_id).await?;
        Ok(workflow_progress(
            quote.workflow_status,
            invoice.map(|i| i.workflow_status),
        ))
    }

    async fn log<S: WorkflowState>(
        &self,
        transition: &Transition<S>,
        entity: WorkflowEntity,
        entity_id: &str,
        changed_by: &str,
    ) -> EngineResult<()> {
        info!(
            entity = %entity,
            id = %entity_id,
            from = %transition.from,
            to = %transition.to,
            trigger = %transition.trigger,
            forced = transition.forced,
            "Status changed"
        );
        self.history
            .log_transition(
                entity,
                entity_id,
                Some(&transition.from.to_string()),
                &transition.to.to_string(),
                changed_by,
                Some(transition.trigger.as_str()),
                json!({ "forced": transition.forced }),
            )
            .await
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_engine;
    use catering_core::workflow::StepState;

    #[test]
    fn test_coarse_status_mapping() {
        assert_eq!(coarse_status(QuoteWorkflowStatus::Sent), QuoteStatus::Quoted);
        assert_eq!(coarse_status(QuoteWorkflowStatus::Confirmed), QuoteStatus::Approved);
        assert_eq!(coarse_status(QuoteWorkflowStatus::Completed), QuoteStatus::Completed);
    }

    #[tokio::test]
    async fn test_advance_quote_bumps_version_and_logs() {
        let (engine, quote, _) = seeded_engine().await;
        let workflow = engine.workflow();

        let approved = workflow
            .advance_quote(&quote.id, QuoteWorkflowStatus::Approved, TransitionTrigger::Customer, "customer")
            .await
            .unwrap();
        assert_eq!(approved.workflow_status, QuoteWorkflowStatus::Approved);
        assert_eq!(approved.status, QuoteStatus::Approved);
        assert_eq!(approved.version, quote.version + 1);

        let log = engine
            .history()
            .workflow_log(WorkflowEntity::Quote, &quote.id)
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].previous_status.as_deref(), Some("sent"));
        assert_eq!(log[0].reason.as_deref(), Some("customer"));
    }

    #[tokio::test]
    async fn test_invalid_invoice_move_is_rejected() {
        let (engine, _, invoice) = seeded_engine().await;
        let workflow = engine.workflow();

        let err = workflow
            .advance_invoice(&invoice.id, InvoiceStatus::Draft, TransitionTrigger::Admin, "admin")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");

        let transition = workflow
            .advance_invoice(&invoice.id, InvoiceStatus::Paid, TransitionTrigger::Payment, "stripe")
            .await
            .unwrap();
        assert!(!transition.forced);

        let progress = workflow.progress(&invoice.quote_request_id).await.unwrap();
        let invoice_phase = progress.invoice.unwrap();
        assert_eq!(invoice_phase.status, "paid");
        assert_eq!(invoice_phase.steps[0].state, StepState::Completed);
    }
}
