//! # Payment Schedule Materialization
//!
//! Binds the pure milestone rules from `catering_core::schedule` to a real
//! invoice: who the customer is, what the invoice totals, when the event is
//! and when it was approved.
//!
//! ```text
//!   Invoice + QuoteRequest + approval date
//!        │
//!        ├── classify_customer(email, gov override) → Person | Company | Gov
//!        ├── PaymentScheduleBuilder::build          → milestone rules
//!        ├── calculate_payment_amounts(total)       → amounts (sum == total)
//!        └── DueDatePolicy::resolve                 → calendar due dates
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use catering_core::schedule::{
    calculate_payment_amounts, classify_customer, CustomerClass, MilestoneType,
    PaymentScheduleBuilder, ScheduleInput,
};
use catering_core::{Invoice, Money, QuoteRequest};
use catering_db::Database;

/// One payment with a concrete due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub sequence: u32,
    pub milestone_type: MilestoneType,
    pub percentage: u32,
    pub amount: Money,
    pub due_date: NaiveDate,
}

/// The full schedule of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSchedule {
    pub invoice_id: String,
    pub customer: CustomerClass,
    pub total: Money,
    pub payments: Vec<ScheduledPayment>,
}

impl PaymentSchedule {
    pub fn scheduled_total(&self) -> Money {
        self.payments.iter().map(|p| p.amount).sum()
    }
}

/// Builds the schedule of `invoice` without touching storage.
pub fn build_schedule(
    builder: &PaymentScheduleBuilder,
    invoice: &Invoice,
    quote: &QuoteRequest,
    approval_date: NaiveDate,
) -> EngineResult<PaymentSchedule> {
    let customer = classify_customer(
        quote.email.as_deref(),
        invoice.manual_overrides.is_government_contract,
    );
    let input = ScheduleInput {
        event_date: quote.event_date,
        approval_date,
        customer,
        deposit_required: invoice.manual_overrides.deposit_required(),
    };

    let rules = builder.build(&input);
    let payments = calculate_payment_amounts(invoice.total(), &rules)?
        .into_iter()
        .map(|m| ScheduledPayment {
            sequence: m.sequence,
            milestone_type: m.milestone_type,
            percentage: m.percentage,
            amount: m.amount,
            due_date: m.due.resolve(approval_date, quote.event_date),
        })
        .collect::<Vec<_>>();

    debug!(
        invoice_id = %invoice.id,
        customer = %customer,
        lead_days = input.lead_days(),
        payments = payments.len(),
        "Payment schedule built"
    );

    Ok(PaymentSchedule {
        invoice_id: invoice.id.clone(),
        customer,
        total: invoice.total(),
        payments,
    })
}

#[derive(Debug, Clone)]
pub struct PaymentScheduleService {
    db: Database,
    builder: PaymentScheduleBuilder,
}

impl PaymentScheduleService {
    pub fn new(db: Database, builder: PaymentScheduleBuilder) -> Self {
        PaymentScheduleService { db, builder }
    }

    pub fn builder(&self) -> &PaymentScheduleBuilder {
        &self.builder
    }

    /// Loads an invoice and its quote and builds the schedule.
    pub async fn for_invoice(
        &self,
        invoice_id: &str,
        approval_date: NaiveDate,
    ) -> EngineResult<PaymentSchedule> {
        let invoice = self
            .db
            .invoices()
            .get_by_id(invoice_id)
            .await?
            .ok_or_else(|| EngineError::not_found("invoice", invoice_id))?;
        let quote = self
            .db
            .quotes()
            .get_by_id(&invoice.quote_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("quote_request", &invoice.quote_request_id))?;

        build_schedule(&self.builder, &invoice, &quote, approval_date)
    }
}
