//! # Workflow State Model
//!
//! Status vocabulary for quotes and invoices, the transition table every
//! status write is validated against, and per-phase progress for admin views.
//!
//! ## Canonical Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  QUOTE PHASE                                                            │
//! │  pending → under_review → estimated → sent → approved → confirmed       │
//! │          → in_progress → completed                                      │
//! │                                                                         │
//! │  INVOICE PHASE                                                          │
//! │  draft → sent → viewed → paid → in_progress → completed                 │
//! │                           ▲                                             │
//! │                           └── payment_pending / partially_paid          │
//! │                               (sub-states, same step as `paid`)         │
//! │                                                                         │
//! │  FORCED RULES (trigger = ChangeRequestApproved)                         │
//! │  invoice: <any> → sent        customer must re-review the estimate      │
//! │  quote:   <any> → estimated   estimate regenerated from new facts       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Forward moves come from an explicit `allowed_next` table, never from index
//! comparison. The two resets are separate rules keyed on the trigger, so a
//! regular admin action can never move an invoice backwards.
//!
//! The phases are tracked independently: a quote may be `approved` while its
//! invoice is still `sent`, or the invoice may never have passed through
//! `draft`. [`workflow_progress`] therefore returns one progress value per
//! phase instead of a single bar.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Entities and Triggers
// =============================================================================

/// Entity kinds that appear in the workflow state log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEntity {
    Quote,
    Invoice,
    ChangeRequest,
}

impl WorkflowEntity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            WorkflowEntity::Quote => "quote",
            WorkflowEntity::Invoice => "invoice",
            WorkflowEntity::ChangeRequest => "change_request",
        }
    }
}

impl fmt::Display for WorkflowEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    /// An admin action from the dashboard.
    Admin,
    /// A customer action through the portal (view, approve).
    Customer,
    /// A payment milestone settled.
    Payment,
    /// An approved change request regenerated the estimate.
    ChangeRequestApproved,
}

impl TransitionTrigger {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransitionTrigger::Admin => "admin",
            TransitionTrigger::Customer => "customer",
            TransitionTrigger::Payment => "payment",
            TransitionTrigger::ChangeRequestApproved => "change_request_approved",
        }
    }
}

impl fmt::Display for TransitionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// WorkflowState Trait
// =============================================================================

/// A closed status enum with an explicit transition table.
pub trait WorkflowState: Copy + Eq + fmt::Debug + fmt::Display + 'static {
    /// Entity this state belongs to.
    const ENTITY: WorkflowEntity;

    /// Canonical step order used for progress display.
    fn steps() -> &'static [Self];

    /// Step this status is displayed as (sub-states map to their parent).
    fn step(&self) -> Self;

    /// Ordinary forward moves allowed from this status.
    fn allowed_next(&self) -> &'static [Self];

    /// Status a forcing trigger resets to, if the trigger forces one.
    fn forced_target(trigger: TransitionTrigger) -> Option<Self>;

    /// Index of this status's step in [`WorkflowState::steps`].
    fn step_index(&self) -> usize {
        let step = self.step();
        Self::steps()
            .iter()
            .position(|s| *s == step)
            .unwrap_or_default()
    }
}

/// A validated status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S: WorkflowState> {
    pub from: S,
    pub to: S,
    pub trigger: TransitionTrigger,
    /// True when the move came from a forcing rule rather than the table.
    pub forced: bool,
}

/// Validates a status change against the transition table.
///
/// ## Rules
/// 1. If `trigger` forces a target for this entity, `to` must be that target;
///    any `from` is accepted (including `to == from`).
/// 2. Otherwise `to` must appear in `from.allowed_next()`.
///
/// ```rust
/// use catering_core::workflow::{validate_transition, InvoiceStatus, TransitionTrigger};
///
/// // A paid invoice is forced back to `sent` by a change-request approval...
/// assert!(validate_transition(
///     InvoiceStatus::Paid,
///     InvoiceStatus::Sent,
///     TransitionTrigger::ChangeRequestApproved,
/// ).is_ok());
///
/// // ...but an admin cannot move it backwards.
/// assert!(validate_transition(
///     InvoiceStatus::Paid,
///     InvoiceStatus::Sent,
///     TransitionTrigger::Admin,
/// ).is_err());
/// ```
pub fn validate_transition<S: WorkflowState>(
    from: S,
    to: S,
    trigger: TransitionTrigger,
) -> CoreResult<Transition<S>> {
    if let Some(target) = S::forced_target(trigger) {
        if to == target {
            return Ok(Transition {
                from,
                to,
                trigger,
                forced: true,
            });
        }
    } else if from.allowed_next().contains(&to) {
        return Ok(Transition {
            from,
            to,
            trigger,
            forced: false,
        });
    }

    Err(CoreError::InvalidTransition {
        entity: S::ENTITY.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        trigger: trigger.to_string(),
    })
}

// =============================================================================
// Quote Workflow Status
// =============================================================================

/// Fine-grained quote status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QuoteWorkflowStatus {
    Pending,
    UnderReview,
    Estimated,
    Sent,
    Approved,
    Confirmed,
    InProgress,
    Completed,
}

impl QuoteWorkflowStatus {
    pub const ORDER: [QuoteWorkflowStatus; 8] = [
        QuoteWorkflowStatus::Pending,
        QuoteWorkflowStatus::UnderReview,
        QuoteWorkflowStatus::Estimated,
        QuoteWorkflowStatus::Sent,
        QuoteWorkflowStatus::Approved,
        QuoteWorkflowStatus::Confirmed,
        QuoteWorkflowStatus::InProgress,
        QuoteWorkflowStatus::Completed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            QuoteWorkflowStatus::Pending => "pending",
            QuoteWorkflowStatus::UnderReview => "under_review",
            QuoteWorkflowStatus::Estimated => "estimated",
            QuoteWorkflowStatus::Sent => "sent",
            QuoteWorkflowStatus::Approved => "approved",
            QuoteWorkflowStatus::Confirmed => "confirmed",
            QuoteWorkflowStatus::InProgress => "in_progress",
            QuoteWorkflowStatus::Completed => "completed",
        }
    }
}

impl WorkflowState for QuoteWorkflowStatus {
    const ENTITY: WorkflowEntity = WorkflowEntity::Quote;

    fn steps() -> &'static [Self] {
        &Self::ORDER
    }

    fn step(&self) -> Self {
        *self
    }

    fn allowed_next(&self) -> &'static [Self] {
        use QuoteWorkflowStatus::*;
        match self {
            Pending => &[UnderReview, Estimated],
            UnderReview => &[Estimated],
            // Customer may approve straight from the emailed estimate
            Estimated => &[Sent, Approved],
            Sent => &[Approved],
            Approved => &[Confirmed],
            Confirmed => &[InProgress],
            InProgress => &[Completed],
            Completed => &[],
        }
    }

    fn forced_target(trigger: TransitionTrigger) -> Option<Self> {
        match trigger {
            TransitionTrigger::ChangeRequestApproved => Some(QuoteWorkflowStatus::Estimated),
            _ => None,
        }
    }
}

impl fmt::Display for QuoteWorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteWorkflowStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ORDER
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "workflow_status".to_string(),
                reason: format!("unknown quote status '{}'", s),
            })
    }
}

// =============================================================================
// Invoice Status
// =============================================================================

/// Invoice status, used for both `status` and `workflow_status` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    /// Checkout started for a milestone, not yet settled.
    PaymentPending,
    /// At least one milestone paid, not all.
    PartiallyPaid,
    Paid,
    InProgress,
    Completed,
}

impl InvoiceStatus {
    /// Display steps. `PaymentPending` and `PartiallyPaid` render as `Paid`.
    pub const ORDER: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Viewed,
        InvoiceStatus::Paid,
        InvoiceStatus::InProgress,
        InvoiceStatus::Completed,
    ];

    const ALL: [InvoiceStatus; 8] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Viewed,
        InvoiceStatus::PaymentPending,
        InvoiceStatus::PartiallyPaid,
        InvoiceStatus::Paid,
        InvoiceStatus::InProgress,
        InvoiceStatus::Completed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::PaymentPending => "payment_pending",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::InProgress => "in_progress",
            InvoiceStatus::Completed => "completed",
        }
    }

    /// True for `paid` and its sub-states.
    pub const fn is_payment_state(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::PaymentPending | InvoiceStatus::PartiallyPaid | InvoiceStatus::Paid
        )
    }

    /// Status an invoice should carry given how many milestones are settled.
    ///
    /// ```rust
    /// use catering_core::workflow::InvoiceStatus;
    ///
    /// assert_eq!(InvoiceStatus::from_milestones(0, 2), InvoiceStatus::PaymentPending);
    /// assert_eq!(InvoiceStatus::from_milestones(1, 2), InvoiceStatus::PartiallyPaid);
    /// assert_eq!(InvoiceStatus::from_milestones(2, 2), InvoiceStatus::Paid);
    /// ```
    pub fn from_milestones(paid: usize, total: usize) -> InvoiceStatus {
        if total > 0 && paid >= total {
            InvoiceStatus::Paid
        } else if paid > 0 {
            InvoiceStatus::PartiallyPaid
        } else {
            InvoiceStatus::PaymentPending
        }
    }
}

impl WorkflowState for InvoiceStatus {
    const ENTITY: WorkflowEntity = WorkflowEntity::Invoice;

    fn steps() -> &'static [Self] {
        &Self::ORDER
    }

    fn step(&self) -> Self {
        if self.is_payment_state() {
            InvoiceStatus::Paid
        } else {
            *self
        }
    }

    fn allowed_next(&self) -> &'static [Self] {
        use InvoiceStatus::*;
        match self {
            Draft => &[Sent],
            Sent => &[Viewed, PaymentPending, PartiallyPaid, Paid],
            Viewed => &[PaymentPending, PartiallyPaid, Paid],
            PaymentPending => &[PartiallyPaid, Paid],
            PartiallyPaid => &[PaymentPending, Paid],
            Paid => &[InProgress, Completed],
            InProgress => &[Completed],
            Completed => &[],
        }
    }

    fn forced_target(trigger: TransitionTrigger) -> Option<Self> {
        match trigger {
            TransitionTrigger::ChangeRequestApproved => Some(InvoiceStatus::Sent),
            _ => None,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown invoice status '{}'", s),
            })
    }
}

// =============================================================================
// Progress
// =============================================================================

/// Display state of one step in a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Completed,
    Current,
    Upcoming,
}

/// One step of a phase progress bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PhaseStep {
    pub status: String,
    pub state: StepState,
}

/// Progress through one phase (quote or invoice).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PhaseProgress {
    pub entity: WorkflowEntity,
    /// The stored status, which may be a sub-state of the current step.
    pub status: String,
    pub current_index: usize,
    pub steps: Vec<PhaseStep>,
}

impl PhaseProgress {
    /// Builds progress for a status: lower steps are completed, higher upcoming.
    pub fn of<S: WorkflowState>(status: S) -> PhaseProgress {
        let current_index = status.step_index();
        let steps = S::steps()
            .iter()
            .enumerate()
            .map(|(idx, step)| PhaseStep {
                status: step.to_string(),
                state: match idx.cmp(&current_index) {
                    std::cmp::Ordering::Less => StepState::Completed,
                    std::cmp::Ordering::Equal => StepState::Current,
                    std::cmp::Ordering::Greater => StepState::Upcoming,
                },
            })
            .collect();

        PhaseProgress {
            entity: S::ENTITY,
            status: status.to_string(),
            current_index,
            steps,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.state == StepState::Completed)
            .count()
    }
}

/// Progress of both phases, computed independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WorkflowProgress {
    pub quote: PhaseProgress,
    /// `None` until an invoice has been generated.
    pub invoice: Option<PhaseProgress>,
}

/// Computes per-phase progress.
///
/// No attempt is made to reconcile the two phases: an `approved` quote next
/// to a `sent` invoice is a legal combination.
pub fn workflow_progress(
    quote: QuoteWorkflowStatus,
    invoice: Option<InvoiceStatus>,
) -> WorkflowProgress {
    WorkflowProgress {
        quote: PhaseProgress::of(quote),
        invoice: invoice.map(PhaseProgress::of),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
