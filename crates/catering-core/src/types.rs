//! # Domain Types
//!
//! Entities shared by every layer of the engine.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  QuoteRequest ──1:1──► Invoice ──1:N──► InvoiceLineItem                 │
//! │  (event + menu facts)  (money)          (regenerated, overrides kept)   │
//! │       │                   │                                             │
//! │       │                   ├──1:N──► ChangeRequest  (customer patches)   │
//! │       │                   └──1:N──► EstimateVersion (immutable copies)  │
//! │       │                                                                 │
//! │       └──1:N──► QuoteLineItem    (planning items, replaced wholesale)   │
//! │       └──1:N──► QuoteHistoryEntry (field-level deltas)                  │
//! │                                                                         │
//! │  WorkflowStateLogEntry: append-only status log for all three entities   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All identifiers are UUID v4 strings. Money columns carry a `_cents`
//! suffix and are exposed as [`Money`] through accessor methods.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::menu::LineItemKey;
use crate::money::Money;
use crate::patch::RequestedChanges;
use crate::tax::Discount;
use crate::workflow::{InvoiceStatus, QuoteWorkflowStatus, WorkflowEntity};

// =============================================================================
// Menu
// =============================================================================

/// Menu category a selection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MenuCategory {
    Protein,
    Side,
    Dessert,
    Drink,
    AddOn,
}

impl MenuCategory {
    pub const ALL: [MenuCategory; 5] = [
        MenuCategory::Protein,
        MenuCategory::Side,
        MenuCategory::Dessert,
        MenuCategory::Drink,
        MenuCategory::AddOn,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            MenuCategory::Protein => "protein",
            MenuCategory::Side => "side",
            MenuCategory::Dessert => "dessert",
            MenuCategory::Drink => "drink",
            MenuCategory::AddOn => "add_on",
        }
    }

    /// Field name of this category on [`MenuSelections`].
    pub const fn field_name(&self) -> &'static str {
        match self {
            MenuCategory::Protein => "proteins",
            MenuCategory::Side => "sides",
            MenuCategory::Dessert => "desserts",
            MenuCategory::Drink => "drinks",
            MenuCategory::AddOn => "add_ons",
        }
    }
}

impl fmt::Display for MenuCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The customer's menu selections, one list per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MenuSelections {
    #[serde(default)]
    pub proteins: Vec<String>,
    #[serde(default)]
    pub sides: Vec<String>,
    #[serde(default)]
    pub desserts: Vec<String>,
    #[serde(default)]
    pub drinks: Vec<String>,
    #[serde(default)]
    pub add_ons: Vec<String>,
}

impl MenuSelections {
    pub fn category(&self, category: MenuCategory) -> &[String] {
        match category {
            MenuCategory::Protein => &self.proteins,
            MenuCategory::Side => &self.sides,
            MenuCategory::Dessert => &self.desserts,
            MenuCategory::Drink => &self.drinks,
            MenuCategory::AddOn => &self.add_ons,
        }
    }

    pub fn category_mut(&mut self, category: MenuCategory) -> &mut Vec<String> {
        match category {
            MenuCategory::Protein => &mut self.proteins,
            MenuCategory::Side => &mut self.sides,
            MenuCategory::Dessert => &mut self.desserts,
            MenuCategory::Drink => &mut self.drinks,
            MenuCategory::AddOn => &mut self.add_ons,
        }
    }
}

// =============================================================================
// Quote
// =============================================================================

/// How the event is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Food delivered in disposable trays.
    DropOff,
    /// Buffet line set up and maintained by staff.
    Buffet,
    /// Plated or family-style service with dedicated staff.
    FullService,
}

impl ServiceType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceType::DropOff => "drop_off",
            ServiceType::Buffet => "buffet",
            ServiceType::FullService => "full_service",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse quote status shown in list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Reviewing,
    Quoted,
    Approved,
    Completed,
}

impl Default for QuoteStatus {
    fn default() -> Self {
        QuoteStatus::Pending
    }
}

/// A customer's catering request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuoteRequest {
    pub id: String,
    pub contact_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub guest_count: i64,
    pub location: String,
    pub service_type: ServiceType,
    pub menu: MenuSelections,
    pub status: QuoteStatus,
    pub workflow_status: QuoteWorkflowStatus,
    /// Optimistic lock; incremented on every successful update.
    pub version: i64,
    pub estimated_total_cents: Option<i64>,
    #[ts(as = "String")]
    pub last_status_change: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl QuoteRequest {
    /// A freshly submitted quote at version 1, awaiting review.
    pub fn from_submission(id: String, input: &NewQuoteRequest, now: DateTime<Utc>) -> Self {
        QuoteRequest {
            id,
            contact_name: input.contact_name.trim().to_string(),
            email: input.email.as_ref().map(|e| e.trim().to_string()),
            phone: input.phone.clone(),
            company_name: input.company_name.clone(),
            event_name: input.event_name.trim().to_string(),
            event_date: input.event_date,
            guest_count: input.guest_count,
            location: input.location.trim().to_string(),
            service_type: input.service_type,
            menu: input.menu.clone(),
            status: QuoteStatus::Pending,
            workflow_status: QuoteWorkflowStatus::Pending,
            version: 1,
            estimated_total_cents: None,
            last_status_change: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn estimated_total(&self) -> Option<Money> {
        self.estimated_total_cents.map(Money::from_cents)
    }
}

/// Customer submission that creates a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewQuoteRequest {
    pub contact_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub event_name: String,
    #[ts(as = "String")]
    pub event_date: NaiveDate,
    pub guest_count: i64,
    pub location: String,
    pub service_type: ServiceType,
    #[serde(default)]
    pub menu: MenuSelections,
}

/// A planning line item attached directly to the quote.
///
/// Unlike invoice items these carry no manual edits and are replaced in full
/// every time the quote changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuoteLineItem {
    pub id: String,
    pub quote_request_id: String,
    pub source_key: LineItemKey,
    pub title: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    pub sort_order: i64,
}

// =============================================================================
// Invoice
// =============================================================================

/// Admin-set flags stored in the `manual_overrides` JSON column.
///
/// `None` means "not set": heuristics decide. `Some` always wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManualOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_government_contract: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_required: Option<bool>,
}

impl ManualOverrides {
    pub fn is_government(&self) -> bool {
        self.is_government_contract.unwrap_or(false)
    }

    /// Deposits are required unless explicitly waived.
    pub fn deposit_required(&self) -> bool {
        self.deposit_required.unwrap_or(true)
    }
}

/// The billable artifact generated from a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub quote_request_id: String,
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub workflow_status: InvoiceStatus,
    pub subtotal_cents: i64,
    pub discount: Option<Discount>,
    pub discount_cents: i64,
    pub tax_amount_cents: i64,
    pub total_amount_cents: i64,
    pub manual_overrides: ManualOverrides,
    pub customer_access_token: Option<String>,
    #[ts(as = "Option<String>")]
    pub token_expires_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    pub fn total(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }

    /// True when `token` matches and has not expired at `now`.
    pub fn token_is_valid(&self, token: &str, now: DateTime<Utc>) -> bool {
        match (&self.customer_access_token, self.token_expires_at) {
            (Some(current), Some(expires)) => current == token && expires > now,
            _ => false,
        }
    }
}

/// One billable row on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceLineItem {
    pub id: String,
    pub invoice_id: String,
    /// Semantic key from generation; `None` for custom or legacy items.
    pub source_key: Option<LineItemKey>,
    pub title: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Always `quantity * unit_price_cents`.
    pub total_price_cents: i64,
    /// Manually priced; price survives regeneration.
    pub is_override: bool,
    pub sort_order: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InvoiceLineItem {
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }
}

// =============================================================================
// Change Request
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl ChangeRequestStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeRequestStatus::Pending => "pending",
            ChangeRequestStatus::Approved => "approved",
            ChangeRequestStatus::Rejected => "rejected",
        }
    }

    pub const fn is_resolved(&self) -> bool {
        !matches!(self, ChangeRequestStatus::Pending)
    }
}

impl fmt::Display for ChangeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer-submitted patch against a sent estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChangeRequest {
    pub id: String,
    pub invoice_id: String,
    pub requested_changes: RequestedChanges,
    pub customer_comments: Option<String>,
    pub status: ChangeRequestStatus,
    pub admin_response: Option<String>,
    pub estimated_cost_change_cents: Option<i64>,
    pub resolved_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub resolved_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Audit
// =============================================================================

/// Frozen copy of an invoice and its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateSnapshot {
    pub invoice: Invoice,
    pub line_items: Vec<InvoiceLineItem>,
}

/// Immutable estimate version taken before a destructive update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateVersion {
    pub id: String,
    pub invoice_id: String,
    pub change_request_id: Option<String>,
    /// Strictly increasing per invoice, starting at 1.
    pub version_number: i64,
    pub snapshot: EstimateSnapshot,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only status change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStateLogEntry {
    pub id: String,
    pub entity_type: WorkflowEntity,
    pub entity_id: String,
    pub previous_status: Option<String>,
    pub new_status: String,
    pub changed_by: String,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Kind of field-level change in quote history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum HistoryChangeKind {
    /// Scalar field changed (event date, guest count, location...).
    Updated,
    /// Menu selection or line item added.
    Added,
    /// Menu selection or line item removed.
    Removed,
    /// Line item quantity or price changed.
    Modified,
}

/// One field-level delta on a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteHistoryEntry {
    pub id: String,
    pub quote_request_id: String,
    pub change_request_id: Option<String>,
    pub field: String,
    pub change_kind: HistoryChangeKind,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice_with_token(token: Option<&str>, expires: Option<DateTime<Utc>>) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: "inv-1".to_string(),
            quote_request_id: "q-1".to_string(),
            invoice_number: "EST-0001".to_string(),
            status: InvoiceStatus::Sent,
            workflow_status: InvoiceStatus::Sent,
            subtotal_cents: 0,
            discount: None,
            discount_cents: 0,
            tax_amount_cents: 0,
            total_amount_cents: 0,
            manual_overrides: ManualOverrides::default(),
            customer_access_token: token.map(str::to_string),
            token_expires_at: expires,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_token_validity() {
        let now = Utc::now();
        let invoice = invoice_with_token(Some("abc"), Some(now + chrono::Duration::days(1)));
        assert!(invoice.token_is_valid("abc", now));
        assert!(!invoice.token_is_valid("abd", now));
        assert!(!invoice.token_is_valid("abc", now + chrono::Duration::days(2)));
        assert!(!invoice_with_token(None, None).token_is_valid("abc", now));
    }

    #[test]
    fn test_manual_overrides_defaults() {
        let overrides: ManualOverrides = serde_json::from_str("{}").unwrap();
        assert!(!overrides.is_government());
        assert!(overrides.deposit_required());

        let overrides: ManualOverrides =
            serde_json::from_str(r#"{"is_government_contract":true,"deposit_required":false}"#)
                .unwrap();
        assert!(overrides.is_government());
        assert!(!overrides.deposit_required());
    }

    #[test]
    fn test_menu_category_accessors() {
        let mut menu = MenuSelections::default();
        menu.category_mut(MenuCategory::Protein)
            .push("Fried Chicken".to_string());
        assert_eq!(menu.category(MenuCategory::Protein), ["Fried Chicken"]);
        assert!(menu.category(MenuCategory::Side).is_empty());
    }
}
