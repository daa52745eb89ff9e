//! # Repository Module
//!
//! Database repository implementations for the catering engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  ChangeRequestProcessor (catering-engine)                               │
//! │       │                                                                 │
//! │       │  db.quotes().update_versioned(id, version, &updates)            │
//! │       ▼                                                                 │
//! │  QuoteRepository                                                        │
//! │  ├── get_by_id(&self, id)                                               │
//! │  ├── insert(&self, quote)                                               │
//! │  ├── update_versioned(&self, id, expected_version, updates)             │
//! │  └── replace_line_items(&self, quote_id, items)                         │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! │  Row structs (sqlx::FromRow) stay private to each repository; callers   │
//! │  only ever see catering-core domain types.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`QuoteRepository`](quote::QuoteRepository) - Quotes and planning items
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Invoices, line items, totals
//! - [`ChangeRequestRepository`](change_request::ChangeRequestRepository) - Customer patches
//! - [`EstimateVersionRepository`](estimate_version::EstimateVersionRepository) - Snapshots
//! - [`AuditRepository`](audit::AuditRepository) - Workflow log and quote history

pub mod audit;
pub mod change_request;
pub mod estimate_version;
pub mod invoice;
pub mod quote;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{Database, DbConfig};
    use catering_core::menu::{generate_line_items, PriceBook};
    use catering_core::patch::{CategoryChange, MenuChanges, RequestedChanges};
    use catering_core::tax::TaxCalculationService;
    use catering_core::test_fixtures::{fixed_now, sample_invoice, sample_quote};
    use catering_core::{ChangeRequest, ChangeRequestStatus, Invoice, QuoteRequest};

    /// In-memory database holding the sample quote and its generated invoice.
    pub async fn seeded() -> (Database, QuoteRequest, Invoice) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let quote = sample_quote();
        db.quotes().insert(&quote).await.unwrap();

        let invoice = sample_invoice();
        let items = generate_line_items(&quote, &PriceBook::default());
        db.invoices()
            .create_with_items(&invoice, &items, &TaxCalculationService::default())
            .await
            .unwrap();

        let invoice = db.invoices().get_by_id(&invoice.id).await.unwrap().unwrap();
        (db, quote, invoice)
    }

    /// A pending request swapping Fried Chicken for Catfish.
    pub fn pending_change_request(invoice_id: &str, id: &str) -> ChangeRequest {
        ChangeRequest {
            id: id.to_string(),
            invoice_id: invoice_id.to_string(),
            requested_changes: RequestedChanges {
                menu_changes: Some(MenuChanges {
                    proteins: Some(CategoryChange {
                        add: vec!["Catfish".to_string()],
                        remove: vec!["Fried Chicken".to_string()],
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            customer_comments: Some("Swap the chicken please".to_string()),
            status: ChangeRequestStatus::Pending,
            admin_response: None,
            estimated_cost_change_cents: None,
            resolved_by: None,
            created_at: fixed_now(),
            resolved_at: None,
        }
    }
}
