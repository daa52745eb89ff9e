//! Shared fixtures for unit tests here and, through the `test-fixtures`
//! feature, in the tests of the downstream crates.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::menu::{CanonicalLineItem, LineItemKey};
use crate::types::{
    Invoice, InvoiceLineItem, ManualOverrides, MenuSelections, NewQuoteRequest, QuoteRequest,
    QuoteStatus, ServiceType,
};
use crate::workflow::{InvoiceStatus, QuoteWorkflowStatus};

/// Fixed instant used by fixtures.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn selections(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Buffet for 100 guests with two proteins, one side, dessert and drink.
pub fn sample_menu() -> MenuSelections {
    MenuSelections {
        proteins: selections(&["Fried Chicken", "Pulled Pork"]),
        sides: selections(&["Mac and Cheese"]),
        desserts: selections(&["Peach Cobbler"]),
        drinks: selections(&["Sweet Tea"]),
        add_ons: Vec::new(),
    }
}

pub fn new_quote() -> NewQuoteRequest {
    NewQuoteRequest {
        contact_name: "Jordan Reyes".to_string(),
        email: Some("jordan@acme-events.com".to_string()),
        phone: Some("555-0100".to_string()),
        company_name: Some("Acme Events".to_string()),
        event_name: "Spring Gala".to_string(),
        event_date: NaiveDate::from_ymd_opt(2030, 6, 15).unwrap_or_default(),
        guest_count: 100,
        location: "Town Hall".to_string(),
        service_type: ServiceType::Buffet,
        menu: sample_menu(),
    }
}

pub fn sample_quote() -> QuoteRequest {
    let input = new_quote();
    let now = fixed_now();
    QuoteRequest {
        id: "quote-1".to_string(),
        contact_name: input.contact_name,
        email: input.email,
        phone: input.phone,
        company_name: input.company_name,
        event_name: input.event_name,
        event_date: input.event_date,
        guest_count: input.guest_count,
        location: input.location,
        service_type: input.service_type,
        menu: input.menu,
        status: QuoteStatus::Quoted,
        workflow_status: QuoteWorkflowStatus::Sent,
        version: 1,
        estimated_total_cents: None,
        last_status_change: now,
        created_at: now,
        updated_at: now,
    }
}

/// A sent invoice for [`sample_quote`] with no items and zero totals.
pub fn sample_invoice() -> Invoice {
    let now = fixed_now();
    Invoice {
        id: "invoice-1".to_string(),
        quote_request_id: "quote-1".to_string(),
        invoice_number: "INV-2030-00001".to_string(),
        status: InvoiceStatus::Sent,
        workflow_status: InvoiceStatus::Sent,
        subtotal_cents: 0,
        discount: None,
        discount_cents: 0,
        tax_amount_cents: 0,
        total_amount_cents: 0,
        manual_overrides: ManualOverrides::default(),
        customer_access_token: Some("token-1".to_string()),
        token_expires_at: Some(now + chrono::Duration::days(90)),
        created_at: now,
        updated_at: now,
    }
}

/// A persisted invoice item with an optional source key.
pub fn invoice_item(title: &str, key: Option<&str>, quantity: i64, unit_cents: i64) -> InvoiceLineItem {
    let now = fixed_now();
    InvoiceLineItem {
        id: format!("item-{}", title.to_lowercase().replace(' ', "-")),
        invoice_id: "invoice-1".to_string(),
        source_key: key.map(LineItemKey::from_raw),
        title: title.to_string(),
        description: None,
        quantity,
        unit_price_cents: unit_cents,
        total_price_cents: quantity * unit_cents,
        is_override: false,
        sort_order: 0,
        created_at: now,
        updated_at: now,
    }
}

/// Persisted items exactly as a previous generation would have written them.
pub fn persisted_from(canonical: &[CanonicalLineItem]) -> Vec<InvoiceLineItem> {
    canonical
        .iter()
        .map(|c| {
            let mut item = invoice_item(
                &c.title,
                Some(c.key.as_str()),
                c.quantity,
                c.unit_price.cents(),
            );
            item.sort_order = c.sort_order;
            item.description = c.description.clone();
            item
        })
        .collect()
}
