//! # Line-Item Reconciliation
//!
//! Merges a freshly generated canonical line-item set into the invoice's
//! persisted items without losing manual edits. Planning is pure: the result
//! is a [`ReconciliationPlan`] that the persistence layer applies in one
//! transaction.
//!
//! ## Matching
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. removal set      persisted items the patch removes  → delete        │
//! │  2. key match        persisted.source_key == canonical.key              │
//! │  3. title fallback   persisted item without a key whose title equals    │
//! │                      the canonical title (case-insensitive)             │
//! │                                                                         │
//! │  matched      → quantity always follows canonical                       │
//! │                 price follows canonical unless the item is overridden   │
//! │  unmatched    → canonical item inserted                                 │
//! │  left over    → untouched (custom items survive)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Override Detection
//! An item is treated as overridden when `is_override` is set, or when its
//! persisted unit price differs from what the *previous* generation produced
//! for the same key. Overridden items keep their price and their total is
//! recomputed as `preserved price × new quantity`.
//!
//! Only items whose stored values would change appear in the plan, so
//! planning against an already reconciled invoice yields an empty plan.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::menu::{CanonicalLineItem, LineItemKey};
use crate::money::Money;
use crate::patch::{fold_title, RemovalSet};
use crate::types::InvoiceLineItem;

// =============================================================================
// Plan
// =============================================================================

/// New values for a matched persisted item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemUpdate {
    pub id: String,
    pub title: String,
    /// Key adopted by legacy items matched on title.
    pub source_key: LineItemKey,
    pub previous_quantity: i64,
    pub previous_unit_price: Money,
    pub quantity: i64,
    pub unit_price: Money,
    /// True when the persisted price was kept.
    pub price_preserved: bool,
}

impl LineItemUpdate {
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// True when the billed amount of this row changes.
    pub fn changes_amount(&self) -> bool {
        self.quantity != self.previous_quantity || self.unit_price != self.previous_unit_price
    }
}

/// Writes needed to bring persisted items in line with the canonical set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub deletes: Vec<InvoiceLineItem>,
    pub updates: Vec<LineItemUpdate>,
    pub inserts: Vec<CanonicalLineItem>,
    /// Ids of persisted items no canonical item matched.
    pub untouched: Vec<String>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }

    /// Subtotal the invoice will carry once the plan is applied to `persisted`.
    pub fn resulting_subtotal(&self, persisted: &[InvoiceLineItem]) -> Money {
        let deleted: BTreeSet<&str> = self.deletes.iter().map(|d| d.id.as_str()).collect();
        let updated: BTreeMap<&str, &LineItemUpdate> =
            self.updates.iter().map(|u| (u.id.as_str(), u)).collect();

        let kept: Money = persisted
            .iter()
            .filter(|item| !deleted.contains(item.id.as_str()))
            .map(|item| match updated.get(item.id.as_str()) {
                Some(update) => update.total_price(),
                None => item.total_price(),
            })
            .sum();
        let inserted: Money = self.inserts.iter().map(CanonicalLineItem::total_price).sum();

        kept + inserted
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Plans the reconciliation of `canonical` into `persisted`.
///
/// `previous` is the canonical set generated from the quote *before* the
/// change; it is what a never-overridden item's price still equals.
pub fn plan_reconciliation(
    persisted: &[InvoiceLineItem],
    canonical: &[CanonicalLineItem],
    previous: &[CanonicalLineItem],
    removals: &RemovalSet,
) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();

    let (deleted, remaining): (Vec<&InvoiceLineItem>, Vec<&InvoiceLineItem>) =
        persisted.iter().partition(|item| removals.matches(item));
    plan.deletes = deleted.into_iter().cloned().collect();

    let previous_prices: BTreeMap<&LineItemKey, Money> =
        previous.iter().map(|c| (&c.key, c.unit_price)).collect();

    let mut claimed: BTreeSet<&str> = BTreeSet::new();

    for item in canonical {
        let Some(existing) = find_match(&remaining, &claimed, item) else {
            plan.inserts.push(item.clone());
            continue;
        };
        claimed.insert(existing.id.as_str());

        let expected = previous_prices
            .get(&item.key)
            .copied()
            .unwrap_or(item.unit_price);
        let overridden = existing.is_override || existing.unit_price() != expected;
        let unit_price = if overridden {
            existing.unit_price()
        } else {
            item.unit_price
        };
        let title = if overridden {
            existing.title.clone()
        } else {
            item.title.clone()
        };

        let update = LineItemUpdate {
            id: existing.id.clone(),
            title,
            source_key: item.key.clone(),
            previous_quantity: existing.quantity,
            previous_unit_price: existing.unit_price(),
            quantity: item.quantity,
            unit_price,
            price_preserved: overridden,
        };

        let stale_total = existing.total_price() != update.total_price();
        let stale_identity = existing.source_key.as_ref() != Some(&update.source_key)
            || existing.title != update.title;
        if update.changes_amount() || stale_total || stale_identity {
            plan.updates.push(update);
        }
    }

    plan.untouched = remaining
        .iter()
        .filter(|item| !claimed.contains(item.id.as_str()))
        .map(|item| item.id.clone())
        .collect();

    plan
}

fn find_match<'a>(
    remaining: &[&'a InvoiceLineItem],
    claimed: &BTreeSet<&str>,
    item: &CanonicalLineItem,
) -> Option<&'a InvoiceLineItem> {
    let available = || {
        remaining
            .iter()
            .copied()
            .filter(|p| !claimed.contains(p.id.as_str()))
    };

    available()
        .find(|p| p.source_key.as_ref() == Some(&item.key))
        .or_else(|| {
            let title = fold_title(&item.title);
            available().find(|p| p.source_key.is_none() && fold_title(&p.title) == title)
        })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{generate_line_items, PriceBook};
    use crate::patch::{apply_changes, removals, CategoryChange, MenuChanges, RequestedChanges};
    use crate::test_fixtures::{invoice_item, persisted_from, sample_quote};
    use chrono::Utc;

    #[test]
    fn test_identical_sets_produce_empty_plan() {
        let quote = sample_quote();
        let canonical = generate_line_items(&quote, &PriceBook::default());
        let persisted = persisted_from(&canonical);

        let plan = plan_reconciliation(&persisted, &canonical, &canonical, &RemovalSet::default());
        assert!(plan.is_empty());
        assert!(plan.untouched.is_empty());
    }

    #[test]
    fn test_swap_protein_keeps_custom_item() {
        let book = PriceBook::default();
        let quote = sample_quote();
        let previous = generate_line_items(&quote, &book);
        let mut persisted = persisted_from(&previous);
        persisted.push(invoice_item("Custom Cake", None, 1, 15_000));

        let patch = RequestedChanges {
            menu_changes: Some(MenuChanges {
                proteins: Some(CategoryChange {
                    add: vec!["Catfish".to_string()],
                    remove: vec!["Fried Chicken".to_string()],
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let updated = apply_changes(&quote, &patch, Utc::now()).apply_to(&quote);
        let canonical = generate_line_items(&updated, &book);

        let plan = plan_reconciliation(&persisted, &canonical, &previous, &removals(&quote, &patch));

        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].title, "Fried Chicken");
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].title, "Catfish");
        assert_eq!(plan.untouched.len(), 1);

        assert!(plan.updates.is_empty());

        let before: Money = persisted.iter().map(InvoiceLineItem::total_price).sum();
        let after = plan.resulting_subtotal(&persisted);
        // -100 × $12.00 fried chicken, +100 × $14.00 catfish
        assert_eq!(after - before, Money::from_cents(20_000));
    }

    #[test]
    fn test_override_survives_guest_count_change() {
        let book = PriceBook::default();
        let quote = sample_quote();
        let previous = generate_line_items(&quote, &book);
        let mut persisted = persisted_from(&previous);

        // Admin discounted the pulled pork to $9.50
        let pork = persisted.iter_mut().find(|p| p.title == "Pulled Pork").unwrap();
        pork.unit_price_cents = 950;
        pork.total_price_cents = 950 * pork.quantity;

        let patch = RequestedChanges {
            guest_count: Some(150),
            ..Default::default()
        };
        let updated = apply_changes(&quote, &patch, Utc::now()).apply_to(&quote);
        let canonical = generate_line_items(&updated, &book);
        let plan = plan_reconciliation(&persisted, &canonical, &previous, &removals(&quote, &patch));

        let pork = plan.updates.iter().find(|u| u.title == "Pulled Pork").unwrap();
        assert!(pork.price_preserved);
        assert_eq!(pork.quantity, 150);
        assert_eq!(pork.unit_price.cents(), 950);
        assert_eq!(pork.total_price().cents(), 142_500);

        let chicken = plan.updates.iter().find(|u| u.title == "Fried Chicken").unwrap();
        assert!(!chicken.price_preserved);
        assert_eq!(chicken.total_price().cents(), 180_000);
    }

    #[test]
    fn test_flagged_override_keeps_price_even_when_equal_to_previous() {
        let book = PriceBook::default();
        let quote = sample_quote();
        let previous = generate_line_items(&quote, &book);
        let mut persisted = persisted_from(&previous);
        persisted[0].is_override = true;

        let book = book.with_price(
            crate::types::MenuCategory::Protein,
            "Fried Chicken",
            Money::from_cents(1_500),
        );
        let canonical = generate_line_items(&quote, &book);
        let plan = plan_reconciliation(&persisted, &canonical, &previous, &RemovalSet::default());

        assert!(plan.updates.iter().all(|u| u.id != persisted[0].id));
    }

    #[test]
    fn test_legacy_item_matched_by_exact_title_adopts_key() {
        let quote = sample_quote();
        let canonical = generate_line_items(&quote, &PriceBook::default());
        let mut persisted = persisted_from(&canonical);
        persisted[0].source_key = None;
        persisted[0].title = "FRIED CHICKEN".to_string();

        let plan = plan_reconciliation(&persisted, &canonical, &canonical, &RemovalSet::default());
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].source_key.as_str(), "protein:fried-chicken");
        assert_eq!(plan.updates[0].title, "Fried Chicken");
        assert!(plan.inserts.is_empty());
    }

    #[test]
    fn test_similar_title_is_not_matched() {
        let quote = sample_quote();
        let canonical = generate_line_items(&quote, &PriceBook::default());
        let mut persisted = persisted_from(&canonical);
        persisted.retain(|p| p.title != "Fried Chicken");
        persisted.push(invoice_item("Chicken", None, 1, 2_000));

        let plan = plan_reconciliation(&persisted, &canonical, &canonical, &RemovalSet::default());
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].title, "Fried Chicken");
        assert_eq!(plan.untouched.len(), 1);
    }
}
