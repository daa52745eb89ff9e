//! # Menu Pricing and Line-Item Generation
//!
//! Turns quote facts (menu selections, guest count, service type) into the
//! canonical line-item set. Generation is a pure function of the quote and
//! the price book, so running it twice on the same quote yields the same set.
//!
//! ## Generation Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Category   Quantity               Unit price                           │
//! │  ─────────  ─────────────────────  ──────────────────────────────────   │
//! │  protein    guest_count            per-guest price                      │
//! │  side       guest_count            per-guest price                      │
//! │  dessert    guest_count            per-guest price                      │
//! │  drink      guest_count            per-guest price                      │
//! │  add_on     1                      flat price                           │
//! │  service    drop_off:     1        delivery fee                         │
//! │             buffet:       guests   setup per guest                      │
//! │             full_service: ⌈g/20⌉   per staff member                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every selected protein is portioned for every guest (both proteins are
//! available to all guests), so two proteins produce two full-quantity lines.
//!
//! Each generated item carries a [`LineItemKey`] such as
//! `protein:fried-chicken`. Reconciliation matches on this key first and only
//! falls back to exact title comparison for items created before keys existed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::types::{MenuCategory, QuoteRequest, ServiceType};

/// Guests covered by one staff member at full-service events.
pub const GUESTS_PER_STAFF: i64 = 20;

// =============================================================================
// Line Item Key
// =============================================================================

/// Kind of generated line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineItemKind {
    Menu(MenuCategory),
    Service,
}

impl LineItemKind {
    fn prefix(&self) -> &'static str {
        match self {
            LineItemKind::Menu(category) => category.as_str(),
            LineItemKind::Service => "service",
        }
    }
}

/// Stable semantic identity of a generated line item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(transparent)]
pub struct LineItemKey(String);

impl LineItemKey {
    /// Builds a key from a kind and a selection name.
    ///
    /// ```rust
    /// use catering_core::menu::{LineItemKey, LineItemKind};
    /// use catering_core::types::MenuCategory;
    ///
    /// let key = LineItemKey::new(LineItemKind::Menu(MenuCategory::Protein), "  Fried Chicken ");
    /// assert_eq!(key.as_str(), "protein:fried-chicken");
    /// ```
    pub fn new(kind: LineItemKind, name: &str) -> Self {
        LineItemKey(format!("{}:{}", kind.prefix(), normalize_name(name)))
    }

    /// Key of a menu selection.
    pub fn for_selection(category: MenuCategory, name: &str) -> Self {
        Self::new(LineItemKind::Menu(category), name)
    }

    /// Wraps a key read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        LineItemKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercases and collapses every run of non-alphanumerics into one hyphen.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

// =============================================================================
// Canonical Line Item
// =============================================================================

/// A line item as generated from quote facts, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CanonicalLineItem {
    pub key: LineItemKey,
    pub title: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub sort_order: i64,
}

impl CanonicalLineItem {
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Price Book
// =============================================================================

/// Service-type pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePricing {
    pub delivery_fee: Money,
    pub buffet_setup_per_guest: Money,
    pub staff_per_member: Money,
}

/// Prices for menu selections, keyed by normalized selection name.
///
/// Unknown selections fall back to the category's default price so a typo
/// in a free-text selection never produces a zero-priced line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBook {
    prices: BTreeMap<MenuCategory, BTreeMap<String, Money>>,
    defaults: BTreeMap<MenuCategory, Money>,
    pub service: ServicePricing,
}

impl PriceBook {
    /// Empty book with the given category defaults.
    pub fn new(defaults: BTreeMap<MenuCategory, Money>, service: ServicePricing) -> Self {
        PriceBook {
            prices: BTreeMap::new(),
            defaults,
            service,
        }
    }

    /// Adds or replaces a price.
    pub fn with_price(mut self, category: MenuCategory, name: &str, price: Money) -> Self {
        self.prices
            .entry(category)
            .or_default()
            .insert(normalize_name(name), price);
        self
    }

    /// Price of a selection, falling back to the category default.
    pub fn price_of(&self, category: MenuCategory, name: &str) -> Money {
        self.prices
            .get(&category)
            .and_then(|p| p.get(&normalize_name(name)))
            .or_else(|| self.defaults.get(&category))
            .copied()
            .unwrap_or_else(Money::zero)
    }
}

impl Default for PriceBook {
    fn default() -> Self {
        use MenuCategory::*;

        let defaults = BTreeMap::from([
            (Protein, Money::from_cents(1_200)),
            (Side, Money::from_cents(300)),
            (Dessert, Money::from_cents(400)),
            (Drink, Money::from_cents(200)),
            (AddOn, Money::from_cents(5_000)),
        ]);
        let service = ServicePricing {
            delivery_fee: Money::from_cents(7_500),
            buffet_setup_per_guest: Money::from_cents(400),
            staff_per_member: Money::from_cents(20_000),
        };

        PriceBook::new(defaults, service)
            .with_price(Protein, "Fried Chicken", Money::from_cents(1_200))
            .with_price(Protein, "Catfish", Money::from_cents(1_400))
            .with_price(Protein, "Pulled Pork", Money::from_cents(1_100))
            .with_price(Protein, "Brisket", Money::from_cents(1_600))
            .with_price(Protein, "Smoked Turkey", Money::from_cents(1_150))
            .with_price(Side, "Mac and Cheese", Money::from_cents(350))
            .with_price(Side, "Collard Greens", Money::from_cents(300))
            .with_price(Side, "Cornbread", Money::from_cents(200))
            .with_price(Side, "Potato Salad", Money::from_cents(300))
            .with_price(Side, "Baked Beans", Money::from_cents(300))
            .with_price(Dessert, "Peach Cobbler", Money::from_cents(450))
            .with_price(Dessert, "Banana Pudding", Money::from_cents(400))
            .with_price(Dessert, "Pecan Pie", Money::from_cents(500))
            .with_price(Drink, "Sweet Tea", Money::from_cents(200))
            .with_price(Drink, "Lemonade", Money::from_cents(200))
            .with_price(Drink, "Coffee", Money::from_cents(250))
            .with_price(AddOn, "Linens", Money::from_cents(7_500))
            .with_price(AddOn, "Chafing Dishes", Money::from_cents(5_000))
            .with_price(AddOn, "Dessert Station", Money::from_cents(15_000))
    }
}

// =============================================================================
// Generation
// =============================================================================

/// Key of the service line generated for a service type.
pub fn service_key(service_type: ServiceType) -> LineItemKey {
    LineItemKey::new(LineItemKind::Service, service_type.as_str())
}

/// Generates the canonical line-item set for a quote.
///
/// Selections are de-duplicated by key (case and punctuation insensitive);
/// the first spelling wins as the title.
pub fn generate_line_items(quote: &QuoteRequest, book: &PriceBook) -> Vec<CanonicalLineItem> {
    let guests = quote.guest_count.max(0);
    let mut items: Vec<CanonicalLineItem> = Vec::new();

    for category in MenuCategory::ALL {
        for name in quote.menu.category(category) {
            let title = name.trim();
            if title.is_empty() {
                continue;
            }
            let key = LineItemKey::for_selection(category, title);
            if items.iter().any(|i| i.key == key) {
                continue;
            }

            let (quantity, description) = match category {
                MenuCategory::AddOn => (1, None),
                _ => (guests, Some(format!("{} per guest", category.as_str()))),
            };

            items.push(CanonicalLineItem {
                key,
                title: title.to_string(),
                description,
                quantity,
                unit_price: book.price_of(category, title),
                sort_order: items.len() as i64,
            });
        }
    }

    let (title, quantity, unit_price) = match quote.service_type {
        ServiceType::DropOff => ("Delivery Fee", 1, book.service.delivery_fee),
        ServiceType::Buffet => (
            "Buffet Setup & Service",
            guests,
            book.service.buffet_setup_per_guest,
        ),
        ServiceType::FullService => (
            "Service Staff",
            staff_needed(guests),
            book.service.staff_per_member,
        ),
    };
    items.push(CanonicalLineItem {
        key: service_key(quote.service_type),
        title: title.to_string(),
        description: Some(format!("{} service", quote.service_type)),
        quantity,
        unit_price,
        sort_order: items.len() as i64,
    });

    items
}

/// Staff members needed for a full-service event (at least one).
pub fn staff_needed(guests: i64) -> i64 {
    ((guests + GUESTS_PER_STAFF - 1) / GUESTS_PER_STAFF).max(1)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::sample_quote;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Mac & Cheese"), "mac-cheese");
        assert_eq!(normalize_name("  Sweet   Tea!"), "sweet-tea");
        assert_eq!(normalize_name("BRISKET"), "brisket");
    }

    #[test]
    fn test_similar_names_get_distinct_keys() {
        let chicken = LineItemKey::for_selection(MenuCategory::Protein, "Chicken");
        let fried = LineItemKey::for_selection(MenuCategory::Protein, "Fried Chicken");
        assert_ne!(chicken, fried);
    }

    #[test]
    fn test_generation_for_buffet() {
        let quote = sample_quote();
        let items = generate_line_items(&quote, &PriceBook::default());

        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Fried Chicken",
                "Pulled Pork",
                "Mac and Cheese",
                "Peach Cobbler",
                "Sweet Tea",
                "Buffet Setup & Service"
            ]
        );

        // Both proteins are portioned for every guest
        assert_eq!(items[0].quantity, 100);
        assert_eq!(items[1].quantity, 100);
        assert_eq!(items[0].total_price().cents(), 120_000);
        assert_eq!(items[5].key, service_key(ServiceType::Buffet));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let quote = sample_quote();
        let book = PriceBook::default();
        assert_eq!(
            generate_line_items(&quote, &book),
            generate_line_items(&quote, &book)
        );
    }

    #[test]
    fn test_duplicate_selections_collapse() {
        let mut quote = sample_quote();
        quote.menu.proteins = vec!["Catfish".to_string(), "catfish ".to_string()];
        let items = generate_line_items(&quote, &PriceBook::default());
        assert_eq!(
            items
                .iter()
                .filter(|i| i.key.as_str() == "protein:catfish")
                .count(),
            1
        );
    }

    #[test]
    fn test_full_service_staff_count() {
        assert_eq!(staff_needed(0), 1);
        assert_eq!(staff_needed(20), 1);
        assert_eq!(staff_needed(21), 2);
        assert_eq!(staff_needed(100), 5);
    }

    #[test]
    fn test_unknown_selection_uses_category_default() {
        let book = PriceBook::default();
        assert_eq!(
            book.price_of(MenuCategory::Side, "Fried Okra").cents(),
            300
        );
        assert_eq!(
            book.price_of(MenuCategory::Protein, "catfish").cents(),
            1_400
        );
    }
}
