//! # Change Patches
//!
//! A change request carries a structured patch ([`RequestedChanges`]) rather
//! than a full replacement quote. This module turns that patch into the
//! partial update written to the quote record, and into the set of invoice
//! line items the customer explicitly asked to drop.
//!
//! ## Patch Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Scalar fields    present → replaced, absent → untouched                │
//! │  Menu categories  current − remove  (set difference, by normalized name)│
//! │                   then ∪ add        (set union, appended in order)      │
//! │  Always stamped   status = quoted, workflow_status = estimated,         │
//! │                   last_status_change = now                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use ts_rs::TS;

use crate::menu::{normalize_name, service_key, LineItemKey};
use crate::types::{InvoiceLineItem, MenuCategory, MenuSelections, QuoteRequest, QuoteStatus, ServiceType};
use crate::workflow::QuoteWorkflowStatus;

// =============================================================================
// Requested Changes
// =============================================================================

/// Add/remove lists for one menu category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CategoryChange {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl CategoryChange {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Per-category menu edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MenuChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proteins: Option<CategoryChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sides: Option<CategoryChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desserts: Option<CategoryChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drinks: Option<CategoryChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_ons: Option<CategoryChange>,
}

impl MenuChanges {
    pub fn category(&self, category: MenuCategory) -> Option<&CategoryChange> {
        match category {
            MenuCategory::Protein => self.proteins.as_ref(),
            MenuCategory::Side => self.sides.as_ref(),
            MenuCategory::Dessert => self.desserts.as_ref(),
            MenuCategory::Drink => self.drinks.as_ref(),
            MenuCategory::AddOn => self.add_ons.as_ref(),
        }
    }

    /// Categories with at least one add or remove.
    pub fn touched(&self) -> impl Iterator<Item = (MenuCategory, &CategoryChange)> {
        MenuCategory::ALL
            .into_iter()
            .filter_map(move |c| self.category(c).filter(|ch| !ch.is_empty()).map(|ch| (c, ch)))
    }

    pub fn is_empty(&self) -> bool {
        self.touched().next().is_none()
    }
}

/// The patch stored in `change_requests.requested_changes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RequestedChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(as = "Option<String>")]
    pub event_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_changes: Option<MenuChanges>,
    /// Titles of invoice line items to delete outright (custom items).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_line_items: Vec<String>,
}

impl RequestedChanges {
    /// True when the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.event_name.is_none()
            && self.event_date.is_none()
            && self.guest_count.is_none()
            && self.location.is_none()
            && self.service_type.is_none()
            && self.menu_changes.as_ref().map_or(true, MenuChanges::is_empty)
            && self.remove_line_items.is_empty()
    }
}

// =============================================================================
// Quote Updates
// =============================================================================

/// Partial update for a quote record.
///
/// `None` fields are left untouched by the versioned write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteUpdates {
    pub event_name: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub guest_count: Option<i64>,
    pub location: Option<String>,
    pub service_type: Option<ServiceType>,
    /// Full menu after applying every category change.
    pub menu: Option<MenuSelections>,
    pub status: QuoteStatus,
    pub workflow_status: QuoteWorkflowStatus,
    pub last_status_change: DateTime<Utc>,
}

impl QuoteUpdates {
    /// Returns `quote` with these updates applied.
    ///
    /// `version` and `updated_at` are left for the persistence layer to set.
    pub fn apply_to(&self, quote: &QuoteRequest) -> QuoteRequest {
        let mut next = quote.clone();
        if let Some(name) = &self.event_name {
            next.event_name = name.clone();
        }
        if let Some(date) = self.event_date {
            next.event_date = date;
        }
        if let Some(guests) = self.guest_count {
            next.guest_count = guests;
        }
        if let Some(location) = &self.location {
            next.location = location.clone();
        }
        if let Some(service_type) = self.service_type {
            next.service_type = service_type;
        }
        if let Some(menu) = &self.menu {
            next.menu = menu.clone();
        }
        next.status = self.status;
        next.workflow_status = self.workflow_status;
        next.last_status_change = self.last_status_change;
        next
    }
}

/// Builds the partial update for `current` from `patch`.
///
/// ```rust
/// use catering_core::patch::{apply_changes, CategoryChange, MenuChanges, RequestedChanges};
/// use catering_core::{MenuSelections, NewQuoteRequest, QuoteRequest, ServiceType};
///
/// let submission = NewQuoteRequest {
///     contact_name: "Jordan Reyes".into(),
///     email: None,
///     phone: None,
///     company_name: None,
///     event_name: "Spring Gala".into(),
///     event_date: chrono::NaiveDate::from_ymd_opt(2030, 6, 15).unwrap(),
///     guest_count: 100,
///     location: "Town Hall".into(),
///     service_type: ServiceType::Buffet,
///     menu: MenuSelections {
///         proteins: vec!["Fried Chicken".into(), "Pulled Pork".into()],
///         ..Default::default()
///     },
/// };
/// let quote = QuoteRequest::from_submission("quote-1".into(), &submission, chrono::Utc::now());
/// let patch = RequestedChanges {
///     menu_changes: Some(MenuChanges {
///         proteins: Some(CategoryChange {
///             add: vec!["Catfish".into()],
///             remove: vec!["fried chicken".into()],
///         }),
///         ..Default::default()
///     }),
///     ..Default::default()
/// };
///
/// let updates = apply_changes(&quote, &patch, chrono::Utc::now());
/// assert_eq!(updates.menu.unwrap().proteins, vec!["Pulled Pork", "Catfish"]);
/// assert!(updates.guest_count.is_none());
/// ```
pub fn apply_changes(
    current: &QuoteRequest,
    patch: &RequestedChanges,
    now: DateTime<Utc>,
) -> QuoteUpdates {
    let menu = patch
        .menu_changes
        .as_ref()
        .filter(|changes| !changes.is_empty())
        .map(|changes| apply_menu_changes(&current.menu, changes));

    QuoteUpdates {
        event_name: patch.event_name.as_ref().map(|s| s.trim().to_string()),
        event_date: patch.event_date,
        guest_count: patch.guest_count,
        location: patch.location.as_ref().map(|s| s.trim().to_string()),
        service_type: patch.service_type,
        menu,
        status: QuoteStatus::Quoted,
        workflow_status: QuoteWorkflowStatus::Estimated,
        last_status_change: now,
    }
}

fn apply_menu_changes(current: &MenuSelections, changes: &MenuChanges) -> MenuSelections {
    let mut menu = current.clone();
    for (category, change) in changes.touched() {
        let list = menu.category_mut(category);

        let removed: BTreeSet<String> = change.remove.iter().map(|n| normalize_name(n)).collect();
        list.retain(|item| !removed.contains(&normalize_name(item)));

        for name in &change.add {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let normalized = normalize_name(name);
            if !list.iter().any(|item| normalize_name(item) == normalized) {
                list.push(name.to_string());
            }
        }
    }
    menu
}

// =============================================================================
// Removal Set
// =============================================================================

/// Invoice line items a patch explicitly removes.
///
/// Matching is exact: by semantic key, or by case-insensitive title equality.
/// A title never matches by containment, so removing "Chicken" leaves
/// "Fried Chicken" alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalSet {
    keys: BTreeSet<LineItemKey>,
    titles: BTreeSet<String>,
}

impl RemovalSet {
    pub fn insert_key(&mut self, key: LineItemKey) {
        self.keys.insert(key);
    }

    pub fn insert_title(&mut self, title: &str) {
        let title = fold_title(title);
        if !title.is_empty() {
            self.titles.insert(title);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.titles.is_empty()
    }

    pub fn matches(&self, item: &InvoiceLineItem) -> bool {
        item.source_key
            .as_ref()
            .is_some_and(|key| self.keys.contains(key))
            || self.titles.contains(&fold_title(&item.title))
    }
}

/// Case-insensitive, whitespace-trimmed title used for fallback matching.
pub fn fold_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Collects the line items `patch` removes from an invoice built for `current`.
///
/// Sources: menu `remove` lists, explicit `remove_line_items` titles, and the
/// previous service line when the service type changes.
pub fn removals(current: &QuoteRequest, patch: &RequestedChanges) -> RemovalSet {
    let mut set = RemovalSet::default();

    if let Some(changes) = &patch.menu_changes {
        for (category, change) in changes.touched() {
            for name in &change.remove {
                set.insert_key(LineItemKey::for_selection(category, name));
                set.insert_title(name);
            }
        }
    }

    for title in &patch.remove_line_items {
        set.insert_title(title);
    }

    if let Some(service_type) = patch.service_type {
        if service_type != current.service_type {
            set.insert_key(service_key(current.service_type));
        }
    }

    set
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{invoice_item, sample_quote};

    fn protein_change(add: &[&str], remove: &[&str]) -> RequestedChanges {
        RequestedChanges {
            menu_changes: Some(MenuChanges {
                proteins: Some(CategoryChange {
                    add: add.iter().map(|s| s.to_string()).collect(),
                    remove: remove.iter().map(|s| s.to_string()).collect(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_only_present_fields_are_touched() {
        let quote = sample_quote();
        let now = Utc::now();
        let patch = RequestedChanges {
            location: Some("  Riverside Hall ".to_string()),
            ..Default::default()
        };

        let updates = apply_changes(&quote, &patch, now);
        assert_eq!(updates.location.as_deref(), Some("Riverside Hall"));
        assert!(updates.guest_count.is_none());
        assert!(updates.menu.is_none());
        assert_eq!(updates.status, QuoteStatus::Quoted);
        assert_eq!(updates.workflow_status, QuoteWorkflowStatus::Estimated);
        assert_eq!(updates.last_status_change, now);

        let next = updates.apply_to(&quote);
        assert_eq!(next.location, "Riverside Hall");
        assert_eq!(next.guest_count, quote.guest_count);
        assert_eq!(next.menu, quote.menu);
    }

    #[test]
    fn test_menu_changes_preserve_unrelated_selections() {
        let quote = sample_quote();
        let updates = apply_changes(
            &quote,
            &protein_change(&["Catfish"], &["Fried Chicken"]),
            Utc::now(),
        );
        let menu = updates.menu.unwrap();
        assert_eq!(menu.proteins, vec!["Pulled Pork", "Catfish"]);
        assert_eq!(menu.sides, quote.menu.sides);
        assert_eq!(menu.desserts, quote.menu.desserts);
    }

    #[test]
    fn test_adding_existing_selection_does_not_duplicate() {
        let quote = sample_quote();
        let updates = apply_changes(&quote, &protein_change(&["pulled pork"], &[]), Utc::now());
        assert_eq!(updates.menu.unwrap().proteins, vec!["Fried Chicken", "Pulled Pork"]);
    }

    #[test]
    fn test_removal_set_is_exact() {
        let quote = sample_quote();
        let set = removals(&quote, &protein_change(&[], &["Chicken"]));

        let fried = invoice_item("Fried Chicken", Some("protein:fried-chicken"), 100, 1_200);
        let plain = invoice_item("chicken", None, 1, 5_000);
        assert!(!set.matches(&fried));
        assert!(set.matches(&plain));
    }

    #[test]
    fn test_service_type_change_removes_old_service_line() {
        let quote = sample_quote(); // buffet
        let patch = RequestedChanges {
            service_type: Some(ServiceType::FullService),
            ..Default::default()
        };
        let set = removals(&quote, &patch);
        let buffet = invoice_item("Buffet Setup & Service", Some("service:buffet"), 100, 400);
        assert!(set.matches(&buffet));

        let same = RequestedChanges {
            service_type: Some(ServiceType::Buffet),
            ..Default::default()
        };
        assert!(removals(&quote, &same).is_empty());
    }

    #[test]
    fn test_patch_json_shape() {
        let json = r#"{
            "guest_count": 120,
            "menu_changes": {"proteins": {"add": ["Catfish"], "remove": ["Fried Chicken"]}},
            "remove_line_items": ["Custom Cake"]
        }"#;
        let patch: RequestedChanges = serde_json::from_str(json).unwrap();
        assert_eq!(patch.guest_count, Some(120));
        assert_eq!(patch.remove_line_items, vec!["Custom Cake"]);
        assert!(!patch.is_empty());
        assert!(RequestedChanges::default().is_empty());
    }
}
