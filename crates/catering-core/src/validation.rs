//! # Validation Module
//!
//! Input validation for quote submissions and change-request patches.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Portal / admin forms                                          │
//! │  └── Format checks, immediate feedback                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine entry points (Rust)                                    │
//! │  ├── Type validation (deserialization)                                  │
//! │  └── THIS MODULE: business rules, before any write                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── NOT NULL / CHECK constraints                                       │
//! │  └── Foreign key constraints                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use catering_core::patch::RequestedChanges;
//! use catering_core::validation::validate_requested_changes;
//!
//! let today = chrono::NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
//! let patch = RequestedChanges { guest_count: Some(0), ..Default::default() };
//! assert!(validate_requested_changes(&patch, today).is_err());
//! ```

use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::error::ValidationError;
use crate::menu::normalize_name;
use crate::patch::RequestedChanges;
use crate::types::{MenuSelections, NewQuoteRequest};
use crate::{MAX_GUEST_COUNT, MAX_SELECTIONS_PER_CATEGORY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required, length-limited text field.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates an email address.
///
/// ## Rules
/// - Exactly one `@` with a non-empty local part
/// - Domain contains a dot and no empty labels
/// - No whitespace
///
/// ```rust
/// use catering_core::validation::validate_email;
///
/// assert!(validate_email("events@acme.com").is_ok());
/// assert!(validate_email("events@acme").is_err());
/// assert!(validate_email("not an email").is_err());
/// ```
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: reason.to_string(),
    };

    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain spaces"));
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| invalid("missing '@'"))?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid("must have exactly one '@' and a local part"));
    }
    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return Err(invalid("domain must look like example.com"));
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a guest count.
///
/// ## Rules
/// - At least 1
/// - At most [`MAX_GUEST_COUNT`]
pub fn validate_guest_count(guests: i64) -> ValidationResult<()> {
    if !(1..=MAX_GUEST_COUNT).contains(&guests) {
        return Err(ValidationError::OutOfRange {
            field: "guest_count".to_string(),
            min: 1,
            max: MAX_GUEST_COUNT,
        });
    }
    Ok(())
}

/// Validates that an event date is not in the past.
pub fn validate_event_date(date: NaiveDate, today: NaiveDate) -> ValidationResult<()> {
    if date < today {
        return Err(ValidationError::DateInPast {
            field: "event_date".to_string(),
            earliest: today.to_string(),
        });
    }
    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

// =============================================================================
// Aggregate Validators
// =============================================================================

/// Validates a new quote submission.
pub fn validate_new_quote(quote: &NewQuoteRequest, today: NaiveDate) -> ValidationResult<()> {
    validate_text("contact_name", &quote.contact_name, 200)?;
    validate_text("event_name", &quote.event_name, 200)?;
    validate_text("location", &quote.location, 500)?;
    if let Some(email) = &quote.email {
        validate_email(email)?;
    }
    validate_guest_count(quote.guest_count)?;
    validate_event_date(quote.event_date, today)?;
    validate_menu(&quote.menu)
}

fn validate_menu(menu: &MenuSelections) -> ValidationResult<()> {
    for category in crate::types::MenuCategory::ALL {
        let items = menu.category(category);
        if items.len() > MAX_SELECTIONS_PER_CATEGORY {
            return Err(ValidationError::OutOfRange {
                field: category.field_name().to_string(),
                min: 0,
                max: MAX_SELECTIONS_PER_CATEGORY as i64,
            });
        }
        for item in items {
            validate_text(category.field_name(), item, 100)?;
        }
    }
    Ok(())
}

/// Validates a change-request patch before anything is written.
///
/// ## Rules
/// - The patch must change something
/// - Present scalar fields obey the same rules as a new quote
/// - A menu selection cannot be both added and removed
/// - Removal titles must be non-empty
pub fn validate_requested_changes(
    patch: &RequestedChanges,
    today: NaiveDate,
) -> ValidationResult<()> {
    if patch.is_empty() {
        return Err(ValidationError::Required {
            field: "requested_changes".to_string(),
        });
    }

    if let Some(name) = &patch.event_name {
        validate_text("event_name", name, 200)?;
    }
    if let Some(location) = &patch.location {
        validate_text("location", location, 500)?;
    }
    if let Some(guests) = patch.guest_count {
        validate_guest_count(guests)?;
    }
    if let Some(date) = patch.event_date {
        validate_event_date(date, today)?;
    }

    if let Some(changes) = &patch.menu_changes {
        for (category, change) in changes.touched() {
            let field = format!("menu_changes.{}", category.field_name());
            let removed: BTreeSet<String> =
                change.remove.iter().map(|n| normalize_name(n)).collect();
            for name in &change.add {
                validate_text(&field, name, 100)?;
                if removed.contains(&normalize_name(name)) {
                    return Err(ValidationError::Conflicting {
                        field,
                        value: name.trim().to_string(),
                    });
                }
            }
            for name in &change.remove {
                validate_text(&field, name, 100)?;
            }
        }
    }

    for title in &patch.remove_line_items {
        validate_text("remove_line_items", title, 200)?;
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ```rust
/// use catering_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{CategoryChange, MenuChanges};
    use crate::test_fixtures::new_quote;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("location", "Town Hall", 10).is_ok());
        assert!(validate_text("location", "   ", 10).is_err());
        assert!(validate_text("location", &"x".repeat(11), 10).is_err());
    }

    #[test]
    fn test_validate_guest_count() {
        assert!(validate_guest_count(1).is_ok());
        assert!(validate_guest_count(MAX_GUEST_COUNT).is_ok());
        assert!(validate_guest_count(0).is_err());
        assert!(validate_guest_count(MAX_GUEST_COUNT + 1).is_err());
    }

    #[test]
    fn test_validate_new_quote() {
        assert!(validate_new_quote(&new_quote(), today()).is_ok());

        let mut quote = new_quote();
        quote.email = Some("nobody".to_string());
        assert!(matches!(
            validate_new_quote(&quote, today()),
            Err(ValidationError::InvalidFormat { .. })
        ));

        let mut quote = new_quote();
        quote.event_date = NaiveDate::from_ymd_opt(2029, 12, 31).unwrap();
        assert!(matches!(
            validate_new_quote(&quote, today()),
            Err(ValidationError::DateInPast { .. })
        ));
    }

    #[test]
    fn test_empty_patch_rejected() {
        assert_eq!(
            validate_requested_changes(&RequestedChanges::default(), today()),
            Err(ValidationError::Required {
                field: "requested_changes".to_string()
            })
        );
    }

    #[test]
    fn test_conflicting_menu_change_rejected() {
        let patch = RequestedChanges {
            menu_changes: Some(MenuChanges {
                sides: Some(CategoryChange {
                    add: vec!["Cornbread".to_string()],
                    remove: vec!["cornbread".to_string()],
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            validate_requested_changes(&patch, today()),
            Err(ValidationError::Conflicting { .. })
        ));
    }

    #[test]
    fn test_valid_patch_accepted() {
        let patch = RequestedChanges {
            guest_count: Some(80),
            location: Some("Riverside Hall".to_string()),
            remove_line_items: vec!["Custom Cake".to_string()],
            ..Default::default()
        };
        assert!(validate_requested_changes(&patch, today()).is_ok());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid(&uuid::Uuid::new_v4().to_string()).is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("12345").is_err());
    }
}
