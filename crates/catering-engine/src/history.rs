//! # History Logger
//!
//! Writes the two append-only audit trails:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  quote_request_history             workflow_state_log                   │
//! │  ─────────────────────             ──────────────────                   │
//! │  one row per changed field         one row per status change            │
//! │                                                                         │
//! │  guest_count   100 → 150           change_request  pending → approved   │
//! │  menu.proteins + Catfish           invoice         paid    → sent       │
//! │  line_item     − Fried Chicken     quote           sent    → estimated  │
//! │  line_item     ~ 100 x $4.00 →     (metadata: totals, snapshot version) │
//! │                  150 x $4.00                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deltas are computed here, in pure functions, and handed to the audit
//! repository in one batch.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineResult;
use catering_core::menu::normalize_name;
use catering_core::reconcile::ReconciliationPlan;
use catering_core::workflow::WorkflowEntity;
use catering_core::{
    HistoryChangeKind, MenuCategory, QuoteHistoryEntry, QuoteRequest, WorkflowStateLogEntry,
};
use catering_db::{AuditRepository, Database};

/// One field-level change before it is stamped with ids and actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDelta {
    pub field: String,
    pub kind: HistoryChangeKind,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl FieldDelta {
    fn updated(field: &str, old: impl ToString, new: impl ToString) -> Self {
        FieldDelta {
            field: field.to_string(),
            kind: HistoryChangeKind::Updated,
            old_value: Some(old.to_string()),
            new_value: Some(new.to_string()),
        }
    }
}

/// Who changed a quote, and on behalf of which request.
#[derive(Debug, Clone, Copy)]
pub struct HistoryContext<'a> {
    pub quote_id: &'a str,
    pub change_request_id: Option<&'a str>,
    pub changed_by: &'a str,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Delta Computation
// =============================================================================

/// Scalar and menu differences between two versions of a quote.
pub fn quote_deltas(before: &QuoteRequest, after: &QuoteRequest) -> Vec<FieldDelta> {
    let mut deltas = Vec::new();

    if before.event_name != after.event_name {
        deltas.push(FieldDelta::updated("event_name", &before.event_name, &after.event_name));
    }
    if before.event_date != after.event_date {
        deltas.push(FieldDelta::updated("event_date", before.event_date, after.event_date));
    }
    if before.guest_count != after.guest_count {
        deltas.push(FieldDelta::updated("guest_count", before.guest_count, after.guest_count));
    }
    if before.location != after.location {
        deltas.push(FieldDelta::updated("location", &before.location, &after.location));
    }
    if before.service_type != after.service_type {
        deltas.push(FieldDelta::updated(
            "service_type",
            before.service_type.as_str(),
            after.service_type.as_str(),
        ));
    }

    for category in MenuCategory::ALL {
        let field = format!("menu.{}", category.field_name());
        let old = before.menu.category(category);
        let new = after.menu.category(category);
        let old_keys: BTreeSet<String> = old.iter().map(|n| normalize_name(n)).collect();
        let new_keys: BTreeSet<String> = new.iter().map(|n| normalize_name(n)).collect();

        for name in old.iter().filter(|n| !new_keys.contains(&normalize_name(n))) {
            deltas.push(FieldDelta {
                field: field.clone(),
                kind: HistoryChangeKind::Removed,
                old_value: Some(name.clone()),
                new_value: None,
            });
        }
        for name in new.iter().filter(|n| !old_keys.contains(&normalize_name(n))) {
            deltas.push(FieldDelta {
                field: field.clone(),
                kind: HistoryChangeKind::Added,
                old_value: None,
                new_value: Some(name.clone()),
            });
        }
    }

    deltas
}

/// Line-item changes made by a reconciliation.
pub fn line_item_deltas(plan: &ReconciliationPlan) -> Vec<FieldDelta> {
    let mut deltas = Vec::new();

    for item in &plan.deletes {
        deltas.push(FieldDelta {
            field: "line_item".to_string(),
            kind: HistoryChangeKind::Removed,
            old_value: Some(format!(
                "{}: {} x {}",
                item.title,
                item.quantity,
                item.unit_price()
            )),
            new_value: None,
        });
    }
    for update in plan.updates.iter().filter(|u| u.changes_amount()) {
        deltas.push(FieldDelta {
            field: "line_item".to_string(),
            kind: HistoryChangeKind::Modified,
            old_value: Some(format!(
                "{}: {} x {}",
                update.title, update.previous_quantity, update.previous_unit_price
            )),
            new_value: Some(format!(
                "{}: {} x {}",
                update.title, update.quantity, update.unit_price
            )),
        });
    }
    for item in &plan.inserts {
        deltas.push(FieldDelta {
            field: "line_item".to_string(),
            kind: HistoryChangeKind::Added,
            old_value: None,
            new_value: Some(format!(
                "{}: {} x {}",
                item.title, item.quantity, item.unit_price
            )),
        });
    }

    deltas
}

// =============================================================================
// Logger
// =============================================================================

/// Appends audit rows for quote edits and status changes.
#[derive(Debug, Clone)]
pub struct HistoryLogger {
    audit: AuditRepository,
}

impl HistoryLogger {
    pub fn new(db: &Database) -> Self {
        HistoryLogger { audit: db.audit() }
    }

    /// Records every field and line-item delta of one quote change.
    ///
    /// Returns the number of rows written.
    pub async fn record_quote_change(
        &self,
        ctx: HistoryContext<'_>,
        before: &QuoteRequest,
        after: &QuoteRequest,
        plan: Option<&ReconciliationPlan>,
    ) -> EngineResult<usize> {
        let mut deltas = quote_deltas(before, after);
        if let Some(plan) = plan {
            deltas.extend(line_item_deltas(plan));
        }

        let entries: Vec<QuoteHistoryEntry> = deltas
            .into_iter()
            .map(|d| QuoteHistoryEntry {
                id: Uuid::new_v4().to_string(),
                quote_request_id: ctx.quote_id.to_string(),
                change_request_id: ctx.change_request_id.map(str::to_string),
                field: d.field,
                change_kind: d.kind,
                old_value: d.old_value,
                new_value: d.new_value,
                changed_by: ctx.changed_by.to_string(),
                created_at: ctx.at,
            })
            .collect();

        self.audit.append_history(&entries).await?;
        debug!(quote_id = %ctx.quote_id, rows = entries.len(), "Quote history recorded");
        Ok(entries.len())
    }

    /// Appends one status change to the workflow log.
    #[allow(clippy::too_many_arguments)]
    pub async fn log_transition(
        &self,
        entity: WorkflowEntity,
        entity_id: &str,
        from: Option<&str>,
        to: &str,
        changed_by: &str,
        reason: Option<&str>,
        metadata: serde_json::Value,
    ) -> EngineResult<()> {
        let entry = WorkflowStateLogEntry {
            id: Uuid::new_v4().to_string(),
            entity_type: entity,
            entity_id: entity_id.to_string(),
            previous_status: from.map(str::to_string),
            new_status: to.to_string(),
            changed_by: changed_by.to_string(),
            reason: reason.map(str::to_string),
            metadata,
            created_at: Utc::now(),
        };
        self.audit.append_workflow_log(&entry).await?;
        Ok(())
    }

    pub async fn quote_history(&self, quote_id: &str) -> EngineResult<Vec<QuoteHistoryEntry>> {
        Ok(self.audit.list_history(quote_id).await?)
    }

    pub async fn workflow_log(
        &self,
        entity: WorkflowEntity,
        entity_id: &str,
    ) -> EngineResult<Vec<WorkflowStateLogEntry>> {
        Ok(self.audit.list_workflow_log(entity, entity_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_engine;
    use catering_core::menu::{generate_line_items, PriceBook};
    use catering_core::patch::{apply_changes, removals, CategoryChange, MenuChanges, RequestedChanges};
    use catering_core::reconcile::plan_reconciliation;
    use catering_core::test_fixtures::{fixed_now, persisted_from, sample_quote};

    fn swap_patch() -> RequestedChanges {
        RequestedChanges {
            guest_count: Some(150),
            menu_changes: Some(MenuChanges {
                proteins: Some(CategoryChange {
                    add: vec!["Catfish".to_string()],
                    remove: vec!["Fried Chicken".to_string()],
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_quote_deltas_cover_scalars_and_menu() {
        let before = sample_quote();
        let after = apply_changes(&before, &swap_patch(), fixed_now()).apply_to(&before);

        let deltas = quote_deltas(&before, &after);
        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[0], FieldDelta::updated("guest_count", 100, 150));
        assert!(deltas.iter().any(|d| d.field == "menu.proteins"
            && d.kind == HistoryChangeKind::Removed
            && d.old_value.as_deref() == Some("Fried Chicken")));
        assert!(deltas.iter().any(|d| d.field == "menu.proteins"
            && d.kind == HistoryChangeKind::Added
            && d.new_value.as_deref() == Some("Catfish")));
    }

    #[test]
    fn test_unchanged_quote_has_no_deltas() {
        let quote = sample_quote();
        assert!(quote_deltas(&quote, &quote).is_empty());
    }

    #[test]
    fn test_line_item_deltas_follow_the_plan() {
        let before = sample_quote();
        let patch = swap_patch();
        let after = apply_changes(&before, &patch, fixed_now()).apply_to(&before);

        let book = PriceBook::default();
        let previous = generate_line_items(&before, &book);
        let plan = plan_reconciliation(
            &persisted_from(&previous),
            &generate_line_items(&after, &book),
            &previous,
            &removals(&before, &patch),
        );

        let deltas = line_item_deltas(&plan);
        let kinds: Vec<HistoryChangeKind> = deltas.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&HistoryChangeKind::Removed));
        assert!(kinds.contains(&HistoryChangeKind::Added));
        // every remaining per-guest line scales from 100 to 150
        assert!(deltas.iter().any(|d| d.kind == HistoryChangeKind::Modified
            && d.old_value.as_deref() == Some("Pulled Pork: 100 x $11.00")
            && d.new_value.as_deref() == Some("Pulled Pork: 150 x $11.00")));
    }

    #[tokio::test]
    async fn test_record_and_log_are_persisted() {
        let (engine, quote, invoice) = seeded_engine().await;
        let history = engine.history();

        let after = apply_changes(&quote, &swap_patch(), fixed_now()).apply_to(&quote);
        let ctx = HistoryContext {
            quote_id: &quote.id,
            change_request_id: None,
            changed_by: "admin",
            at: fixed_now(),
        };
        let written = history.record_quote_change(ctx, &quote, &after, None).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(history.quote_history(&quote.id).await.unwrap().len(), 3);

        history
            .log_transition(
                WorkflowEntity::Invoice,
                &invoice.id,
                Some("paid"),
                "sent",
                "admin",
                Some("change request approved"),
                serde_json::json!({ "new_total": 100 }),
            )
            .await
            .unwrap();
        let log = history
            .workflow_log(WorkflowEntity::Invoice, &invoice.id)
            .await
            .unwrap();
        assert_eq!(log.last().map(|e| e.new_status.as_str()), Some("sent"));
    }
}
