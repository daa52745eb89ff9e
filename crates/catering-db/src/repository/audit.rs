//! # Audit Repository
//!
//! Append-only audit trails:
//!
//! - `workflow_state_log` - every status change of a quote, invoice or
//!   change request
//! - `quote_request_history` - field-level deltas applied to a quote
//!
//! Neither table is ever updated; triggers enforce it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use catering_core::workflow::WorkflowEntity;
use catering_core::{HistoryChangeKind, QuoteHistoryEntry, WorkflowStateLogEntry};

#[derive(Debug, sqlx::FromRow)]
struct WorkflowLogRow {
    id: String,
    entity_type: WorkflowEntity,
    entity_id: String,
    previous_status: Option<String>,
    new_status: String,
    changed_by: String,
    reason: Option<String>,
    metadata: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<WorkflowLogRow> for WorkflowStateLogEntry {
    type Error = DbError;

    fn try_from(row: WorkflowLogRow) -> DbResult<Self> {
        Ok(WorkflowStateLogEntry {
            metadata: serde_json::from_str(&row.metadata)?,
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            previous_status: row.previous_status,
            new_status: row.new_status,
            changed_by: row.changed_by,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: String,
    quote_request_id: String,
    change_request_id: Option<String>,
    field_name: String,
    change_type: HistoryChangeKind,
    old_value: Option<String>,
    new_value: Option<String>,
    changed_by: String,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for QuoteHistoryEntry {
    fn from(row: HistoryRow) -> Self {
        QuoteHistoryEntry {
            id: row.id,
            quote_request_id: row.quote_request_id,
            change_request_id: row.change_request_id,
            field: row.field_name,
            change_kind: row.change_type,
            old_value: row.old_value,
            new_value: row.new_value,
            changed_by: row.changed_by,
            created_at: row.created_at,
        }
    }
}

/// Repository for the audit tables.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    // =========================================================================
    // Workflow State Log
    // =========================================================================

    /// Appends one status change.
    pub async fn append_workflow_log(&self, entry: &WorkflowStateLogEntry) -> DbResult<()> {
        let metadata = serde_json::to_string(&entry.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO workflow_state_log (
                id, entity_type, entity_id, previous_status, new_status,
                changed_by, reason, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.previous_status)
        .bind(&entry.new_status)
        .bind(&entry.changed_by)
        .bind(&entry.reason)
        .bind(metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        debug!(
            entity = %entry.entity_type,
            entity_id = %entry.entity_id,
            from = ?entry.previous_status,
            to = %entry.new_status,
            "Workflow transition logged"
        );
        Ok(())
    }

    /// Lists the status log of one entity, oldest first.
    pub async fn list_workflow_log(
        &self,
        entity_type: WorkflowEntity,
        entity_id: &str,
    ) -> DbResult<Vec<WorkflowStateLogEntry>> {
        let rows: Vec<WorkflowLogRow> = sqlx::query_as(
            r#"
            SELECT id, entity_type, entity_id, previous_status, new_status,
                   changed_by, reason, metadata, created_at
            FROM workflow_state_log
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY created_at, rowid
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkflowStateLogEntry::try_from).collect()
    }

    // =========================================================================
    // Quote History
    // =========================================================================

    /// Appends a batch of field-level deltas atomically.
    pub async fn append_history(&self, entries: &[QuoteHistoryEntry]) -> DbResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO quote_request_history (
                    id, quote_request_id, change_request_id, field_name, change_type,
                    old_value, new_value, changed_by, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.quote_request_id)
            .bind(&entry.change_request_id)
            .bind(&entry.field)
            .bind(entry.change_kind)
            .bind(&entry.old_value)
            .bind(&entry.new_value)
            .bind(&entry.changed_by)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = entries.len(), "Quote history appended");
        Ok(())
    }

    /// Lists the history of a quote, oldest first.
    pub async fn list_history(&self, quote_id: &str) -> DbResult<Vec<QuoteHistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT id, quote_request_id, change_request_id, field_name, change_type,
                   old_value, new_value, changed_by, created_at
            FROM quote_request_history
            WHERE quote_request_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(quote_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(QuoteHistoryEntry::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
