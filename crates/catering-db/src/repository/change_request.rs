//! # Change Request Repository
//!
//! Customer change requests and their resolution.
//!
//! ## Resolution Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  pending ──resolve()──► approved | rejected        (exactly once)       │
//! │                                                                         │
//! │  UPDATE change_requests SET status = ?, ...                             │
//! │  WHERE id = ? AND status = 'pending'                                    │
//! │                                                                         │
//! │  0 rows → row exists?  yes → DbError::AlreadyResolved                   │
//! │                        no  → DbError::NotFound                          │
//! │                                                                         │
//! │  A trigger additionally refuses any later edit of the resolution        │
//! │  columns; only admin_response stays writable.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use catering_core::{ChangeRequest, ChangeRequestStatus, Money};

const COLUMNS: &str = "id, invoice_id, requested_changes, customer_comments, status, \
     admin_response, estimated_cost_change_cents, resolved_by, created_at, resolved_at";

#[derive(Debug, sqlx::FromRow)]
struct ChangeRequestRow {
    id: String,
    invoice_id: String,
    requested_changes: String,
    customer_comments: Option<String>,
    status: ChangeRequestStatus,
    admin_response: Option<String>,
    estimated_cost_change_cents: Option<i64>,
    resolved_by: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<ChangeRequestRow> for ChangeRequest {
    type Error = DbError;

    fn try_from(row: ChangeRequestRow) -> DbResult<Self> {
        Ok(ChangeRequest {
            requested_changes: serde_json::from_str(&row.requested_changes)?,
            id: row.id,
            invoice_id: row.invoice_id,
            customer_comments: row.customer_comments,
            status: row.status,
            admin_response: row.admin_response,
            estimated_cost_change_cents: row.estimated_cost_change_cents,
            resolved_by: row.resolved_by,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

/// Final decision recorded on a change request.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub status: ChangeRequestStatus,
    pub resolved_by: &'a str,
    pub admin_response: Option<&'a str>,
    pub estimated_cost_change: Option<Money>,
    pub resolved_at: DateTime<Utc>,
}

/// Repository for change request operations.
#[derive(Debug, Clone)]
pub struct ChangeRequestRepository {
    pool: SqlitePool,
}

impl ChangeRequestRepository {
    /// Creates a new ChangeRequestRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ChangeRequestRepository { pool }
    }

    /// Inserts a new change request.
    pub async fn insert(&self, request: &ChangeRequest) -> DbResult<()> {
        let patch = serde_json::to_string(&request.requested_changes)?;

        sqlx::query(
            r#"
            INSERT INTO change_requests (
                id, invoice_id, requested_changes, customer_comments, status,
                admin_response, estimated_cost_change_cents, resolved_by,
                created_at, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&request.id)
        .bind(&request.invoice_id)
        .bind(patch)
        .bind(&request.customer_comments)
        .bind(request.status)
        .bind(&request.admin_response)
        .bind(request.estimated_cost_change_cents)
        .bind(&request.resolved_by)
        .bind(request.created_at)
        .bind(request.resolved_at)
        .execute(&self.pool)
        .await?;

        debug!(id = %request.id, invoice_id = %request.invoice_id, "Change request recorded");
        Ok(())
    }

    /// Gets a change request by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ChangeRequest>> {
        let sql = format!("SELECT {} FROM change_requests WHERE id = ?1", COLUMNS);
        let row: Option<ChangeRequestRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ChangeRequest::try_from).transpose()
    }

    /// Lists every change request of an invoice, oldest first.
    pub async fn list_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<ChangeRequest>> {
        let sql = format!(
            "SELECT {} FROM change_requests WHERE invoice_id = ?1 ORDER BY created_at, id",
            COLUMNS
        );
        let rows: Vec<ChangeRequestRow> = sqlx::query_as(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ChangeRequest::try_from).collect()
    }

    /// Resolves a pending change request exactly once.
    ///
    /// ## Errors
    /// * `DbError::AlreadyResolved` - someone resolved it first
    /// * `DbError::NotFound` - no such change request
    pub async fn resolve(&self, id: &str, resolution: &Resolution<'_>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE change_requests SET
                status = ?2,
                resolved_by = ?3,
                admin_response = COALESCE(?4, admin_response),
                estimated_cost_change_cents = COALESCE(?5, estimated_cost_change_cents),
                resolved_at = ?6
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(resolution.status)
        .bind(resolution.resolved_by)
        .bind(resolution.admin_response)
        .bind(resolution.estimated_cost_change.map(|m| m.cents()))
        .bind(resolution.resolved_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<ChangeRequestStatus> =
                sqlx::query_scalar("SELECT status FROM change_requests WHERE id = ?1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;

            return Err(match current {
                Some(status) => {
                    warn!(id = %id, status = %status, "Change request already resolved");
                    DbError::AlreadyResolved {
                        entity: "change_request".to_string(),
                        id: id.to_string(),
                        status: status.to_string(),
                    }
                }
                None => DbError::not_found("change_request", id),
            });
        }

        debug!(id = %id, status = %resolution.status, by = %resolution.resolved_by, "Change request resolved");
        Ok(())
    }

    /// Records an admin reply without resolving the request.
    pub async fn set_admin_response(&self, id: &str, response: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE change_requests SET admin_response = ?2 WHERE id = ?1")
            .bind(id)
            .bind(response)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("change_request", id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{pending_change_request, seeded};
    use catering_core::test_fixtures::fixed_now;

    fn approval(by: &str) -> Resolution<'_> {
        Resolution {
            status: ChangeRequestStatus::Approved,
            resolved_by: by,
            admin_response: Some("Approved as requested"),
            estimated_cost_change: Some(Money::from_cents(12_500)),
            resolved_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let (db, _, invoice) = seeded().await;
        let repo = db.change_requests();
        let request = pending_change_request(&invoice.id, "cr-1");
        repo.insert(&request).await.unwrap();

        let loaded = repo.get_by_id("cr-1").await.unwrap().unwrap();
        assert_eq!(loaded, request);
        assert_eq!(repo.list_for_invoice(&invoice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_only_once() {
        let (db, _, invoice) = seeded().await;
        let repo = db.change_requests();
        repo.insert(&pending_change_request(&invoice.id, "cr-1"))
            .await
            .unwrap();

        repo.resolve("cr-1", &approval("admin-a")).await.unwrap();
        let err = repo.resolve("cr-1", &approval("admin-b")).await.unwrap_err();
        assert!(matches!(err, DbError::AlreadyResolved { .. }));

        let loaded = repo.get_by_id("cr-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, ChangeRequestStatus::Approved);
        assert_eq!(loaded.resolved_by.as_deref(), Some("admin-a"));
        assert_eq!(loaded.estimated_cost_change_cents, Some(12_500));
    }

    #[tokio::test]
    async fn test_resolve_missing_is_not_found() {
        let (db, _, _) = seeded().await;
        let err = db
            .change_requests()
            .resolve("missing", &approval("admin"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_resolved_request_rejects_direct_status_edit() {
        let (db, _, invoice) = seeded().await;
        let repo = db.change_requests();
        repo.insert(&pending_change_request(&invoice.id, "cr-1"))
            .await
            .unwrap();
        repo.resolve("cr-1", &approval("admin")).await.unwrap();

        let result = sqlx::query("UPDATE change_requests SET status = 'pending' WHERE id = 'cr-1'")
            .execute(db.pool())
            .await;
        assert!(result.is_err());

        // The reply stays editable.
        repo.set_admin_response("cr-1", "Updated note").await.unwrap();
        let loaded = repo.get_by_id("cr-1").await.unwrap().unwrap();
        assert_eq!(loaded.admin_response.as_deref(), Some("Updated note"));
        assert_eq!(loaded.status, ChangeRequestStatus::Approved);
    }
}
