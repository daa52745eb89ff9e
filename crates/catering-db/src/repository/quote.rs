//! # Quote Repository
//!
//! Database operations for quote requests and their planning line items.
//!
//! ## Optimistic Locking
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Versioned Update                                  │
//! │                                                                         │
//! │  Admin A reads quote (version 3)      Saga B reads quote (version 3)    │
//! │       │                                    │                            │
//! │       ▼                                    │                            │
//! │  UPDATE ... WHERE id = ? AND version = 3   │                            │
//! │  → 1 row, version becomes 4                │                            │
//! │                                            ▼                            │
//! │                       UPDATE ... WHERE id = ? AND version = 3           │
//! │                       → 0 rows → DbError::VersionConflict               │
//! │                       (quote left exactly as A wrote it)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Planning line items are not versioned: they are derived data and are
//! replaced wholesale every time they are regenerated.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use catering_core::menu::{CanonicalLineItem, LineItemKey};
use catering_core::patch::QuoteUpdates;
use catering_core::{
    Money, QuoteLineItem, QuoteRequest, QuoteStatus, QuoteWorkflowStatus, ServiceType,
};

const QUOTE_COLUMNS: &str = "id, contact_name, email, phone, company_name, event_name, \
     event_date, guest_count, location, service_type, menu_selections, status, \
     workflow_status, version, estimated_total_cents, last_status_change, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct QuoteRow {
    id: String,
    contact_name: String,
    email: Option<String>,
    phone: Option<String>,
    company_name: Option<String>,
    event_name: String,
    event_date: NaiveDate,
    guest_count: i64,
    location: String,
    service_type: ServiceType,
    menu_selections: String,
    status: QuoteStatus,
    workflow_status: QuoteWorkflowStatus,
    version: i64,
    estimated_total_cents: Option<i64>,
    last_status_change: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QuoteRow> for QuoteRequest {
    type Error = DbError;

    fn try_from(row: QuoteRow) -> DbResult<Self> {
        Ok(QuoteRequest {
            menu: serde_json::from_str(&row.menu_selections)?,
            id: row.id,
            contact_name: row.contact_name,
            email: row.email,
            phone: row.phone,
            company_name: row.company_name,
            event_name: row.event_name,
            event_date: row.event_date,
            guest_count: row.guest_count,
            location: row.location,
            service_type: row.service_type,
            status: row.status,
            workflow_status: row.workflow_status,
            version: row.version,
            estimated_total_cents: row.estimated_total_cents,
            last_status_change: row.last_status_change,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QuoteLineItemRow {
    id: String,
    quote_request_id: String,
    source_key: String,
    title: String,
    quantity: i64,
    unit_price_cents: i64,
    total_price_cents: i64,
    sort_order: i64,
}

impl From<QuoteLineItemRow> for QuoteLineItem {
    fn from(row: QuoteLineItemRow) -> Self {
        QuoteLineItem {
            id: row.id,
            quote_request_id: row.quote_request_id,
            source_key: LineItemKey::from_raw(row.source_key),
            title: row.title,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            total_price_cents: row.total_price_cents,
            sort_order: row.sort_order,
        }
    }
}

/// Repository for quote database operations.
#[derive(Debug, Clone)]
pub struct QuoteRepository {
    pool: SqlitePool,
}

impl QuoteRepository {
    /// Creates a new QuoteRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QuoteRepository { pool }
    }

    /// Gets a quote by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<QuoteRequest>> {
        let sql = format!("SELECT {} FROM quote_requests WHERE id = ?1", QUOTE_COLUMNS);
        let row: Option<QuoteRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(QuoteRequest::try_from).transpose()
    }

    /// Inserts a new quote.
    pub async fn insert(&self, quote: &QuoteRequest) -> DbResult<()> {
        debug!(id = %quote.id, event = %quote.event_name, "Inserting quote");

        let menu = serde_json::to_string(&quote.menu)?;
        sqlx::query(
            r#"
            INSERT INTO quote_requests (
                id, contact_name, email, phone, company_name,
                event_name, event_date, guest_count, location, service_type,
                menu_selections, status, workflow_status, version,
                estimated_total_cents, last_status_change, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18
            )
            "#,
        )
        .bind(&quote.id)
        .bind(&quote.contact_name)
        .bind(&quote.email)
        .bind(&quote.phone)
        .bind(&quote.company_name)
        .bind(&quote.event_name)
        .bind(quote.event_date)
        .bind(quote.guest_count)
        .bind(&quote.location)
        .bind(quote.service_type)
        .bind(menu)
        .bind(quote.status)
        .bind(quote.workflow_status)
        .bind(quote.version)
        .bind(quote.estimated_total_cents)
        .bind(quote.last_status_change)
        .bind(quote.created_at)
        .bind(quote.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Applies a partial update if the stored version still equals
    /// `expected_version`.
    ///
    /// ## Returns
    /// The new version (`expected_version + 1`).
    ///
    /// ## Errors
    /// * `DbError::VersionConflict` - another writer got there first; nothing
    ///   was written
    /// * `DbError::NotFound` - the quote does not exist
    pub async fn update_versioned(
        &self,
        id: &str,
        expected_version: i64,
        updates: &QuoteUpdates,
    ) -> DbResult<i64> {
        let menu = updates
            .menu
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE quote_requests SET
                event_name = COALESCE(?3, event_name),
                event_date = COALESCE(?4, event_date),
                guest_count = COALESCE(?5, guest_count),
                location = COALESCE(?6, location),
                service_type = COALESCE(?7, service_type),
                menu_selections = COALESCE(?8, menu_selections),
                status = ?9,
                workflow_status = ?10,
                last_status_change = ?11,
                version = version + 1,
                updated_at = ?12
            WHERE id = ?1 AND version = ?2
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(&updates.event_name)
        .bind(updates.event_date)
        .bind(updates.guest_count)
        .bind(&updates.location)
        .bind(updates.service_type)
        .bind(menu)
        .bind(updates.status)
        .bind(updates.workflow_status)
        .bind(updates.last_status_change)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.classify_miss(id, expected_version).await);
        }

        debug!(id = %id, version = expected_version + 1, "Quote updated");
        Ok(expected_version + 1)
    }

    /// Moves a quote to a new status under the optimistic lock.
    pub async fn update_status(
        &self,
        id: &str,
        expected_version: i64,
        status: QuoteStatus,
        workflow_status: QuoteWorkflowStatus,
    ) -> DbResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE quote_requests SET
                status = ?3,
                workflow_status = ?4,
                last_status_change = ?5,
                version = version + 1,
                updated_at = ?5
            WHERE id = ?1 AND version = ?2
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(status)
        .bind(workflow_status)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.classify_miss(id, expected_version).await);
        }

        Ok(expected_version + 1)
    }

    /// Distinguishes a lost optimistic lock from a missing row.
    async fn classify_miss(&self, id: &str, expected_version: i64) -> DbError {
        let current: Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT version FROM quote_requests WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(Some(actual)) => {
                warn!(
                    id = %id,
                    expected_version,
                    actual_version = actual,
                    "Optimistic lock conflict on quote"
                );
                DbError::version_conflict("quote_request", id, expected_version)
            }
            Ok(None) => DbError::not_found("quote_request", id),
            Err(e) => e.into(),
        }
    }

    // =========================================================================
    // Planning Line Items
    // =========================================================================

    /// Replaces every planning item of a quote and stores their sum as the
    /// quote's estimated total.
    pub async fn replace_line_items(
        &self,
        quote_id: &str,
        items: &[CanonicalLineItem],
    ) -> DbResult<Money> {
        let now = Utc::now();
        let total: Money = items.iter().map(CanonicalLineItem::total_price).sum();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM quote_line_items WHERE quote_request_id = ?1")
            .bind(quote_id)
            .execute(&mut *tx)
            .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO quote_line_items (
                    id, quote_request_id, source_key, title,
                    quantity, unit_price_cents, total_price_cents, sort_order, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(quote_id)
            .bind(item.key.as_str())
            .bind(&item.title)
            .bind(item.quantity)
            .bind(item.unit_price.cents())
            .bind(item.total_price().cents())
            .bind(item.sort_order)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let result = sqlx::query(
            "UPDATE quote_requests SET estimated_total_cents = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(quote_id)
        .bind(total.cents())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("quote_request", quote_id));
        }

        tx.commit().await?;

        debug!(quote_id = %quote_id, items = items.len(), total = %total, "Planning items replaced");
        Ok(total)
    }

    /// Gets the planning items of a quote in display order.
    pub async fn get_line_items(&self, quote_id: &str) -> DbResult<Vec<QuoteLineItem>> {
        let rows: Vec<QuoteLineItemRow> = sqlx::query_as(
            r#"
            SELECT id, quote_request_id, source_key, title,
                   quantity, unit_price_cents, total_price_cents, sort_order
            FROM quote_line_items
            WHERE quote_request_id = ?1
            ORDER BY sort_order, title
            "#,
        )
        .bind(quote_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(QuoteLineItem::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
