//! # Invoice Repository
//!
//! Database operations for invoices and their billable line items.
//!
//! ## Totals Are Derived
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every write that touches line items, the discount or the manual        │
//! │  overrides ends with a recompute inside the same transaction:           │
//! │                                                                         │
//! │   subtotal_cents     = SUM(invoice_line_items.total_price_cents)        │
//! │   discount_cents     = min(discount, subtotal)                          │
//! │   tax_amount_cents   = (subtotal - discount) × rate, 0 for government   │
//! │   total_amount_cents = (subtotal - discount) + tax                      │
//! │                                                                         │
//! │  The stored header therefore never disagrees with its items.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Datelike, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use catering_core::menu::{CanonicalLineItem, LineItemKey};
use catering_core::reconcile::ReconciliationPlan;
use catering_core::tax::{Discount, TaxBreakdown, TaxCalculationService};
use catering_core::{Invoice, InvoiceLineItem, InvoiceStatus, ManualOverrides, Money};

const INVOICE_COLUMNS: &str = "id, quote_request_id, invoice_number, status, workflow_status, \
     subtotal_cents, discount_type, discount_value, discount_cents, tax_amount_cents, \
     total_amount_cents, manual_overrides, customer_access_token, token_expires_at, \
     created_at, updated_at";

const LINE_ITEM_COLUMNS: &str = "id, invoice_id, source_key, title, description, quantity, \
     unit_price_cents, total_price_cents, is_override, sort_order, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    quote_request_id: String,
    invoice_number: String,
    status: InvoiceStatus,
    workflow_status: InvoiceStatus,
    subtotal_cents: i64,
    discount_type: Option<String>,
    discount_value: Option<i64>,
    discount_cents: i64,
    tax_amount_cents: i64,
    total_amount_cents: i64,
    manual_overrides: String,
    customer_access_token: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DbError;

    fn try_from(row: InvoiceRow) -> DbResult<Self> {
        Ok(Invoice {
            discount: Discount::from_columns(row.discount_type.as_deref(), row.discount_value)?,
            manual_overrides: serde_json::from_str(&row.manual_overrides)?,
            id: row.id,
            quote_request_id: row.quote_request_id,
            invoice_number: row.invoice_number,
            status: row.status,
            workflow_status: row.workflow_status,
            subtotal_cents: row.subtotal_cents,
            discount_cents: row.discount_cents,
            tax_amount_cents: row.tax_amount_cents,
            total_amount_cents: row.total_amount_cents,
            customer_access_token: row.customer_access_token,
            token_expires_at: row.token_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    id: String,
    invoice_id: String,
    source_key: Option<String>,
    title: String,
    description: Option<String>,
    quantity: i64,
    unit_price_cents: i64,
    total_price_cents: i64,
    is_override: bool,
    sort_order: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LineItemRow> for InvoiceLineItem {
    fn from(row: LineItemRow) -> Self {
        InvoiceLineItem {
            id: row.id,
            invoice_id: row.invoice_id,
            source_key: row.source_key.map(LineItemKey::from_raw),
            title: row.title,
            description: row.description,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            total_price_cents: row.total_price_cents,
            is_override: row.is_override,
            sort_order: row.sort_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A line item added by hand rather than generated from the menu.
#[derive(Debug, Clone)]
pub struct CustomLineItem {
    pub title: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Repository for invoice database operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets an invoice by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        self.fetch_one_where("id", id).await
    }

    /// Gets the invoice generated for a quote.
    pub async fn get_by_quote(&self, quote_id: &str) -> DbResult<Option<Invoice>> {
        self.fetch_one_where("quote_request_id", quote_id).await
    }

    /// Finds the invoice a customer portal token opens.
    ///
    /// Returns `None` for unknown tokens and for expired ones alike, so a
    /// caller cannot tell which happened.
    pub async fn find_by_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Invoice>> {
        let invoice = self.fetch_one_where("customer_access_token", token).await?;

        Ok(invoice.filter(|invoice| {
            let valid = invoice.token_is_valid(token, now);
            if !valid {
                debug!(invoice_id = %invoice.id, "Access token expired");
            }
            valid
        }))
    }

    async fn fetch_one_where(&self, column: &str, value: &str) -> DbResult<Option<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE {} = ?1",
            INVOICE_COLUMNS, column
        );
        let row: Option<InvoiceRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Invoice::try_from).transpose()
    }

    /// Gets the line items of an invoice in display order.
    pub async fn get_line_items(&self, invoice_id: &str) -> DbResult<Vec<InvoiceLineItem>> {
        let sql = format!(
            "SELECT {} FROM invoice_line_items WHERE invoice_id = ?1 ORDER BY sort_order, created_at",
            LINE_ITEM_COLUMNS
        );
        let rows: Vec<LineItemRow> = sqlx::query_as(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(InvoiceLineItem::from).collect())
    }

    /// Next sequential invoice number for `now`'s year: `INV-YYYY-NNNNN`.
    pub async fn next_invoice_number(&self, now: DateTime<Utc>) -> DbResult<String> {
        let prefix = format!("INV-{}-", now.year());
        let last: Option<String> = sqlx::query_scalar(
            "SELECT invoice_number FROM invoices WHERE invoice_number LIKE ?1 \
             ORDER BY invoice_number DESC LIMIT 1",
        )
        .bind(format!("{}%", prefix))
        .fetch_optional(&self.pool)
        .await?;

        let next = last
            .as_deref()
            .and_then(|n| n.strip_prefix(&prefix))
            .and_then(|n| n.parse::<u32>().ok())
            .map_or(1, |n| n + 1);

        Ok(format!("{}{:05}", prefix, next))
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Inserts an invoice with its generated line items, then computes its
    /// totals.
    ///
    /// The header totals on `invoice` are ignored; they are always derived
    /// from the items.
    pub async fn create_with_items(
        &self,
        invoice: &Invoice,
        items: &[CanonicalLineItem],
        tax: &TaxCalculationService,
    ) -> DbResult<TaxBreakdown> {
        info!(
            invoice_id = %invoice.id,
            number = %invoice.invoice_number,
            items = items.len(),
            "Creating invoice"
        );

        let (discount_type, discount_value) = match invoice.discount.as_ref().map(Discount::to_columns) {
            Some((kind, value)) => (Some(kind), Some(value)),
            None => (None, None),
        };
        let overrides = serde_json::to_string(&invoice.manual_overrides)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, quote_request_id, invoice_number, status, workflow_status,
                discount_type, discount_value, manual_overrides,
                customer_access_token, token_expires_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.quote_request_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.status)
        .bind(invoice.workflow_status)
        .bind(discount_type)
        .bind(discount_value)
        .bind(overrides)
        .bind(&invoice.customer_access_token)
        .bind(invoice.token_expires_at)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            insert_generated(&mut *tx, &invoice.id, item, item.sort_order).await?;
        }

        let totals = recompute_in(&mut *tx, &invoice.id, tax).await?;
        tx.commit().await?;

        Ok(totals)
    }

    /// Adds a custom (hand-entered) line item after the existing ones.
    pub async fn insert_line_item(
        &self,
        invoice_id: &str,
        item: &CustomLineItem,
        tax: &TaxCalculationService,
    ) -> DbResult<InvoiceLineItem> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;
        let sort_order = next_sort_order(&mut *tx, invoice_id).await?;
        let total = item.unit_price.multiply_quantity(item.quantity);

        sqlx::query(
            r#"
            INSERT INTO invoice_line_items (
                id, invoice_id, source_key, title, description, quantity,
                unit_price_cents, total_price_cents, is_override, sort_order,
                created_at, updated_at
            ) VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?9)
            "#,
        )
        .bind(&id)
        .bind(invoice_id)
        .bind(item.title.trim())
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price.cents())
        .bind(total.cents())
        .bind(sort_order)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        recompute_in(&mut *tx, invoice_id, tax).await?;
        tx.commit().await?;

        debug!(invoice_id = %invoice_id, item_id = %id, title = %item.title, "Custom line item added");

        Ok(InvoiceLineItem {
            id,
            invoice_id: invoice_id.to_string(),
            source_key: None,
            title: item.title.trim().to_string(),
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            total_price_cents: total.cents(),
            is_override: false,
            sort_order,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sets a manual price on a line item and flags it as overridden so the
    /// price survives later regeneration.
    pub async fn override_line_item_price(
        &self,
        item_id: &str,
        unit_price: Money,
        tax: &TaxCalculationService,
    ) -> DbResult<TaxBreakdown> {
        let mut tx = self.pool.begin().await?;

        let invoice_id: Option<String> =
            sqlx::query_scalar("SELECT invoice_id FROM invoice_line_items WHERE id = ?1")
                .bind(item_id)
                .fetch_optional(&mut *tx)
                .await?;
        let invoice_id = invoice_id.ok_or_else(|| DbError::not_found("invoice_line_item", item_id))?;

        sqlx::query(
            r#"
            UPDATE invoice_line_items SET
                unit_price_cents = ?2,
                total_price_cents = quantity * ?2,
                is_override = 1,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .bind(unit_price.cents())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let totals = recompute_in(&mut *tx, &invoice_id, tax).await?;
        tx.commit().await?;

        info!(item_id = %item_id, price = %unit_price, "Line item price overridden");
        Ok(totals)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Applies a reconciliation plan and recomputes totals, all in one
    /// transaction.
    ///
    /// ## Write Order
    /// 1. Deletes (explicit removals)
    /// 2. Updates (matched items: quantity, price, adopted key)
    /// 3. Inserts (new canonical items, after the current last item)
    /// 4. Header recompute from `SUM(total_price_cents)`
    pub async fn apply_reconciliation(
        &self,
        invoice_id: &str,
        plan: &ReconciliationPlan,
        tax: &TaxCalculationService,
    ) -> DbResult<TaxBreakdown> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for item in &plan.deletes {
            sqlx::query("DELETE FROM invoice_line_items WHERE id = ?1 AND invoice_id = ?2")
                .bind(&item.id)
                .bind(invoice_id)
                .execute(&mut *tx)
                .await?;
        }

        for update in &plan.updates {
            sqlx::query(
                r#"
                UPDATE invoice_line_items SET
                    title = ?3,
                    source_key = ?4,
                    quantity = ?5,
                    unit_price_cents = ?6,
                    total_price_cents = ?7,
                    is_override = MAX(is_override, ?8),
                    updated_at = ?9
                WHERE id = ?1 AND invoice_id = ?2
                "#,
            )
            .bind(&update.id)
            .bind(invoice_id)
            .bind(&update.title)
            .bind(update.source_key.as_str())
            .bind(update.quantity)
            .bind(update.unit_price.cents())
            .bind(update.total_price().cents())
            .bind(update.price_preserved)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let base = next_sort_order(&mut *tx, invoice_id).await?;
        for (offset, item) in plan.inserts.iter().enumerate() {
            insert_generated(&mut *tx, invoice_id, item, base + offset as i64).await?;
        }

        let totals = recompute_in(&mut *tx, invoice_id, tax).await?;
        tx.commit().await?;

        info!(
            invoice_id = %invoice_id,
            deleted = plan.deletes.len(),
            updated = plan.updates.len(),
            inserted = plan.inserts.len(),
            total = %totals.total,
            "Reconciliation applied"
        );

        Ok(totals)
    }

    /// Recomputes the header totals from the stored items.
    pub async fn recompute_totals(
        &self,
        invoice_id: &str,
        tax: &TaxCalculationService,
    ) -> DbResult<TaxBreakdown> {
        let mut tx = self.pool.begin().await?;
        let totals = recompute_in(&mut *tx, invoice_id, tax).await?;
        tx.commit().await?;
        Ok(totals)
    }

    // =========================================================================
    // Header Updates
    // =========================================================================

    /// Sets both `status` and `workflow_status`.
    pub async fn set_status(&self, invoice_id: &str, status: InvoiceStatus) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE invoices SET status = ?2, workflow_status = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(invoice_id)
        .bind(status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("invoice", invoice_id));
        }
        Ok(())
    }

    /// Replaces the customer access token and its expiry.
    pub async fn rotate_token(
        &self,
        invoice_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                customer_access_token = ?2,
                token_expires_at = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(invoice_id)
        .bind(token)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("invoice", invoice_id));
        }

        debug!(invoice_id = %invoice_id, expires_at = %expires_at, "Access token rotated");
        Ok(())
    }

    /// Sets or clears the invoice discount and recomputes totals.
    pub async fn set_discount(
        &self,
        invoice_id: &str,
        discount: Option<Discount>,
        tax: &TaxCalculationService,
    ) -> DbResult<TaxBreakdown> {
        let (kind, value) = match discount.as_ref().map(Discount::to_columns) {
            Some((kind, value)) => (Some(kind), Some(value)),
            None => (None, None),
        };

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE invoices SET discount_type = ?2, discount_value = ?3 WHERE id = ?1",
        )
        .bind(invoice_id)
        .bind(kind)
        .bind(value)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("invoice", invoice_id));
        }

        let totals = recompute_in(&mut *tx, invoice_id, tax).await?;
        tx.commit().await?;
        Ok(totals)
    }

    /// Stores admin overrides and recomputes totals (a government flag
    /// changes the tax).
    pub async fn set_manual_overrides(
        &self,
        invoice_id: &str,
        overrides: &ManualOverrides,
        tax: &TaxCalculationService,
    ) -> DbResult<TaxBreakdown> {
        let json = serde_json::to_string(overrides)?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE invoices SET manual_overrides = ?2 WHERE id = ?1")
            .bind(invoice_id)
            .bind(json)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("invoice", invoice_id));
        }

        let totals = recompute_in(&mut *tx, invoice_id, tax).await?;
        tx.commit().await?;
        Ok(totals)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn next_sort_order(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<i64> {
    let max: Option<i64> =
        sqlx::query_scalar("SELECT MAX(sort_order) FROM invoice_line_items WHERE invoice_id = ?1")
            .bind(invoice_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(max.map_or(0, |m| m + 1))
}

async fn insert_generated(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    item: &CanonicalLineItem,
    sort_order: i64,
) -> DbResult<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO invoice_line_items (
            id, invoice_id, source_key, title, description, quantity,
            unit_price_cents, total_price_cents, is_override, sort_order,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?10)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(invoice_id)
    .bind(item.key.as_str())
    .bind(&item.title)
    .bind(&item.description)
    .bind(item.quantity)
    .bind(item.unit_price.cents())
    .bind(item.total_price().cents())
    .bind(sort_order)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn recompute_in(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    tax: &TaxCalculationService,
) -> DbResult<TaxBreakdown> {
    let header: Option<(Option<String>, Option<i64>, String)> = sqlx::query_as(
        "SELECT discount_type, discount_value, manual_overrides FROM invoices WHERE id = ?1",
    )
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?;
    let (kind, value, overrides) =
        header.ok_or_else(|| DbError::not_found("invoice", invoice_id))?;

    let discount = Discount::from_columns(kind.as_deref(), value)?;
    let overrides: ManualOverrides = serde_json::from_str(&overrides)?;

    let subtotal: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total_price_cents), 0) FROM invoice_line_items WHERE invoice_id = ?1",
    )
    .bind(invoice_id)
    .fetch_one(&mut *conn)
    .await?;

    let totals = tax.calculate(
        Money::from_cents(subtotal),
        discount.as_ref(),
        overrides.is_government(),
    );

    sqlx::query(
        r#"
        UPDATE invoices SET
            subtotal_cents = ?2,
            discount_cents = ?3,
            tax_amount_cents = ?4,
            total_amount_cents = ?5,
            updated_at = ?6
        WHERE id = ?1
        "#,
    )
    .bind(invoice_id)
    .bind(totals.subtotal.cents())
    .bind(totals.discount.cents())
    .bind(totals.tax.cents())
    .bind(totals.total.cents())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(totals)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::seeded;
    use catering_core::menu::{generate_line_items, PriceBook};
    use catering_core::patch::{apply_changes, removals, RequestedChanges};
    use catering_core::reconcile::plan_reconciliation;
    use catering_core::test_fixtures::{fixed_now, sample_invoice};

    fn tax() -> TaxCalculationService {
        TaxCalculationService::default()
    }

    #[tokio::test]
    async fn test_totals_match_items_after_creation() {
        let (db, quote, invoice) = seeded().await;
        let repo = db.invoices();

        let items = repo.get_line_items(&invoice.id).await.unwrap();
        let expected: Money = generate_line_items(&quote, &PriceBook::default())
            .iter()
            .map(CanonicalLineItem::total_price)
            .sum();
        let stored: Money = items.iter().map(InvoiceLineItem::total_price).sum();
        assert_eq!(stored, expected);

        let loaded = repo.get_by_id(&invoice.id).await.unwrap().unwrap();
        assert_eq!(loaded.subtotal(), expected);
        assert_eq!(
            loaded.total_amount_cents,
            loaded.subtotal_cents - loaded.discount_cents + loaded.tax_amount_cents
        );
        assert_eq!(repo.get_by_quote(&quote.id).await.unwrap().unwrap().id, invoice.id);
    }

    #[tokio::test]
    async fn test_access_token_lookup_respects_expiry() {
        let (db, _, invoice) = seeded().await;
        let repo = db.invoices();
        let token = invoice.customer_access_token.clone().unwrap();

        let found = repo.find_by_access_token(&token, fixed_now()).await.unwrap();
        assert_eq!(found.map(|i| i.id), Some(invoice.id.clone()));

        let later = fixed_now() + chrono::Duration::days(91);
        assert!(repo.find_by_access_token(&token, later).await.unwrap().is_none());
        assert!(repo.find_by_access_token("nope", fixed_now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_token_invalidates_old_token() {
        let (db, _, invoice) = seeded().await;
        let repo = db.invoices();
        let expires = fixed_now() + chrono::Duration::days(90);

        repo.rotate_token(&invoice.id, "token-2", expires).await.unwrap();
        assert!(repo.find_by_access_token("token-1", fixed_now()).await.unwrap().is_none());
        assert!(repo.find_by_access_token("token-2", fixed_now()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_custom_item_lands_after_generated_items() {
        let (db, _, invoice) = seeded().await;
        let repo = db.invoices();
        let before = repo.get_line_items(&invoice.id).await.unwrap();

        let cake = CustomLineItem {
            title: "Custom Cake".to_string(),
            description: None,
            quantity: 1,
            unit_price: Money::from_dollars(200),
        };
        let item = repo.insert_line_item(&invoice.id, &cake, &tax()).await.unwrap();
        assert!(item.source_key.is_none());
        assert!(before.iter().all(|b| b.sort_order < item.sort_order));

        let loaded = repo.get_by_id(&invoice.id).await.unwrap().unwrap();
        let before_total: Money = before.iter().map(InvoiceLineItem::total_price).sum();
        assert_eq!(loaded.subtotal(), before_total + Money::from_dollars(200));
    }

    #[tokio::test]
    async fn test_reconciliation_keeps_override_and_totals_consistent() {
        let (db, quote, invoice) = seeded().await;
        let repo = db.invoices();
        let book = PriceBook::default();

        let persisted = repo.get_line_items(&invoice.id).await.unwrap();
        let chicken = persisted
            .iter()
            .find(|i| i.title == "Fried Chicken")
            .unwrap()
            .clone();
        let overridden = repo
            .override_line_item_price(&chicken.id, Money::from_cents(999), &tax())
            .await
            .unwrap();
        let stored = repo.get_by_id(&invoice.id).await.unwrap().unwrap();
        assert_eq!(overridden.total, stored.total());
        assert_eq!(overridden.subtotal, stored.subtotal());

        let patch = RequestedChanges {
            guest_count: Some(150),
            ..Default::default()
        };
        let next = apply_changes(&quote, &patch, Utc::now()).apply_to(&quote);
        let persisted = repo.get_line_items(&invoice.id).await.unwrap();
        let plan = plan_reconciliation(
            &persisted,
            &generate_line_items(&next, &book),
            &generate_line_items(&quote, &book),
            &removals(&quote, &patch),
        );

        let totals = repo.apply_reconciliation(&invoice.id, &plan, &tax()).await.unwrap();

        let items = repo.get_line_items(&invoice.id).await.unwrap();
        let chicken = items.iter().find(|i| i.id == chicken.id).unwrap();
        assert_eq!(chicken.unit_price_cents, 999);
        assert_eq!(chicken.quantity, 150);
        assert!(chicken.is_override);

        let sum: Money = items.iter().map(InvoiceLineItem::total_price).sum();
        assert_eq!(totals.subtotal, sum);
        assert_eq!(totals.subtotal, plan.resulting_subtotal(&persisted));

        // Same inputs again: nothing left to do.
        let again = plan_reconciliation(
            &items,
            &generate_line_items(&next, &book),
            &generate_line_items(&quote, &book),
            &removals(&quote, &patch),
        );
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_government_override_zeroes_tax() {
        let (db, _, invoice) = seeded().await;
        let repo = db.invoices();

        let overrides = ManualOverrides {
            is_government_contract: Some(true),
            deposit_required: None,
        };
        let totals = repo
            .set_manual_overrides(&invoice.id, &overrides, &tax())
            .await
            .unwrap();
        assert!(totals.tax.is_zero());
        assert_eq!(totals.total, totals.subtotal);

        let loaded = repo.get_by_id(&invoice.id).await.unwrap().unwrap();
        assert!(loaded.manual_overrides.is_government());
    }

    #[tokio::test]
    async fn test_fixed_discount_capped_at_subtotal() {
        let (db, _, invoice) = seeded().await;
        let repo = db.invoices();

        let totals = repo
            .set_discount(&invoice.id, Some(Discount::Fixed { cents: i64::MAX / 2 }), &tax())
            .await
            .unwrap();
        assert_eq!(totals.discount, totals.subtotal);
        assert!(totals.total.is_zero());

        let loaded = repo.get_by_id(&invoice.id).await.unwrap().unwrap();
        assert!(matches!(loaded.discount, Some(Discount::Fixed { .. })));
    }

    #[tokio::test]
    async fn test_next_invoice_number_increments() {
        let (db, _, _) = seeded().await;
        let number = db.invoices().next_invoice_number(fixed_now()).await.unwrap();
        assert_eq!(number, "INV-2030-00002");

        let next_year = fixed_now() + chrono::Duration::days(366);
        let number = db.invoices().next_invoice_number(next_year).await.unwrap();
        assert_eq!(number, "INV-2031-00001");
    }

    #[tokio::test]
    async fn test_duplicate_invoice_for_quote_rejected() {
        let (db, _, _) = seeded().await;
        let mut duplicate = sample_invoice();
        duplicate.id = "invoice-2".to_string();
        duplicate.invoice_number = "INV-2030-00002".to_string();
        duplicate.customer_access_token = Some("token-2".to_string());

        let err = db
            .invoices()
            .create_with_items(&duplicate, &[], &tax())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
