//! # Estimate Version Repository
//!
//! Immutable snapshots of an invoice taken before destructive updates.
//! Rows are append-only (triggers refuse UPDATE and DELETE) and
//! `(invoice_id, version_number)` is unique, so two racing snapshots cannot
//! both claim the same number.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use catering_core::EstimateVersion;

const COLUMNS: &str =
    "id, invoice_id, change_request_id, version_number, snapshot, created_by, created_at";

#[derive(Debug, sqlx::FromRow)]
struct EstimateVersionRow {
    id: String,
    invoice_id: String,
    change_request_id: Option<String>,
    version_number: i64,
    snapshot: String,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<EstimateVersionRow> for EstimateVersion {
    type Error = DbError;

    fn try_from(row: EstimateVersionRow) -> DbResult<Self> {
        Ok(EstimateVersion {
            snapshot: serde_json::from_str(&row.snapshot)?,
            id: row.id,
            invoice_id: row.invoice_id,
            change_request_id: row.change_request_id,
            version_number: row.version_number,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// Repository for estimate snapshots.
#[derive(Debug, Clone)]
pub struct EstimateVersionRepository {
    pool: SqlitePool,
}

impl EstimateVersionRepository {
    /// Creates a new EstimateVersionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EstimateVersionRepository { pool }
    }

    /// Highest version number stored for an invoice (0 when none).
    pub async fn max_version_number(&self, invoice_id: &str) -> DbResult<i64> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version_number) FROM estimate_versions WHERE invoice_id = ?1",
        )
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(max.unwrap_or(0))
    }

    /// Appends a snapshot.
    ///
    /// ## Errors
    /// * `DbError::UniqueViolation` - the version number is already taken
    pub async fn insert(&self, version: &EstimateVersion) -> DbResult<()> {
        let snapshot = serde_json::to_string(&version.snapshot)?;

        sqlx::query(
            r#"
            INSERT INTO estimate_versions (
                id, invoice_id, change_request_id, version_number,
                snapshot, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&version.id)
        .bind(&version.invoice_id)
        .bind(&version.change_request_id)
        .bind(version.version_number)
        .bind(snapshot)
        .bind(&version.created_by)
        .bind(version.created_at)
        .execute(&self.pool)
        .await?;

        debug!(
            invoice_id = %version.invoice_id,
            version = version.version_number,
            "Estimate snapshot stored"
        );
        Ok(())
    }

    /// Lists the versions of an invoice, oldest first.
    pub async fn list(&self, invoice_id: &str) -> DbResult<Vec<EstimateVersion>> {
        let sql = format!(
            "SELECT {} FROM estimate_versions WHERE invoice_id = ?1 ORDER BY version_number",
            COLUMNS
        );
        let rows: Vec<EstimateVersionRow> = sqlx::query_as(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(EstimateVersion::try_from).collect()
    }

    /// Gets one version of an invoice.
    pub async fn get(
        &self,
        invoice_id: &str,
        version_number: i64,
    ) -> DbResult<Option<EstimateVersion>> {
        let sql = format!(
            "SELECT {} FROM estimate_versions WHERE invoice_id = ?1 AND version_number = ?2",
            COLUMNS
        );
        let row: Option<EstimateVersionRow> = sqlx::query_as(&sql)
            .bind(invoice_id)
            .bind(version_number)
            .fetch_optional(&self.pool)
            .await?;

        row.map(EstimateVersion::try_from).transpose()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::seeded;
    use catering_core::test_fixtures::fixed_now;
    use catering_core::EstimateSnapshot;

    fn version(invoice: &catering_core::Invoice, number: i64) -> EstimateVersion {
        EstimateVersion {
            id: format!("version-{}", number),
            invoice_id: invoice.id.clone(),
            change_request_id: None,
            version_number: number,
            snapshot: EstimateSnapshot {
                invoice: invoice.clone(),
                line_items: Vec::new(),
            },
            created_by: "admin".to_string(),
            created_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn test_versions_are_numbered_and_listed_in_order() {
        let (db, _, invoice) = seeded().await;
        let repo = db.estimate_versions();
        assert_eq!(repo.max_version_number(&invoice.id).await.unwrap(), 0);

        repo.insert(&version(&invoice, 1)).await.unwrap();
        repo.insert(&version(&invoice, 2)).await.unwrap();
        assert_eq!(repo.max_version_number(&invoice.id).await.unwrap(), 2);

        let listed = repo.list(&invoice.id).await.unwrap();
        let numbers: Vec<i64> = listed.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2]);

        let first = repo.get(&invoice.id, 1).await.unwrap().unwrap();
        assert_eq!(first.snapshot.invoice, invoice);
    }

    #[tokio::test]
    async fn test_duplicate_version_number_rejected() {
        let (db, _, invoice) = seeded().await;
        let repo = db.estimate_versions();
        repo.insert(&version(&invoice, 1)).await.unwrap();

        let mut again = version(&invoice, 1);
        again.id = "version-1b".to_string();
        let err = repo.insert(&again).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_versions_are_append_only() {
        let (db, _, invoice) = seeded().await;
        db.estimate_versions()
            .insert(&version(&invoice, 1))
            .await
            .unwrap();

        let update = sqlx::query("UPDATE estimate_versions SET created_by = 'x'")
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM estimate_versions")
            .execute(db.pool())
            .await;
        assert!(delete.is_err());
    }
}
