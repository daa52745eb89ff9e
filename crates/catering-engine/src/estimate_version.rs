//! # Estimate Versions
//!
//! Immutable snapshots of an invoice and its line items, taken before an
//! approval rewrites them. Version numbers start at 1 and increase by one
//! per invoice; the unique index on `(invoice_id, version_number)` turns a
//! racing duplicate into an error instead of a silent overwrite.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use catering_core::{EstimateSnapshot, EstimateVersion};
use catering_db::Database;

#[derive(Debug, Clone)]
pub struct EstimateVersionService {
    db: Database,
}

impl EstimateVersionService {
    pub fn new(db: Database) -> Self {
        EstimateVersionService { db }
    }

    /// Freezes the current state of `invoice_id` as the next version.
    pub async fn create_snapshot(
        &self,
        invoice_id: &str,
        change_request_id: Option<&str>,
        created_by: &str,
    ) -> EngineResult<EstimateVersion> {
        let invoice = self
            .db
            .invoices()
            .get_by_id(invoice_id)
            .await?
            .ok_or_else(|| EngineError::not_found("invoice", invoice_id))?;
        let line_items = self.db.invoices().get_line_items(invoice_id).await?;

        let versions = self.db.estimate_versions();
        let version = EstimateVersion {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice_id.to_string(),
            change_request_id: change_request_id.map(str::to_string),
            version_number: versions.max_version_number(invoice_id).await? + 1,
            snapshot: EstimateSnapshot {
                invoice,
                line_items,
            },
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        versions.insert(&version).await?;

        info!(
            invoice_id = %invoice_id,
            version = version.version_number,
            items = version.snapshot.line_items.len(),
            "Estimate snapshot created"
        );
        Ok(version)
    }

    /// All versions of an invoice, oldest first.
    pub async fn list_versions(&self, invoice_id: &str) -> EngineResult<Vec<EstimateVersion>> {
        Ok(self.db.estimate_versions().list(invoice_id).await?)
    }

    pub async fn get_version(
        &self,
        invoice_id: &str,
        version_number: i64,
    ) -> EngineResult<EstimateVersion> {
        self.db
            .estimate_versions()
            .get(invoice_id, version_number)
            .await?
            .ok_or_else(|| {
                EngineError::not_found("estimate_version", format!("{}#{}", invoice_id, version_number))
            })
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{cake, seeded_engine};
    use catering_core::patch::RequestedChanges;

    #[tokio::test]
    async fn test_snapshots_number_sequentially_and_freeze_state() {
        let (engine, _, invoice) = seeded_engine().await;
        let versions = engine.estimate_versions();

        let v1 = versions.create_snapshot(&invoice.id, None, "admin").await.unwrap();
        assert_eq!(v1.version_number, 1);
        assert_eq!(v1.snapshot.invoice.total(), invoice.total());

        engine
            .database()
            .invoices()
            .insert_line_item(&invoice.id, &cake(), engine.tax())
            .await
            .unwrap();

        // a snapshot may only reference a stored change request
        let request = engine
            .processor()
            .submit(
                &invoice.id,
                RequestedChanges {
                    guest_count: Some(120),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        let v2 = versions
            .create_snapshot(&invoice.id, Some(&request.id), "admin")
            .await
            .unwrap();
        assert_eq!(v2.version_number, 2);
        assert_eq!(v2.change_request_id.as_deref(), Some(request.id.as_str()));
        assert_eq!(v2.snapshot.line_items.len(), v1.snapshot.line_items.len() + 1);

        // the first snapshot is unchanged by later writes
        let reread = versions.get_version(&invoice.id, 1).await.unwrap();
        assert_eq!(reread.snapshot, v1.snapshot);
        assert_eq!(versions.list_versions(&invoice.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_invoice_and_version() {
        let (engine, _, invoice) = seeded_engine().await;
        let versions = engine.estimate_versions();

        let err = versions.create_snapshot("nope", None, "admin").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let err = versions.get_version(&invoice.id, 7).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        // unknown change request trips the foreign key
        let err = versions
            .create_snapshot(&invoice.id, Some("cr-unknown"), "admin")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PERSISTENCE_ERROR");
        assert!(versions.list_versions(&invoice.id).await.unwrap().is_empty());
    }
}
