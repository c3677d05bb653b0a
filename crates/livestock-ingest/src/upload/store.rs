//! Destination store interface

use async_trait::async_trait;
use chrono::NaiveDate;
use livestock_common::{Dataset, ObservationRow, StoredObservation};

use crate::error::{Result, UploadError};

/// What an upsert did to one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// No row had this natural key; `created_at == updated_at`
    Inserted,
    /// An existing row was replaced and `updated_at` refreshed
    Updated,
}

/// Per-row outcomes of one batch, in input order
pub type BatchOutcome = Vec<std::result::Result<RowOutcome, UploadError>>;

/// Upsert-by-natural-key storage for the four datasets
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Upsert a batch of rows that share a dataset.
    ///
    /// Rows are independent: a rejected row must not roll back its siblings.
    /// `Err` means the batch as a whole could not be attempted and none of it
    /// was written.
    async fn upsert_batch(
        &self,
        dataset: Dataset,
        rows: &[ObservationRow],
    ) -> std::result::Result<BatchOutcome, UploadError>;

    /// Stored rows with `start <= slaughter_date <= end`, ordered by date
    async fn fetch_range(
        &self,
        dataset: Dataset,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StoredObservation>>;

    /// Number of stored rows in a dataset
    async fn count(&self, dataset: Dataset) -> Result<u64>;
}
