//! Upload Coordinator
//!
//! De-duplicates rows by natural key, splits them into bounded batches, and
//! upserts each batch through an [`ObservationStore`]. Every row that is not
//! persisted is reported individually.

pub mod memory;
pub mod postgres;
pub mod store;

use livestock_common::{Dataset, NaturalKey, ObservationRow};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::UploadError;

pub use memory::MemoryObservationStore;
pub use postgres::PgObservationStore;
pub use store::{ObservationStore, RowOutcome};

/// A row that was not persisted, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    pub key: NaturalKey,
    #[serde(serialize_with = "serialize_display")]
    pub error: UploadError,
}

/// Result of uploading one dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReport {
    pub dataset: Dataset,
    /// Rows handed to the coordinator
    pub submitted: usize,
    /// Rows folded into a later row with the same natural key
    pub duplicates_collapsed: usize,
    /// Collapsed rows whose values differed from the row that replaced them
    pub conflicting_duplicates: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failures: Vec<RowFailure>,
    pub batches: usize,
}

impl UploadReport {
    fn new(dataset: Dataset, submitted: usize) -> Self {
        Self {
            dataset,
            submitted,
            duplicates_collapsed: 0,
            conflicting_duplicates: 0,
            inserted: 0,
            updated: 0,
            failures: Vec::new(),
            batches: 0,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn persisted(&self) -> usize {
        self.inserted + self.updated
    }

    /// Every submitted row is a duplicate, a write, or a failure
    pub fn reconciles(&self) -> bool {
        self.submitted == self.duplicates_collapsed + self.persisted() + self.failed()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} submitted, {} inserted, {} updated, {} duplicates collapsed \
             ({} conflicting), {} failed",
            self.dataset,
            self.submitted,
            self.inserted,
            self.updated,
            self.duplicates_collapsed,
            self.conflicting_duplicates,
            self.failed()
        )
    }
}

/// Batched, idempotent writer for normalized rows
pub struct Uploader {
    store: Arc<dyn ObservationStore>,
    batch_size: usize,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObservationStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObservationStore> {
        &self.store
    }

    /// Upsert `rows` into `dataset`.
    ///
    /// Never fails as a whole: store errors are recorded per row and the
    /// remaining batches still run.
    #[instrument(skip(self, rows), fields(store = self.store.name(), rows = rows.len()))]
    pub async fn upload(&self, dataset: Dataset, rows: Vec<ObservationRow>) -> UploadReport {
        let mut report = UploadReport::new(dataset, rows.len());
        let Deduplicated {
            rows,
            collapsed,
            conflicting,
        } = dedup_by_natural_key(rows);
        report.duplicates_collapsed = collapsed;
        report.conflicting_duplicates = conflicting;

        if conflicting > 0 {
            warn!(
                dataset = %dataset,
                collapsed,
                conflicting,
                "Rows sharing a natural key carried different values; the last one was kept"
            );
        } else if collapsed > 0 {
            debug!(dataset = %dataset, collapsed, "Collapsed duplicate natural keys");
        }

        for (batch_index, batch) in rows.chunks(self.batch_size).enumerate() {
            report.batches += 1;

            match self.store.upsert_batch(dataset, batch).await {
                Ok(outcomes) => {
                    for (i, row) in batch.iter().enumerate() {
                        match outcomes.get(i) {
                            Some(Ok(RowOutcome::Inserted)) => report.inserted += 1,
                            Some(Ok(RowOutcome::Updated)) => report.updated += 1,
                            Some(Err(e)) => report.failures.push(RowFailure {
                                key: row.natural_key(),
                                error: e.clone(),
                            }),
                            None => report.failures.push(RowFailure {
                                key: row.natural_key(),
                                error: UploadError::Rejected(
                                    "store returned no outcome for row".to_string(),
                                ),
                            }),
                        }
                    }
                },
                Err(e) => {
                    warn!(
                        dataset = %dataset,
                        batch = batch_index,
                        rows = batch.len(),
                        error = %e,
                        "Batch failed; marking its rows failed and continuing"
                    );
                    report
                        .failures
                        .extend(batch.iter().map(|row| RowFailure {
                            key: row.natural_key(),
                            error: e.clone(),
                        }));
                },
            }
        }

        if report.failed() > 0 {
            warn!(dataset = %dataset, failed = report.failed(), "Upload completed with failures");
            for failure in report.failures.iter().take(5) {
                warn!(natural_key = %failure.key, error = %failure.error, "Sample failure");
            }
        }

        info!(
            dataset = %dataset,
            inserted = report.inserted,
            updated = report.updated,
            failed = report.failed(),
            batches = report.batches,
            "Upload complete"
        );

        report
    }
}

/// Output of [`dedup_by_natural_key`]
#[derive(Debug, Clone, PartialEq)]
pub struct Deduplicated {
    pub rows: Vec<ObservationRow>,
    /// Rows folded into a later row with the same key
    pub collapsed: usize,
    /// Folded rows that were not identical to their replacement
    pub conflicting: usize,
}

/// Keep one row per natural key: the last occurrence's values, at the first
/// occurrence's position.
pub fn dedup_by_natural_key(rows: Vec<ObservationRow>) -> Deduplicated {
    let mut positions: HashMap<NaturalKey, usize> = HashMap::with_capacity(rows.len());
    let mut unique: Vec<ObservationRow> = Vec::with_capacity(rows.len());
    let mut collapsed = 0;
    let mut conflicting = 0;

    for row in rows {
        let key = row.natural_key();
        match positions.get(&key) {
            Some(&position) => {
                if unique[position] != row {
                    conflicting += 1;
                }
                unique[position] = row;
                collapsed += 1;
            },
            None => {
                positions.insert(key, unique.len());
                unique.push(row);
            },
        }
    }

    Deduplicated {
        rows: unique,
        collapsed,
        conflicting,
    }
}

fn serialize_display<S: serde::Serializer>(
    value: &UploadError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
