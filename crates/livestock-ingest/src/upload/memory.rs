//! In-memory store used for dry runs and tests

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use livestock_common::{Dataset, ObservationRow, StoredObservation};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::store::{BatchOutcome, ObservationStore, RowOutcome};
use crate::error::{Result, UploadError};

/// Source of `created_at`/`updated_at` timestamps
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

type Tables = HashMap<Dataset, BTreeMap<String, StoredObservation>>;

/// Upsert semantics of the Postgres store, held in a map keyed by encoded natural key
pub struct MemoryObservationStore {
    tables: Mutex<Tables>,
    clock: Clock,
}

impl Default for MemoryObservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObservationStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Every stored row of a dataset, ordered by natural key
    pub fn snapshot(&self, dataset: Dataset) -> Vec<StoredObservation> {
        self.tables()
            .get(&dataset)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A panic mid-upsert leaves whole rows behind, never partial ones.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObservationStore for MemoryObservationStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert_batch(
        &self,
        dataset: Dataset,
        rows: &[ObservationRow],
    ) -> std::result::Result<BatchOutcome, UploadError> {
        let now = (self.clock)();
        let mut tables = self.tables();
        let table = tables.entry(dataset).or_default();

        let outcomes = rows
            .iter()
            .map(|row| {
                let key = row.natural_key().encode();
                match table.get_mut(&key) {
                    Some(existing) => {
                        existing.row = row.clone();
                        existing.updated_at = now;
                        Ok(RowOutcome::Updated)
                    },
                    None => {
                        table.insert(
                            key,
                            StoredObservation {
                                dataset,
                                row: row.clone(),
                                created_at: now,
                                updated_at: now,
                            },
                        );
                        Ok(RowOutcome::Inserted)
                    },
                }
            })
            .collect();

        Ok(outcomes)
    }

    async fn fetch_range(
        &self,
        dataset: Dataset,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StoredObservation>> {
        let mut rows: Vec<StoredObservation> = self
            .snapshot(dataset)
            .into_iter()
            .filter(|s| start <= s.row.slaughter_date && s.row.slaughter_date <= end)
            .collect();
        rows.sort_by(|a, b| a.row.slaughter_date.cmp(&b.row.slaughter_date));
        Ok(rows)
    }

    async fn count(&self, dataset: Dataset) -> Result<u64> {
        Ok(self.tables().get(&dataset).map_or(0, |t| t.len() as u64))
    }
}
