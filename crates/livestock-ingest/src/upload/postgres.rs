//! PostgreSQL store
//!
//! Each batch runs in one transaction with a savepoint per row, so a rejected
//! row is rolled back alone and its siblings still commit.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use livestock_common::{Dataset, ObservationRow, StoredObservation};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, warn};

use super::store::{BatchOutcome, ObservationStore, RowOutcome};
use crate::error::{Result, UploadError};

/// Non-key columns, in bind order after `natural_key`
const COLUMNS: [&str; 22] = [
    "office_name",
    "office_code",
    "office_city",
    "office_state",
    "report_date",
    "report_begin_date",
    "report_end_date",
    "published_date",
    "market_type",
    "slug_id",
    "slug_name",
    "report_title",
    "\"group\"",
    "category",
    "description",
    "commodity",
    "\"class\"",
    "section",
    "\"type\"",
    "region",
    "slaughter_date",
    "volume",
];

/// Persisted row as selected from any of the four tables
#[derive(Debug, sqlx::FromRow)]
struct ObservationRecord {
    office_name: Option<String>,
    office_code: Option<String>,
    office_city: Option<String>,
    office_state: Option<String>,
    report_date: Option<NaiveDate>,
    report_begin_date: Option<NaiveDate>,
    report_end_date: Option<NaiveDate>,
    published_date: Option<NaiveDateTime>,
    market_type: Option<String>,
    slug_id: Option<String>,
    slug_name: Option<String>,
    report_title: Option<String>,
    group: Option<String>,
    category: Option<String>,
    description: Option<String>,
    commodity: Option<String>,
    class: Option<String>,
    section: Option<String>,
    #[sqlx(rename = "type")]
    report_type: Option<String>,
    region: Option<String>,
    slaughter_date: NaiveDate,
    volume: Option<BigDecimal>,
    unit: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ObservationRecord {
    fn into_stored(self, dataset: Dataset) -> StoredObservation {
        let mut row = ObservationRow::new(self.slaughter_date);
        row.office_name = self.office_name;
        row.office_code = self.office_code;
        row.office_city = self.office_city;
        row.office_state = self.office_state;
        row.report_date = self.report_date;
        row.report_begin_date = self.report_begin_date;
        row.report_end_date = self.report_end_date;
        row.published_date = self.published_date;
        row.market_type = self.market_type;
        row.slug_id = self.slug_id;
        row.slug_name = self.slug_name;
        row.report_title = self.report_title;
        row.group = self.group;
        row.category = self.category;
        row.description = self.description;
        row.commodity = self.commodity;
        row.class = self.class;
        row.section = self.section;
        row.report_type = self.report_type;
        row.region = self.region;
        row.volume = self.volume;
        row.unit = self.unit;

        StoredObservation {
            dataset,
            row,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Observation store backed by the four PostgreSQL tables
#[derive(Clone)]
pub struct PgObservationStore {
    pool: PgPool,
}

impl PgObservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_row_tx(
        tx: &mut Transaction<'_, Postgres>,
        sql: &str,
        row: &ObservationRow,
    ) -> std::result::Result<RowOutcome, sqlx::Error> {
        let inserted: bool = sqlx::query_scalar(sql)
            .bind(row.natural_key().encode())
            .bind(&row.office_name)
            .bind(&row.office_code)
            .bind(&row.office_city)
            .bind(&row.office_state)
            .bind(row.report_date)
            .bind(row.report_begin_date)
            .bind(row.report_end_date)
            .bind(row.published_date)
            .bind(&row.market_type)
            .bind(&row.slug_id)
            .bind(&row.slug_name)
            .bind(&row.report_title)
            .bind(&row.group)
            .bind(&row.category)
            .bind(&row.description)
            .bind(&row.commodity)
            .bind(&row.class)
            .bind(&row.section)
            .bind(&row.report_type)
            .bind(&row.region)
            .bind(row.slaughter_date)
            .bind(&row.volume)
            .bind(&row.unit)
            .fetch_one(&mut **tx)
            .await?;

        Ok(if inserted {
            RowOutcome::Inserted
        } else {
            RowOutcome::Updated
        })
    }
}

/// `INSERT ... ON CONFLICT (natural_key) DO UPDATE` for one table.
///
/// `xmax = 0` only for freshly inserted tuples, which tells inserts from updates.
fn upsert_sql(dataset: Dataset) -> String {
    let columns: Vec<&str> = COLUMNS.iter().copied().chain(["unit"]).collect();
    let placeholders: Vec<String> = (1..=columns.len() + 1).map(|i| format!("${}", i)).collect();
    let updates: Vec<String> = columns
        .iter()
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();

    format!(
        "INSERT INTO {table} (natural_key, {columns}) VALUES ({placeholders}) \
         ON CONFLICT (natural_key) DO UPDATE SET {updates}, updated_at = NOW() \
         RETURNING (xmax = 0) AS inserted",
        table = dataset.table_name(),
        columns = columns.join(", "),
        placeholders = placeholders.join(", "),
        updates = updates.join(", "),
    )
}

fn select_sql(dataset: Dataset) -> String {
    format!(
        "SELECT {columns}, unit, created_at, updated_at FROM {table} \
         WHERE slaughter_date BETWEEN $1 AND $2 \
         ORDER BY slaughter_date, natural_key",
        columns = COLUMNS.join(", "),
        table = dataset.table_name(),
    )
}

#[async_trait]
impl ObservationStore for PgObservationStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn upsert_batch(
        &self,
        dataset: Dataset,
        rows: &[ObservationRow],
    ) -> std::result::Result<BatchOutcome, UploadError> {
        let sql = upsert_sql(dataset);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| UploadError::BatchAborted(format!("Failed to begin transaction: {}", e)))?;

        let mut outcomes = Vec::with_capacity(rows.len());

        for row in rows {
            // Savepoint per row isolates failures
            sqlx::query("SAVEPOINT row_savepoint")
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!(dataset = %dataset, error = %e, "Failed to create savepoint, aborting batch");
                    UploadError::BatchAborted(format!("Failed to create savepoint: {}", e))
                })?;

            match Self::upsert_row_tx(&mut tx, &sql, row).await {
                Ok(outcome) => {
                    sqlx::query("RELEASE SAVEPOINT row_savepoint")
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| {
                            UploadError::BatchAborted(format!("Failed to release savepoint: {}", e))
                        })?;
                    outcomes.push(Ok(outcome));
                },
                Err(e) => {
                    sqlx::query("ROLLBACK TO SAVEPOINT row_savepoint")
                        .execute(&mut *tx)
                        .await
                        .map_err(|rollback_err| {
                            error!(
                                dataset = %dataset,
                                rollback_error = %rollback_err,
                                "Failed to rollback savepoint, aborting batch"
                            );
                            UploadError::BatchAborted(format!(
                                "Failed to rollback savepoint: {}",
                                rollback_err
                            ))
                        })?;

                    warn!(
                        dataset = %dataset,
                        natural_key = %row.natural_key(),
                        error = %e,
                        "Row rejected (isolated with savepoint)"
                    );
                    outcomes.push(Err(UploadError::Rejected(e.to_string())));
                },
            }
        }

        tx.commit()
            .await
            .map_err(|e| UploadError::BatchAborted(format!("Failed to commit transaction: {}", e)))?;

        debug!(dataset = %dataset, rows = rows.len(), "Batch committed");
        Ok(outcomes)
    }

    async fn fetch_range(
        &self,
        dataset: Dataset,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StoredObservation>> {
        let records: Vec<ObservationRecord> = sqlx::query_as(&select_sql(dataset))
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        Ok(records.into_iter().map(|r| r.into_stored(dataset)).collect())
    }

    async fn count(&self, dataset: Dataset) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", dataset.table_name()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
