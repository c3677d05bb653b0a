//! Postgres store integration tests
//!
//! These tests require Docker to be running. Run with:
//!
//! ```bash
//! cargo test -p livestock-ingest --test postgres_store_test -- --ignored --nocapture
//! ```

use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use livestock_common::{Dataset, ObservationRow};
use livestock_ingest::db;
use livestock_ingest::upload::{ObservationStore, PgObservationStore, RowOutcome, Uploader};
use livestock_ingest::UploadError;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,livestock_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Postgres container with migrations applied
struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("postgresql://postgres:postgres@{}:{}/postgres", host, port))
            .await
            .context("Failed to connect to PostgreSQL")?;

        db::run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    fn store(&self) -> PgObservationStore {
        PgObservationStore::new(self.pool.clone())
    }
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn row(class: &str, slaughter_date: &str, volume: i64) -> ObservationRow {
    let mut row = ObservationRow::new(date(slaughter_date));
    row.office_code = Some("AMS01".to_string());
    row.class = Some(class.to_string());
    row.description = Some("Head Slaughtered".to_string());
    row.commodity = Some("Cattle".to_string());
    row.volume = Some(BigDecimal::from(volume));
    row.unit = Some("Head".to_string());
    row
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn test_migrations_create_every_table() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;

    db::health_check(&pg.pool).await?;
    for dataset in Dataset::ALL {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM information_schema.columns \
             WHERE table_name = $1 AND column_name = 'natural_key')",
        )
        .bind(dataset.table_name())
        .fetch_one(&pg.pool)
        .await?;
        assert!(exists, "{} should have a natural_key column", dataset.table_name());
    }
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn test_upsert_inserts_then_updates() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let store = pg.store();

    let outcome = store
        .upsert_batch(Dataset::Slaughter, &[row("Steers", "2024-01-02", 45000)])
        .await?;
    assert_eq!(outcome, vec![Ok(RowOutcome::Inserted)]);

    let first = store
        .fetch_range(Dataset::Slaughter, date("2024-01-01"), date("2024-01-31"))
        .await?;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].created_at, first[0].updated_at);

    let outcome = store
        .upsert_batch(Dataset::Slaughter, &[row("Steers", "2024-01-02", 46200)])
        .await?;
    assert_eq!(outcome, vec![Ok(RowOutcome::Updated)]);

    let second = store
        .fetch_range(Dataset::Slaughter, date("2024-01-01"), date("2024-01-31"))
        .await?;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].row.volume, Some(BigDecimal::from(46200)));
    assert_eq!(second[0].created_at, first[0].created_at);
    assert!(second[0].updated_at > second[0].created_at);
    assert_eq!(store.count(Dataset::Slaughter).await?, 1);
    assert_eq!(store.count(Dataset::Production).await?, 0);
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn test_rejected_row_does_not_roll_back_siblings() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let store = pg.store();

    let mut bad = row("Cows", "2024-01-02", 10);
    // Postgres refuses NUL bytes in text columns.
    bad.unit = Some("Head\0".to_string());

    let outcome = store
        .upsert_batch(
            Dataset::Slaughter,
            &[row("Steers", "2024-01-02", 1), bad, row("Heifers", "2024-01-02", 2)],
        )
        .await?;

    assert_eq!(outcome[0], Ok(RowOutcome::Inserted));
    assert!(matches!(outcome[1], Err(UploadError::Rejected(_))));
    assert_eq!(outcome[2], Ok(RowOutcome::Inserted));
    assert_eq!(store.count(Dataset::Slaughter).await?, 2);
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn test_uploader_round_trip_preserves_fields() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let store = Arc::new(pg.store());
    let uploader = Uploader::new(store.clone(), 2);

    let mut revised = row("Steers", "2024-01-02", 45100);
    revised.report_title = Some("Actual Slaughter Under Federal Inspection".to_string());
    revised.report_type = Some("Daily".to_string());
    revised.group = Some(String::new());
    revised.region = Some(String::new());

    let rows = vec![
        row("Steers", "2024-01-02", 45000),
        row("Steers", "2024-01-03", 44800),
        row("Cows", "2024-01-02", 22000),
        revised.clone(),
    ];
    let report = uploader.upload(Dataset::Slaughter, rows).await;

    assert_eq!(report.duplicates_collapsed, 1);
    assert_eq!(report.inserted, 3);
    assert_eq!(report.batches, 2);
    assert!(report.reconciles());

    let stored = store
        .fetch_range(Dataset::Slaughter, date("2024-01-02"), date("2024-01-02"))
        .await?;
    assert_eq!(stored.len(), 2);

    let steers = stored
        .iter()
        .find(|s| s.row.class.as_deref() == Some("Steers"))
        .context("Steers row missing")?;
    assert_eq!(steers.row, revised);
    Ok(())
}
