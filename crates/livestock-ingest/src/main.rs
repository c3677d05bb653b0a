//! Livestock Ingest - USDA cattle slaughter ingestion tool

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use livestock_common::logging::{init_logging, LogConfig, LogLevel};
use livestock_ingest::config::IngestConfig;
use livestock_ingest::legacy_csv::{legacy_stream, load_legacy_csv};
use livestock_ingest::mars::{FetchMode, MarsClient, MarsSource};
use livestock_ingest::normalize::Normalizer;
use livestock_ingest::pipeline::{log_summary, IngestPipeline, RunSummary};
use livestock_ingest::upload::{MemoryObservationStore, ObservationStore, PgObservationStore, Uploader};
use livestock_ingest::{db, IngestError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "livestock-ingest")]
#[command(author, version, about = "USDA cattle slaughter ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Normalize and upload into an in-memory store; no database needed
    #[arg(long, global = true)]
    dry_run: bool,

    /// Rows per upsert transaction (overrides UPLOAD_BATCH_SIZE)
    #[arg(long, global = true)]
    batch_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest the most recent report, or the one for a given report date
    Latest {
        /// Report identifier (overrides MARS_SLUG_ID)
        #[arg(long)]
        slug: Option<String>,

        /// Report date to fetch instead of the latest (YYYY-MM-DD)
        #[arg(long)]
        report_date: Option<NaiveDate>,
    },

    /// Backfill every report whose end date falls in a range
    Historical {
        /// First report end date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last report end date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Report identifier (overrides MARS_SLUG_ID)
        #[arg(long)]
        slug: Option<String>,
    },

    /// Import a legacy CSV export
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,

        /// Anchor for relative day offsets in the file (YYYY-MM-DD)
        #[arg(long)]
        reference_date: Option<NaiveDate>,
    },

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("livestock-ingest")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::merge_env(log_config)?;
    let _log_guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env().context("Failed to load configuration")?;
    if let Some(batch_size) = cli.batch_size {
        config.upload = config.upload.with_batch_size(batch_size);
        config.upload.validate()?;
    }

    match cli.command {
        Command::Migrate => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            info!("Migrations complete");
            return Ok(());
        },
        Command::Latest { slug, report_date } => {
            let mode = match report_date {
                Some(date) => FetchMode::OnDate(date),
                None => FetchMode::Latest,
            };
            ingest_mars(&config, slug, mode, cli.dry_run).await?;
        },
        Command::Historical { start, end, slug } => {
            ingest_mars(&config, slug, FetchMode::Historical { start, end }, cli.dry_run).await?;
        },
        Command::Import {
            file,
            reference_date,
        } => {
            let mut normalizer = Normalizer::new();
            if let Some(date) = reference_date {
                normalizer = normalizer.with_reference_date(date);
            }

            let records = load_legacy_csv(&file).await?;
            let pipeline = IngestPipeline::new(normalizer, uploader(&config, cli.dry_run).await?);
            let summary = pipeline.run(0, legacy_stream(records)).await?;
            finish(&summary);
        },
    }

    Ok(())
}

async fn ingest_mars(
    config: &IngestConfig,
    slug: Option<String>,
    mode: FetchMode,
    dry_run: bool,
) -> Result<()> {
    let mut mars = config.mars.clone();
    if let Some(slug) = slug {
        mars = mars.with_slug_id(slug);
    }

    info!(slug_id = %mars.slug_id, ?mode, dry_run, "Starting MARS ingestion");

    let uploader = uploader(config, dry_run).await?;
    let source = MarsSource::new(MarsClient::new(mars)?);
    let reports = source.plan(mode).await?;

    let pipeline = IngestPipeline::new(Normalizer::new(), uploader);
    let summary = pipeline.run_reports(&source, &reports).await;
    finish(&summary);

    if !summary.report_failures.is_empty() {
        anyhow::bail!(
            "{} of {} reports could not be ingested",
            summary.report_failures.len(),
            summary.reports
        );
    }

    Ok(())
}

async fn uploader(config: &IngestConfig, dry_run: bool) -> Result<Uploader, IngestError> {
    let store: Arc<dyn ObservationStore> = if dry_run {
        info!("Dry run: writing to an in-memory store");
        Arc::new(MemoryObservationStore::new())
    } else {
        let pool = db::create_pool(&config.database).await?;
        Arc::new(PgObservationStore::new(pool))
    };

    Ok(Uploader::new(store, config.upload.batch_size))
}

fn finish(summary: &RunSummary) {
    log_summary(summary);
    info!("Ingestion complete");
}
