//! Livestock Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingests the USDA cattle-slaughter report into four tables sharing one row shape.
//!
//! # Pipeline
//!
//! - **Source Adapter** ([`mars`], [`legacy_csv`]): raw records from the MARS API
//!   (latest, single date, or historical range) or from legacy CSV exports
//! - **Row Normalizer** ([`normalize`]): one raw record to zero or one
//!   [`ObservationRow`](livestock_common::ObservationRow), routed to a dataset
//! - **Upload Coordinator** ([`upload`]): de-duplicated, batched upserts keyed on
//!   the natural key
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use livestock_ingest::config::IngestConfig;
//! use livestock_ingest::mars::{FetchMode, MarsClient, MarsSource};
//! use livestock_ingest::normalize::Normalizer;
//! use livestock_ingest::pipeline::IngestPipeline;
//! use livestock_ingest::upload::{PgObservationStore, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let pool = livestock_ingest::db::create_pool(&config.database).await?;
//!
//!     let source = MarsSource::new(MarsClient::new(config.mars.clone())?);
//!     let (reports, records) = source.records(FetchMode::Latest).await?;
//!
//!     let uploader = Uploader::new(Arc::new(PgObservationStore::new(pool)), 100);
//!     let pipeline = IngestPipeline::new(Normalizer::new(), uploader);
//!     let summary = pipeline.run(reports.len(), records).await?;
//!     println!("{}", summary.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod legacy_csv;
pub mod mars;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod upload;

pub use error::{FetchError, IngestError, NormalizationError, ParseError, Result, UploadError};
pub use pipeline::{IngestPipeline, RunSummary};
pub use record::RawRecord;
