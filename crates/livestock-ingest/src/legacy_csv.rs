//! Import of legacy CSV report exports
//!
//! Older exports carry a narrow column set (office fields, description,
//! commodity, class, slaughter_date, volume, unit, section, type, region).
//! Extra columns are ignored; missing ones read as blank.

use futures::stream::{self, StreamExt};
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::error::{IngestError, Result};
use crate::mars::RecordStream;
use crate::record::{LegacyRecord, RawRecord};

/// Parse legacy records from any reader
pub fn parse_legacy_csv<R: Read>(reader: R) -> Result<Vec<LegacyRecord>> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    csv.deserialize()
        .map(|row| row.map_err(IngestError::from))
        .collect()
}

/// Load a legacy export from disk
pub async fn load_legacy_csv(path: impl AsRef<Path>) -> Result<Vec<LegacyRecord>> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("Failed to read legacy export '{}': {}", path.display(), e),
        )
    })?;

    let records = parse_legacy_csv(bytes.as_slice())?;
    info!(path = %path.display(), records = records.len(), "Loaded legacy export");

    Ok(records)
}

/// Wrap loaded records as a record stream for the pipeline
pub fn legacy_stream(records: Vec<LegacyRecord>) -> RecordStream<'static> {
    stream::iter(records.into_iter().map(|r| Ok(RawRecord::Legacy(r)))).boxed()
}
