//! End-to-end ingestion scenarios against the in-memory store
//!
//! Each scenario drives records through the full pipeline with a controllable
//! clock so that `created_at`/`updated_at` can be asserted exactly.

use anyhow::Result;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use livestock_common::Dataset;
use livestock_ingest::legacy_csv::{legacy_stream, parse_legacy_csv};
use livestock_ingest::mars::RecordStream;
use livestock_ingest::normalize::Normalizer;
use livestock_ingest::pipeline::IngestPipeline;
use livestock_ingest::record::{LegacyRecord, MarsRecord, ReportMetadata};
use livestock_ingest::upload::{MemoryObservationStore, ObservationStore, Uploader};
use livestock_ingest::RawRecord;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Clock advanced by hand between runs
struct ManualClock {
    seconds: Arc<AtomicI64>,
}

impl ManualClock {
    fn start() -> Self {
        let start = Utc.with_ymd_and_hms(2024, 1, 3, 6, 0, 0).unwrap();
        Self {
            seconds: Arc::new(AtomicI64::new(start.timestamp())),
        }
    }

    fn advance(&self, by: Duration) {
        self.seconds.fetch_add(by.num_seconds(), Ordering::SeqCst);
    }

    fn store(&self) -> Arc<MemoryObservationStore> {
        let seconds = self.seconds.clone();
        Arc::new(MemoryObservationStore::with_clock(Arc::new(move || {
            DateTime::from_timestamp(seconds.load(Ordering::SeqCst), 0).unwrap_or_default()
        })))
    }
}

fn pipeline(store: Arc<MemoryObservationStore>) -> IngestPipeline {
    IngestPipeline::new(Normalizer::new(), Uploader::new(store, 50))
}

fn steers(volume: &str) -> RawRecord {
    RawRecord::Legacy(LegacyRecord {
        office_code: "AMS01".to_string(),
        slaughter_date: "2024-01-02".to_string(),
        class: "Steers".to_string(),
        description: "Fed Cattle".to_string(),
        volume: volume.to_string(),
        unit: "head".to_string(),
        ..LegacyRecord::default()
    })
}

fn stream_of(records: Vec<RawRecord>) -> RecordStream<'static> {
    stream::iter(records.into_iter().map(Ok)).boxed()
}

fn mars(section: &str, item: Value) -> RawRecord {
    let report = ReportMetadata {
        slug_id: Some("3658".to_string()),
        report_title: Some("Actual Slaughter Under Federal Inspection".to_string()),
        report_date: Some("01/03/2024".to_string()),
        report_end_date: Some("01/02/2024".to_string()),
        office_code: Some("AMS01".to_string()),
        ..ReportMetadata::default()
    };
    let item: Map<String, Value> = match item {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    RawRecord::Mars(MarsRecord {
        report: Arc::new(report),
        slug_id: "3658".to_string(),
        section: section.to_string(),
        item,
    })
}

#[tokio::test]
async fn test_fresh_ingestion_creates_one_row() -> Result<()> {
    let clock = ManualClock::start();
    let store = clock.store();

    let summary = pipeline(store.clone())
        .run(1, stream_of(vec![steers("45,000")]))
        .await?;

    assert_eq!(summary.rows_inserted(), 1);
    assert!(summary.reconciles());
    assert!(summary.is_clean());

    let rows = store.snapshot(Dataset::Slaughter);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row.volume, Some(BigDecimal::from(45000)));
    assert_eq!(rows[0].row.unit.as_deref(), Some("head"));
    assert_eq!(rows[0].created_at, rows[0].updated_at);
    Ok(())
}

#[tokio::test]
async fn test_revision_updates_in_place() -> Result<()> {
    let clock = ManualClock::start();
    let store = clock.store();

    pipeline(store.clone())
        .run(1, stream_of(vec![steers("45,000")]))
        .await?;
    let first = store.snapshot(Dataset::Slaughter).remove(0);

    clock.advance(Duration::hours(24));
    let summary = pipeline(store.clone())
        .run(1, stream_of(vec![steers("46,200")]))
        .await?;

    assert_eq!(summary.rows_inserted(), 0);
    assert_eq!(summary.rows_updated(), 1);

    let rows = store.snapshot(Dataset::Slaughter);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row.volume, Some(BigDecimal::from(46200)));
    assert_eq!(rows[0].created_at, first.created_at);
    assert!(rows[0].updated_at > first.updated_at);
    Ok(())
}

#[tokio::test]
async fn test_rerun_is_idempotent() -> Result<()> {
    let clock = ManualClock::start();
    let store = clock.store();
    let records = || {
        stream_of(vec![
            steers("45,000"),
            mars(
                "Report FIS Meat Production",
                json!({"slaughter_date": "01/02/2024", "description": "Total Red Meat", "volume": "52.3"}),
            ),
        ])
    };

    pipeline(store.clone()).run(1, records()).await?;
    let before: Vec<_> = Dataset::ALL
        .iter()
        .flat_map(|d| store.snapshot(*d))
        .map(|s| s.row)
        .collect();

    clock.advance(Duration::minutes(5));
    pipeline(store.clone()).run(1, records()).await?;
    let after: Vec<_> = Dataset::ALL
        .iter()
        .flat_map(|d| store.snapshot(*d))
        .map(|s| s.row)
        .collect();

    assert_eq!(before.len(), 2);
    assert_eq!(before, after);

    let stored = store.snapshot(Dataset::Slaughter);
    assert!(stored[0].updated_at > stored[0].created_at);
    Ok(())
}

#[tokio::test]
async fn test_unrecognized_category_is_reported_not_stored() -> Result<()> {
    let store = ManualClock::start().store();
    let records = vec![
        mars(
            "",
            json!({
                "slaughter_date": "01/02/2024",
                "category": "Poultry",
                "description": "Young Chickens",
                "volume": "1,000"
            }),
        ),
        steers("45,000"),
    ];

    let summary = pipeline(store.clone()).run(1, stream_of(records)).await?;

    assert_eq!(summary.normalization_failures.len(), 1);
    assert_eq!(summary.failures_by_kind().get("unrecognized_category"), Some(&1));
    assert_eq!(
        summary.normalization_failures[0].error.to_string(),
        "Unrecognized category: \"Poultry\""
    );
    assert!(summary.reconciles());

    for dataset in Dataset::ALL {
        let poultry = store
            .snapshot(dataset)
            .into_iter()
            .filter(|s| s.row.category.as_deref() == Some("Poultry"))
            .count();
        assert_eq!(poultry, 0);
    }
    assert_eq!(store.count(Dataset::Slaughter).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_mars_day_offset_resolves_against_report_date() -> Result<()> {
    let store = ManualClock::start().store();
    let record = mars(
        "Report FIS Cattle",
        json!({"slaughter_date": "-1", "class": "Heifers", "description": "Head Slaughtered", "volume": "18,450"}),
    );

    let summary = pipeline(store.clone()).run(1, stream_of(vec![record])).await?;
    assert!(summary.is_clean());

    let rows = store.snapshot(Dataset::Slaughter);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row.slaughter_date, "2024-01-02".parse()?);
    assert_eq!(rows[0].row.report_title.as_deref(), Some("Actual Slaughter Under Federal Inspection"));
    assert_eq!(rows[0].row.slug_name.as_deref(), Some("AMS_3658"));
    assert_eq!(rows[0].row.volume, Some(BigDecimal::from(18450)));
    Ok(())
}

#[tokio::test]
async fn test_legacy_export_import() -> Result<()> {
    let export = "\
office_name,office_code,office_city,office_state,description,commodity,class,slaughter_date,volume,unit,section,type,region
LPGMN,AMS01,Des Moines,IA,Head Slaughtered,Cattle,Steers,-1,\"45,000\",Head,,Daily,
LPGMN,AMS01,Des Moines,IA,Total Red Meat,Cattle,,2024-01-02,52.3,Million Pounds,,Daily,
LPGMN,AMS01,Des Moines,IA,Regional Head Slaughtered,Cattle,Steers,2024-01-02,\"12,750\",Head,,Daily,Region 7
,,,,,,,,,,,,
Source: USDA AMS Livestock Poultry and Grain Market News,,,,,,,,,,,,
";
    let records = parse_legacy_csv(export.as_bytes())?;
    let store = ManualClock::start().store();
    let normalizer = Normalizer::new().with_reference_date("2024-01-03".parse()?);
    let pipeline = IngestPipeline::new(normalizer, Uploader::new(store.clone(), 2));

    let summary = pipeline.run(0, legacy_stream(records)).await?;

    assert_eq!(summary.records_fetched, 5);
    assert_eq!(summary.rows_normalized, 3);
    assert_eq!(summary.artifacts_skipped, 2);
    assert!(summary.reconciles());
    assert!(summary.is_clean());

    let slaughter = store.snapshot(Dataset::Slaughter);
    assert_eq!(slaughter.len(), 1);
    assert_eq!(slaughter[0].row.slaughter_date, "2024-01-02".parse()?);
    assert_eq!(slaughter[0].row.report_title, None);

    let production = store.snapshot(Dataset::Production);
    assert_eq!(production[0].row.volume, Some(BigDecimal::from_str("52.3")?));

    let region = store.snapshot(Dataset::Region);
    assert_eq!(region[0].row.region.as_deref(), Some("Region 7"));
    Ok(())
}

#[tokio::test]
async fn test_species_section_keeps_only_cattle() -> Result<()> {
    let store = ManualClock::start().store();
    let species = |commodity: &str, volume: &str| {
        mars(
            "Report FIS Species",
            json!({
                "slaughter_date": "01/02/2024",
                "commodity": commodity,
                "class": "All",
                "description": "Head Slaughtered",
                "volume": volume,
                "unit": "Head"
            }),
        )
    };
    let records = vec![
        species("Cattle", "118,000"),
        species("Hogs", "480,000"),
        species("Calves", "1,200"),
    ];

    let summary = pipeline(store.clone()).run(1, stream_of(records)).await?;

    assert_eq!(summary.records_fetched, 3);
    assert_eq!(summary.rows_normalized, 1);
    assert_eq!(summary.records_excluded.get("Hogs"), Some(&1));
    assert_eq!(summary.records_excluded.get("Calves"), Some(&1));
    assert_eq!(summary.conflicting_duplicates(), 0);
    assert!(summary.reconciles());
    assert!(summary.is_clean());

    let stored: Vec<_> = Dataset::ALL
        .iter()
        .flat_map(|d| store.snapshot(*d))
        .collect();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].dataset, Dataset::Slaughter);
    assert_eq!(stored[0].row.commodity.as_deref(), Some("Cattle"));
    assert_eq!(stored[0].row.volume, Some(BigDecimal::from(118000)));
    Ok(())
}
