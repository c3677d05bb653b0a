//! Pipeline driver: Source Adapter -> Row Normalizer -> Upload Coordinator

use chrono::NaiveDate;
use futures::StreamExt;
use livestock_common::{Dataset, ObservationRow};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, instrument, warn};

use crate::error::{NormalizationError, Result};
use crate::mars::{MarsSource, PlannedReport, RecordStream};
use crate::normalize::{Normalized, Normalizer};
use crate::upload::{UploadReport, Uploader};

/// A raw record that could not be normalized
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    /// Zero-based position among the run's accepted records
    pub index: usize,
    pub vintage: &'static str,
    #[serde(serialize_with = "serialize_display")]
    pub error: NormalizationError,
}

/// A planned report whose fetch failed; none of its records were kept
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportFailure {
    pub report_end_date: NaiveDate,
    /// Records already received from the report before the failure
    pub records_discarded: usize,
    pub error: String,
}

/// Accounting for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub reports: usize,
    pub records_fetched: usize,
    pub rows_normalized: usize,
    pub artifacts_skipped: usize,
    /// Rows for species other than adult cattle, by commodity
    pub records_excluded: BTreeMap<String, usize>,
    pub normalization_failures: Vec<RecordFailure>,
    pub report_failures: Vec<ReportFailure>,
    pub uploads: Vec<UploadReport>,
}

impl RunSummary {
    /// Normalization failures grouped by error kind
    pub fn failures_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.normalization_failures {
            *counts.entry(failure.error.kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn upload(&self, dataset: Dataset) -> Option<&UploadReport> {
        self.uploads.iter().find(|u| u.dataset == dataset)
    }

    pub fn rows_inserted(&self) -> usize {
        self.uploads.iter().map(|u| u.inserted).sum()
    }

    pub fn rows_updated(&self) -> usize {
        self.uploads.iter().map(|u| u.updated).sum()
    }

    pub fn rows_failed(&self) -> usize {
        self.uploads.iter().map(|u| u.failed()).sum()
    }

    pub fn records_excluded_total(&self) -> usize {
        self.records_excluded.values().sum()
    }

    /// Same-key rows collapsed with differing values
    pub fn conflicting_duplicates(&self) -> usize {
        self.uploads.iter().map(|u| u.conflicting_duplicates).sum()
    }

    /// True when every fetched record is accounted for exactly once
    pub fn reconciles(&self) -> bool {
        let submitted: usize = self.uploads.iter().map(|u| u.submitted).sum();
        self.records_fetched
            == self.rows_normalized
                + self.artifacts_skipped
                + self.records_excluded_total()
                + self.normalization_failures.len()
            && self.rows_normalized == submitted
            && self.uploads.iter().all(UploadReport::reconciles)
    }

    /// Whether anything was dropped, overwritten or failed
    pub fn is_clean(&self) -> bool {
        self.normalization_failures.is_empty()
            && self.report_failures.is_empty()
            && self.rows_failed() == 0
            && self.conflicting_duplicates() == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} reports ({} aborted), {} records fetched, {} rows normalized, \
             {} artifacts skipped, {} excluded, {} normalization failures, \
             {} inserted, {} updated, {} upload failures",
            self.reports,
            self.report_failures.len(),
            self.records_fetched,
            self.rows_normalized,
            self.artifacts_skipped,
            self.records_excluded_total(),
            self.normalization_failures.len(),
            self.rows_inserted(),
            self.rows_updated(),
            self.rows_failed()
        )
    }
}

/// Normalized records waiting for upload
#[derive(Debug, Default)]
struct Staged {
    /// Index of the first record, so failure indexes stay run-wide
    offset: usize,
    records_fetched: usize,
    rows_normalized: usize,
    artifacts_skipped: usize,
    records_excluded: BTreeMap<String, usize>,
    failures: Vec<RecordFailure>,
    buckets: BTreeMap<Dataset, Vec<ObservationRow>>,
}

impl Staged {
    fn starting_at(offset: usize) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    fn absorb(&mut self, other: Staged) {
        self.records_fetched += other.records_fetched;
        self.rows_normalized += other.rows_normalized;
        self.artifacts_skipped += other.artifacts_skipped;
        for (commodity, count) in other.records_excluded {
            *self.records_excluded.entry(commodity).or_insert(0) += count;
        }
        self.failures.extend(other.failures);
        for (dataset, rows) in other.buckets {
            self.buckets.entry(dataset).or_default().extend(rows);
        }
    }
}

/// Wires a record stream through normalization and upload
pub struct IngestPipeline {
    normalizer: Normalizer,
    uploader: Uploader,
}

impl IngestPipeline {
    pub fn new(normalizer: Normalizer, uploader: Uploader) -> Self {
        Self {
            normalizer,
            uploader,
        }
    }

    /// Drain `records`, then upload each dataset.
    ///
    /// A fetch or parse error in the stream aborts the run before anything is
    /// written.
    #[instrument(skip(self, records))]
    pub async fn run(&self, reports: usize, records: RecordStream<'_>) -> Result<RunSummary> {
        let mut staged = Staged::default();
        self.normalize_stream(records, &mut staged).await?;

        let summary = RunSummary {
            reports,
            ..RunSummary::default()
        };
        Ok(self.upload(summary, staged).await)
    }

    /// Fetch and normalize each planned report on its own, then upload what
    /// succeeded.
    ///
    /// A report whose fetch fails is recorded in
    /// [`RunSummary::report_failures`] and its partial records are dropped;
    /// the remaining reports still run.
    #[instrument(skip_all, fields(reports = reports.len()))]
    pub async fn run_reports(&self, source: &MarsSource, reports: &[PlannedReport]) -> RunSummary {
        let mut summary = RunSummary {
            reports: reports.len(),
            ..RunSummary::default()
        };
        let mut accepted = Staged::default();

        for (position, report) in reports.iter().enumerate() {
            if position > 0 {
                source.pause_between_reports().await;
            }

            let mut staged = Staged::starting_at(accepted.records_fetched);
            let records = source.report_stream(report.clone());
            match self.normalize_stream(records, &mut staged).await {
                Ok(()) => accepted.absorb(staged),
                Err(err) => {
                    error!(
                        report_end_date = %report.end_date,
                        records_discarded = staged.records_fetched,
                        error = %err,
                        "Report aborted; continuing with the next report"
                    );
                    summary.report_failures.push(ReportFailure {
                        report_end_date: report.end_date,
                        records_discarded: staged.records_fetched,
                        error: err.to_string(),
                    });
                },
            }
        }

        self.upload(summary, accepted).await
    }

    async fn normalize_stream(&self, mut records: RecordStream<'_>, staged: &mut Staged) -> Result<()> {
        while let Some(record) = records.next().await {
            let record = record?;
            let index = staged.offset + staged.records_fetched;
            staged.records_fetched += 1;

            match self.normalizer.normalize(&record) {
                Ok(Normalized::Row { dataset, row }) => {
                    staged.rows_normalized += 1;
                    staged.buckets.entry(dataset).or_default().push(*row);
                },
                Ok(Normalized::Artifact) => staged.artifacts_skipped += 1,
                Ok(Normalized::Excluded { commodity }) => {
                    *staged.records_excluded.entry(commodity).or_insert(0) += 1;
                },
                Err(error) => {
                    warn!(
                        index,
                        vintage = record.vintage(),
                        kind = error.kind(),
                        error = %error,
                        "Skipping record"
                    );
                    staged.failures.push(RecordFailure {
                        index,
                        vintage: record.vintage(),
                        error,
                    });
                },
            }
        }
        Ok(())
    }

    async fn upload(&self, mut summary: RunSummary, staged: Staged) -> RunSummary {
        summary.records_fetched = staged.records_fetched;
        summary.rows_normalized = staged.rows_normalized;
        summary.artifacts_skipped = staged.artifacts_skipped;
        summary.records_excluded = staged.records_excluded;
        summary.normalization_failures = staged.failures;

        info!(
            records = summary.records_fetched,
            normalized = summary.rows_normalized,
            artifacts = summary.artifacts_skipped,
            excluded = summary.records_excluded_total(),
            failures = summary.normalization_failures.len(),
            "Normalization complete"
        );

        for (dataset, rows) in staged.buckets {
            let report = self.uploader.upload(dataset, rows).await;
            summary.uploads.push(report);
        }

        summary
    }
}

/// Log a finished run at the level its outcome deserves
pub fn log_summary(summary: &RunSummary) {
    for upload in &summary.uploads {
        info!("{}", upload.summary());
    }

    for (commodity, count) in &summary.records_excluded {
        info!(commodity = %commodity, count, "Excluded non-cattle rows");
    }

    for (kind, count) in summary.failures_by_kind() {
        warn!(kind, count, "Normalization failures");
    }

    for failure in &summary.report_failures {
        error!(
            report_end_date = %failure.report_end_date,
            records_discarded = failure.records_discarded,
            error = %failure.error,
            "Report not ingested"
        );
    }

    if !summary.reconciles() {
        warn!("Run summary does not reconcile: {}", summary.summary());
    } else if summary.is_clean() {
        info!("Run complete: {}", summary.summary());
    } else {
        warn!("Run complete with dropped rows: {}", summary.summary());
    }
}

fn serialize_display<S: serde::Serializer>(
    value: &NormalizationError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
