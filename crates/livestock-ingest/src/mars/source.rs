//! Source Adapter: report selection and the lazy record stream

use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::client::MarsClient;
use super::{RecordStream, SECTIONS};
use crate::error::{FetchError, IngestError, Result};
use crate::normalize::dates::parse_calendar_date;
use crate::record::{MarsRecord, RawRecord, ReportMetadata};

/// Which reports a run pulls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// The most recent report
    Latest,
    /// The report published for one report date
    OnDate(NaiveDate),
    /// Every report whose end date falls in `start..=end`
    Historical { start: NaiveDate, end: NaiveDate },
}

/// A report chosen for fetching, with its parsed end date
#[derive(Debug, Clone)]
pub struct PlannedReport {
    pub metadata: Arc<ReportMetadata>,
    pub report_date: Option<NaiveDate>,
    pub end_date: NaiveDate,
}

/// Streams raw records for the configured slug
pub struct MarsSource {
    client: MarsClient,
}

impl MarsSource {
    pub fn new(client: MarsClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &MarsClient {
        &self.client
    }

    /// Resolve `mode` to the list of reports to fetch, oldest first
    #[instrument(skip(self), fields(slug_id = %self.client.config().slug_id))]
    pub async fn plan(&self, mode: FetchMode) -> Result<Vec<PlannedReport>> {
        let reports = self.client.list_reports().await?;
        let url = self.client.report_url(None)?;
        select_reports(reports, mode, url.as_str())
    }

    /// Plan `mode`, then stream its records one section request at a time.
    ///
    /// Nothing past the metadata request is fetched until the stream is polled.
    pub async fn records(&self, mode: FetchMode) -> Result<(Vec<PlannedReport>, RecordStream<'_>)> {
        let reports = self.plan(mode).await?;
        let stream = self.stream_reports(reports.clone());
        Ok((reports, stream))
    }

    /// Stream every section of the given reports.
    ///
    /// The first error ends the stream; use [`MarsSource::report_stream`] to
    /// keep one report's failure from reaching the others.
    pub fn stream_reports(&self, reports: Vec<PlannedReport>) -> RecordStream<'_> {
        stream::iter(reports.into_iter().enumerate())
            .then(move |(index, report)| async move {
                if index > 0 {
                    self.pause_between_reports().await;
                }
                self.report_stream(report)
            })
            .flatten()
            .boxed()
    }

    /// Stream the sections of a single report, one request at a time
    pub fn report_stream(&self, report: PlannedReport) -> RecordStream<'_> {
        let client = &self.client;
        let slug_id = client.config().slug_id.clone();

        stream::iter(SECTIONS)
            .then(move |section| {
                let slug_id = slug_id.clone();
                let report = report.clone();
                async move {
                    let items = client.fetch_section(section, report.end_date).await?;
                    info!(
                        slug_id = %slug_id,
                        section,
                        report_end_date = %report.end_date,
                        records = items.len(),
                        "Fetched section"
                    );

                    let records = items.into_iter().map(move |item| {
                        Ok::<_, IngestError>(RawRecord::Mars(MarsRecord {
                            report: Arc::clone(&report.metadata),
                            slug_id: slug_id.clone(),
                            section: section.to_string(),
                            item,
                        }))
                    });
                    Ok::<_, IngestError>(stream::iter(records))
                }
            })
            .try_flatten()
            .boxed()
    }

    /// Wait out the configured gap between report fetches
    pub async fn pause_between_reports(&self) {
        let delay = self.client.config().report_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Choose the reports `mode` asks for from the slug's metadata listing.
///
/// Reports without a parseable end date cannot be queried and are skipped.
pub fn select_reports(
    reports: Vec<ReportMetadata>,
    mode: FetchMode,
    url: &str,
) -> Result<Vec<PlannedReport>> {
    let mut planned: Vec<PlannedReport> = reports
        .into_iter()
        .filter_map(|metadata| {
            let end_date = metadata.report_end_date.as_deref().and_then(parse_calendar_date);
            let Some(end_date) = end_date else {
                warn!(
                    report_end_date = ?metadata.report_end_date,
                    "Skipping report without a usable end date"
                );
                return None;
            };
            let report_date = metadata.report_date.as_deref().and_then(parse_calendar_date);
            Some(PlannedReport {
                metadata: Arc::new(metadata),
                report_date,
                end_date,
            })
        })
        .collect();

    planned.sort_by_key(|r| (r.end_date, r.report_date));

    match mode {
        FetchMode::Latest => {
            let latest = planned
                .into_iter()
                .max_by_key(|r| (r.report_date.unwrap_or(r.end_date), r.end_date))
                .ok_or_else(|| FetchError::missing(url, "no reports published for this slug"))?;
            info!(report_end_date = %latest.end_date, "Selected latest report");
            Ok(vec![latest])
        },
        FetchMode::OnDate(date) => {
            let matching: Vec<_> = planned
                .into_iter()
                .filter(|r| r.report_date == Some(date))
                .collect();
            if matching.is_empty() {
                return Err(FetchError::missing(url, format!("no report dated {}", date)).into());
            }
            Ok(matching)
        },
        FetchMode::Historical { start, end } => {
            if start > end {
                return Err(IngestError::Config(format!(
                    "Historical range start {} is after end {}",
                    start, end
                )));
            }

            let matching: Vec<_> = planned
                .into_iter()
                .filter(|r| start <= r.end_date && r.end_date <= end)
                .collect();

            if matching.is_empty() {
                warn!(%start, %end, "No reports found in date range");
            } else {
                info!(%start, %end, reports = matching.len(), "Found reports in date range");
            }

            Ok(matching)
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn metadata(report_date: &str, end_date: &str) -> ReportMetadata {
        ReportMetadata {
            report_date: Some(report_date.to_string()),
            report_end_date: Some(end_date.to_string()),
            ..ReportMetadata::default()
        }
    }

    fn listing() -> Vec<ReportMetadata> {
        vec![
            metadata("12/27/2024", "12/26/2024"),
            metadata("12/24/2024", "12/23/2024"),
            metadata("12/30/2024", "12/27/2024"),
            metadata("12/31/2024", "not a date"),
        ]
    }

    #[test]
    fn test_latest_picks_most_recent_report_date() {
        let planned = select_reports(listing(), FetchMode::Latest, "u").unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].end_date, date("2024-12-27"));
        assert_eq!(planned[0].report_date, Some(date("2024-12-30")));
    }

    #[test]
    fn test_latest_with_no_reports_is_fetch_error() {
        let err = select_reports(vec![], FetchMode::Latest, "u").unwrap_err();
        assert!(matches!(err, IngestError::Fetch(ref e) if !e.is_retriable()));
    }

    #[test]
    fn test_on_date() {
        let planned =
            select_reports(listing(), FetchMode::OnDate(date("2024-12-24")), "u").unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].end_date, date("2024-12-23"));

        let err =
            select_reports(listing(), FetchMode::OnDate(date("2024-12-25")), "u").unwrap_err();
        assert!(matches!(err, IngestError::Fetch(_)));
    }

    #[test]
    fn test_historical_range_is_inclusive_and_ordered() {
        let mode = FetchMode::Historical {
            start: date("2024-12-23"),
            end: date("2024-12-26"),
        };
        let planned = select_reports(listing(), mode, "u").unwrap();
        let ends: Vec<_> = planned.iter().map(|r| r.end_date).collect();
        assert_eq!(ends, vec![date("2024-12-23"), date("2024-12-26")]);
    }

    #[test]
    fn test_historical_empty_range_is_not_an_error() {
        let mode = FetchMode::Historical {
            start: date("2023-01-01"),
            end: date("2023-01-31"),
        };
        assert!(select_reports(listing(), mode, "u").unwrap().is_empty());
    }

    #[test]
    fn test_historical_inverted_range_is_config_error() {
        let mode = FetchMode::Historical {
            start: date("2024-12-31"),
            end: date("2024-12-01"),
        };
        assert!(matches!(
            select_reports(listing(), mode, "u"),
            Err(IngestError::Config(_))
        ));
    }
}
