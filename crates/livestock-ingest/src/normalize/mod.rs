//! Row Normalizer
//!
//! Maps one [`RawRecord`] to zero or one [`ObservationRow`]. Zero rows means the
//! record was a header, footer, or blank artifact, or a data row for a species
//! other than adult cattle; a record that should have been data but cannot be
//! placed yields a [`NormalizationError`].

pub mod dates;
pub mod routing;
pub mod volume;

use chrono::NaiveDate;
use livestock_common::{Dataset, ObservationRow};
use tracing::warn;

use crate::error::NormalizationError;
use crate::record::{LegacyRecord, MarsRecord, RawRecord};

/// Prefixes that mark footnote rows in report exports
const FOOTNOTE_PREFIXES: [&str; 4] = ["source:", "note:", "notes:", "*"];

/// Commodities that share the FIS sections with cattle but are not ingested
const EXCLUDED_COMMODITY_MARKERS: [&str; 1] = ["calves"];

/// Outcome of normalizing one record
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Row {
        dataset: Dataset,
        row: Box<ObservationRow>,
    },
    /// Not a data row; skipped and counted separately from failures
    Artifact,
    /// A data row for a species other than adult cattle (hogs, sheep, calves)
    Excluded { commodity: String },
}

/// Stateless mapper from raw records to observation rows
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    reference_date: Option<NaiveDate>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor for day offsets in records that carry no report date
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn normalize(&self, record: &RawRecord) -> Result<Normalized, NormalizationError> {
        match record {
            RawRecord::Mars(record) => self.normalize_mars(record),
            RawRecord::Legacy(record) => self.normalize_legacy(record),
        }
    }

    fn normalize_mars(&self, record: &MarsRecord) -> Result<Normalized, NormalizationError> {
        let report = &record.report;
        let text = |key: &str| record.text(key).map(|v| v.trim().to_string());
        let raw_date = text("slaughter_date").unwrap_or_default();
        let raw_volume = record.item.get("volume");
        let volume_blank = raw_volume
            .and_then(crate::record::value_to_string)
            .map_or(true, |v| v.trim().is_empty());

        let labels = [
            "description",
            "commodity",
            "class",
            "category",
            "group",
            "region",
            "type",
        ]
        .map(|key| text(key).unwrap_or_default());
        if is_artifact(&raw_date, volume_blank, &labels[0], &labels) {
            return Ok(Normalized::Artifact);
        }
        if !is_cattle_commodity(&labels[1]) {
            return Ok(Normalized::Excluded {
                commodity: labels[1].clone(),
            });
        }

        let report_date = metadata_date(report.report_date.as_deref(), "report_date");
        let slaughter_date = dates::resolve_slaughter_date(Some(&raw_date), report_date)?;

        // MARS carries every categorical field: a missing key is "reported as empty".
        let present = |key: &str| Some(text(key).unwrap_or_default());
        let metadata_or_item = |meta: Option<&String>, key: &str| {
            meta.map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or_else(|| present(key))
        };

        let mut row = ObservationRow::new(slaughter_date);
        row.office_name = metadata_or_item(report.office_name.as_ref(), "office_name");
        row.office_code = metadata_or_item(report.office_code.as_ref(), "office_code");
        row.office_city = metadata_or_item(report.office_city.as_ref(), "office_city");
        row.office_state = metadata_or_item(report.office_state.as_ref(), "office_state");

        row.report_date = report_date;
        row.report_begin_date =
            metadata_date(report.report_begin_date.as_deref(), "report_begin_date");
        row.report_end_date = metadata_date(report.report_end_date.as_deref(), "report_end_date");
        row.published_date = report.published_date.as_deref().and_then(|raw| {
            let parsed = dates::parse_timestamp(raw);
            if parsed.is_none() && !raw.trim().is_empty() {
                warn!(field = "published_date", value = raw, "Unparseable report timestamp");
            }
            parsed
        });

        row.market_type = metadata_or_item(report.market_type.as_ref(), "market_type");
        row.slug_id = Some(record.slug_id.clone());
        row.slug_name = report
            .slug_name
            .as_ref()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| Some(format!("AMS_{}", record.slug_id)));
        row.report_title = metadata_or_item(report.report_title.as_ref(), "report_title");
        row.section = Some(record.section.trim().to_string());
        row.group = present("group");
        row.category = present("category");
        row.description = present("description");
        row.commodity = present("commodity");
        row.class = present("class");
        row.report_type = present("type");
        row.region = present("region");
        row.unit = present("unit");
        row.volume = raw_volume.and_then(volume::parse_volume_value);

        let dataset = routing::route(
            row.section.as_deref(),
            row.category.as_deref(),
            row.description.as_deref(),
        )?;

        Ok(Normalized::Row {
            dataset,
            row: Box::new(row),
        })
    }

    fn normalize_legacy(&self, record: &LegacyRecord) -> Result<Normalized, NormalizationError> {
        let labels = [
            &record.office_name,
            &record.office_code,
            &record.description,
            &record.commodity,
            &record.class,
            &record.region,
            &record.report_type,
            &record.section,
        ]
        .map(|v| v.trim().to_string());
        let raw_date = record.slaughter_date.trim();
        if is_artifact(raw_date, record.volume.trim().is_empty(), &labels[2], &labels) {
            return Ok(Normalized::Artifact);
        }
        if !is_cattle_commodity(&labels[3]) {
            return Ok(Normalized::Excluded {
                commodity: labels[3].clone(),
            });
        }

        let slaughter_date = dates::resolve_slaughter_date(Some(raw_date), self.reference_date)?;
        let carried = |v: &String| Some(v.trim().to_string());

        // Fields this vintage never carried stay None.
        let mut row = ObservationRow::new(slaughter_date);
        row.office_name = carried(&record.office_name);
        row.office_code = carried(&record.office_code);
        row.office_city = carried(&record.office_city);
        row.office_state = carried(&record.office_state);
        row.description = carried(&record.description);
        row.commodity = carried(&record.commodity);
        row.class = carried(&record.class);
        row.section = carried(&record.section);
        row.report_type = carried(&record.report_type);
        row.region = carried(&record.region);
        row.unit = carried(&record.unit);
        row.volume = volume::parse_volume(&record.volume);

        let dataset = routing::route(row.section.as_deref(), None, row.description.as_deref())?;

        Ok(Normalized::Row {
            dataset,
            row: Box::new(row),
        })
    }
}

/// Parse a report metadata date; failures are logged and treated as absent
fn metadata_date(raw: Option<&str>, field: &'static str) -> Option<NaiveDate> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let parsed = dates::parse_calendar_date(raw);
    if parsed.is_none() {
        warn!(field, value = raw, "Unparseable report metadata date");
    }
    parsed
}

/// Blank commodity passes: several sections leave it empty for cattle rows.
fn is_cattle_commodity(commodity: &str) -> bool {
    let lower = commodity.trim().to_lowercase();
    lower.is_empty()
        || (lower.contains("cattle")
            && !EXCLUDED_COMMODITY_MARKERS.iter().any(|m| lower.contains(m)))
}

/// Blank, header and footnote rows carry no observation
fn is_artifact(raw_date: &str, volume_blank: bool, description: &str, labels: &[String]) -> bool {
    let date_blank = raw_date.trim().is_empty();

    if date_blank && volume_blank && labels.iter().all(|l| l.is_empty()) {
        return true;
    }

    // Repeated header row
    if raw_date.eq_ignore_ascii_case("slaughter_date")
        || description.trim().eq_ignore_ascii_case("description")
    {
        return true;
    }

    date_blank
        && volume_blank
        && labels.iter().any(|l| {
            let lower = l.to_lowercase();
            FOOTNOTE_PREFIXES.iter().any(|p| lower.starts_with(p))
        })
}
