//! Common types used across the livestock workspace

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LivestockError, Result};

// ============================================================================
// Datasets
// ============================================================================

/// One of the four logical datasets an observation can belong to.
///
/// All four share the [`ObservationRow`] shape and live in separate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Daily head counts slaughtered under federal inspection
    Slaughter,
    /// Red meat production and live/dressed weights
    Production,
    /// Share of head slaughtered by class
    HeadPercent,
    /// Regional breakdown of slaughter
    Region,
}

impl Dataset {
    /// Every dataset, in table creation order
    pub const ALL: [Dataset; 4] = [
        Dataset::Slaughter,
        Dataset::Production,
        Dataset::HeadPercent,
        Dataset::Region,
    ];

    /// Destination table for this dataset
    pub fn table_name(self) -> &'static str {
        match self {
            Dataset::Slaughter => "cattle_slaughter",
            Dataset::Production => "cattle_meat_production",
            Dataset::HeadPercent => "cattle_head_percent",
            Dataset::Region => "cattle_slaughter_region",
        }
    }

    /// Short identifier used in logs and on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            Dataset::Slaughter => "slaughter",
            Dataset::Production => "production",
            Dataset::HeadPercent => "head_percent",
            Dataset::Region => "region",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dataset {
    type Err = LivestockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "slaughter" => Ok(Dataset::Slaughter),
            "production" => Ok(Dataset::Production),
            "head_percent" | "head-percent" => Ok(Dataset::HeadPercent),
            "region" => Ok(Dataset::Region),
            _ => Err(LivestockError::UnknownDataset(s.to_string())),
        }
    }
}

// ============================================================================
// Observations
// ============================================================================

/// Canonical record shared by the four datasets.
///
/// Optional categorical fields use `None` when the report vintage the row came
/// from does not carry the field at all, and `Some("")` when the vintage carries
/// it but the value was left blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub office_name: Option<String>,
    pub office_code: Option<String>,
    pub office_city: Option<String>,
    pub office_state: Option<String>,

    pub report_date: Option<NaiveDate>,
    pub report_begin_date: Option<NaiveDate>,
    pub report_end_date: Option<NaiveDate>,
    pub published_date: Option<NaiveDateTime>,

    pub market_type: Option<String>,
    pub slug_id: Option<String>,
    pub slug_name: Option<String>,
    pub report_title: Option<String>,
    pub group: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub commodity: Option<String>,
    pub class: Option<String>,
    pub section: Option<String>,
    #[serde(rename = "type")]
    pub report_type: Option<String>,
    pub region: Option<String>,

    /// Primary time axis
    pub slaughter_date: NaiveDate,

    /// Measured value; `None` when the source value was redacted or non-numeric
    pub volume: Option<BigDecimal>,
    pub unit: Option<String>,
}

impl ObservationRow {
    /// Create a row with every optional field absent
    pub fn new(slaughter_date: NaiveDate) -> Self {
        Self {
            office_name: None,
            office_code: None,
            office_city: None,
            office_state: None,
            report_date: None,
            report_begin_date: None,
            report_end_date: None,
            published_date: None,
            market_type: None,
            slug_id: None,
            slug_name: None,
            report_title: None,
            group: None,
            category: None,
            description: None,
            commodity: None,
            class: None,
            section: None,
            report_type: None,
            region: None,
            slaughter_date,
            volume: None,
            unit: None,
        }
    }

    /// Identity of the real-world observation this row describes.
    ///
    /// Two rows with the same key are the same observation, possibly revised.
    pub fn natural_key(&self) -> NaturalKey {
        let description = self
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or(self.commodity.as_deref());

        NaturalKey {
            office_code: key_part(self.office_code.as_deref()),
            slaughter_date: self.slaughter_date,
            class: key_part(self.class.as_deref()),
            description: key_part(description),
            region: key_part(self.region.as_deref()),
        }
    }
}

fn key_part(value: Option<&str>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Natural identity of an observation:
/// `(office_code, slaughter_date, class, description-or-commodity, region)`.
///
/// Absent and blank components are both encoded as the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub office_code: String,
    pub slaughter_date: NaiveDate,
    pub class: String,
    pub description: String,
    pub region: String,
}

impl NaturalKey {
    /// Stable single-column encoding stored in the `natural_key` column.
    ///
    /// Components are joined with `|`; backslashes and pipes inside a component
    /// are escaped so distinct keys never collide.
    ///
    /// # Examples
    ///
    /// ```
    /// use livestock_common::types::ObservationRow;
    ///
    /// let mut row = ObservationRow::new("2024-01-02".parse().unwrap());
    /// row.office_code = Some("AMS01".to_string());
    /// row.class = Some("Steers".to_string());
    /// row.description = Some("Fed Cattle".to_string());
    /// assert_eq!(row.natural_key().encode(), "AMS01|2024-01-02|Steers|Fed Cattle|");
    /// ```
    pub fn encode(&self) -> String {
        let date = self.slaughter_date.format("%Y-%m-%d").to_string();
        [
            self.office_code.as_str(),
            date.as_str(),
            self.class.as_str(),
            self.description.as_str(),
            self.region.as_str(),
        ]
        .iter()
        .map(|part| escape_key_part(part))
        .collect::<Vec<_>>()
        .join("|")
    }
}

fn escape_key_part(part: &str) -> String {
    part.replace('\\', "\\\\").replace('|', "\\|")
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A persisted observation with its system-managed timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObservation {
    pub dataset: Dataset,
    pub row: ObservationRow,
    /// Set once on first insert
    pub created_at: DateTime<Utc>,
    /// Refreshed on every update
    pub updated_at: DateTime<Utc>,
}

impl StoredObservation {
    /// Convert to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
