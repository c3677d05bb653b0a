//! Raw records as produced by the Source Adapter
//!
//! Each upstream report vintage gets its own variant so the normalizer maps
//! every vintage through an explicit, exhaustive match.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One raw upstream record, tagged by report vintage
#[derive(Debug, Clone)]
pub enum RawRecord {
    /// Current MARS API vintage: full metadata plus a section item
    Mars(MarsRecord),
    /// CSV export vintage: narrow field set, no report metadata
    Legacy(LegacyRecord),
}

impl RawRecord {
    pub fn vintage(&self) -> &'static str {
        match self {
            RawRecord::Mars(_) => "mars",
            RawRecord::Legacy(_) => "legacy",
        }
    }
}

/// Report-level metadata from `GET /reports/{slug_id}`
///
/// Every field is kept as the upstream text; dates are parsed by the normalizer
/// so a malformed metadata date never aborts a fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub slug_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub slug_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub report_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub report_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub report_begin_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub report_end_date: Option<String>,
    #[serde(default, alias = "published_Date", deserialize_with = "lenient_string")]
    pub published_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub office_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub office_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub office_city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub office_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub market_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub final_ind: Option<String>,
}

/// A section item enriched with the report it belongs to
#[derive(Debug, Clone)]
pub struct MarsRecord {
    /// Shared by every item of the same report
    pub report: Arc<ReportMetadata>,
    pub slug_id: String,
    /// Section the item was requested from, e.g. `Report FIS Cattle`
    pub section: String,
    pub item: Map<String, Value>,
}

impl MarsRecord {
    /// Text value of an item field; `None` when missing or null
    pub fn text(&self, key: &str) -> Option<String> {
        self.item.get(key).and_then(value_to_string)
    }
}

/// One row of a legacy CSV export
///
/// Columns missing from the file deserialize as blank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyRecord {
    pub office_name: String,
    pub office_code: String,
    pub office_city: String,
    pub office_state: String,
    pub description: String,
    pub commodity: String,
    pub class: String,
    pub slaughter_date: String,
    pub volume: String,
    pub unit: String,
    pub section: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub region: String,
}

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

// MARS returns some identifiers as numbers and others as strings.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_string))
}
