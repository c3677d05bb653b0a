//! Tolerant parsing of measured values

use bigdecimal::BigDecimal;
use regex::Regex;
use serde_json::Value;
use std::str::FromStr;
use std::sync::LazyLock;

// Number followed by an optional unit suffix such as `head`, `lbs.`, `%`.
#[allow(clippy::expect_used)]
static VOLUME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:\d+(?:\.\d*)?|\.\d+))(?:[A-Za-z%][A-Za-z%./]*)?$")
        .expect("volume pattern is a valid regex")
});

/// Parse a volume cell.
///
/// Whitespace and thousands separators are ignored, a leading `$` and a
/// trailing unit suffix are tolerated. Anything else yields `None`: the row
/// is kept and only the measurement is missing.
///
/// ```
/// use livestock_ingest::normalize::volume::parse_volume;
///
/// assert_eq!(parse_volume("1,234,567"), parse_volume(" 1234567 "));
/// assert_eq!(parse_volume("45,000 head").unwrap().to_string(), "45000");
/// assert_eq!(parse_volume("(D)"), None);
/// ```
pub fn parse_volume(raw: &str) -> Option<BigDecimal> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let compact = compact.strip_prefix('$').unwrap_or(&compact);

    let captures = VOLUME_PATTERN.captures(compact)?;
    let number = captures.get(1)?.as_str();
    BigDecimal::from_str(number).ok()
}

/// Parse a volume from a JSON value; numbers are taken as-is
pub fn parse_volume_value(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        Value::String(s) => parse_volume(s),
        _ => None,
    }
}
