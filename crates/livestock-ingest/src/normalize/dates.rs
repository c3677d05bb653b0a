//! Date parsing across report vintages

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::NormalizationError;

/// Largest day offset accepted as report-relative; larger integers are not dates.
const MAX_DAY_OFFSET: i64 = 3_660;

/// A date cell as written by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    Calendar(NaiveDate),
    /// Days relative to the report date, e.g. `-1` for the day before
    Offset(i64),
}

/// Parse a calendar date in any supported representation
///
/// Accepts `YYYY-MM-DD`, `MM/DD/YYYY`, `MM/DD/YY`, and date-times whose date
/// part is one of those (`2024-01-02T00:00:00Z`, `01/02/2024 08:15:00`).
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // Date-times: keep the date part
    if let Some((date, _time)) = s.split_once(['T', ' ']) {
        return parse_plain_date(date);
    }

    parse_plain_date(s)
}

fn parse_plain_date(s: &str) -> Option<NaiveDate> {
    if s.contains('/') {
        let year_len = s.rsplit('/').next().map(str::len)?;
        return match year_len {
            4 => NaiveDate::parse_from_str(s, "%m/%d/%Y").ok(),
            2 => NaiveDate::parse_from_str(s, "%m/%d/%y").ok(),
            _ => None,
        };
    }

    if s.len() == 10 {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    }

    None
}

/// Parse a publication timestamp
///
/// MARS writes `MM/DD/YYYY HH:MM:SS`; ISO and RFC 3339 forms are accepted too,
/// and a bare date is taken as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    for format in [
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }

    parse_calendar_date(s).map(|d| d.and_time(NaiveTime::MIN))
}

/// Classify a date cell as a calendar date or a report-relative offset
pub fn parse_date_value(raw: &str) -> Option<DateValue> {
    let s = raw.trim();

    if let Ok(offset) = s.parse::<i64>() {
        return (offset.abs() <= MAX_DAY_OFFSET).then_some(DateValue::Offset(offset));
    }

    parse_calendar_date(s).map(DateValue::Calendar)
}

/// Resolve a slaughter date cell, using `anchor` for relative offsets
pub fn resolve_slaughter_date(
    raw: Option<&str>,
    anchor: Option<NaiveDate>,
) -> Result<NaiveDate, NormalizationError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(
        NormalizationError::MissingField {
            field: "slaughter_date",
        },
    )?;

    match parse_date_value(raw) {
        Some(DateValue::Calendar(date)) => Ok(date),
        Some(DateValue::Offset(offset)) => {
            let anchor = anchor.ok_or(NormalizationError::UnresolvableDateOffset { offset })?;
            let days = Days::new(offset.unsigned_abs());
            let resolved = if offset < 0 {
                anchor.checked_sub_days(days)
            } else {
                anchor.checked_add_days(days)
            };
            resolved.ok_or_else(|| invalid_slaughter_date(raw))
        },
        None => Err(invalid_slaughter_date(raw)),
    }
}

fn invalid_slaughter_date(raw: &str) -> NormalizationError {
    NormalizationError::InvalidDate {
        field: "slaughter_date",
        value: raw.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_calendar_formats() {
        let expected = date("2024-01-02");
        for raw in [
            "2024-01-02",
            "01/02/2024",
            "1/2/2024",
            "01/02/24",
            " 2024-01-02 ",
            "2024-01-02T00:00:00Z",
            "2024-01-02T13:45:10.123",
            "01/02/2024 08:15:00",
        ] {
            assert_eq!(parse_calendar_date(raw), Some(expected), "{raw:?}");
        }
    }

    #[test]
    fn test_rejects_non_dates() {
        for raw in ["", "N/A", "2024/01/02/03", "13/45/2024", "20240102", "Jan 2"] {
            assert_eq!(parse_calendar_date(raw), None, "{raw:?}");
        }
    }

    #[test]
    fn test_timestamps() {
        let expected = date("2024-12-27").and_hms_opt(15, 2, 11).unwrap();
        assert_eq!(parse_timestamp("12/27/2024 15:02:11"), Some(expected));
        assert_eq!(parse_timestamp("2024-12-27T15:02:11"), Some(expected));
        assert_eq!(parse_timestamp("2024-12-27T15:02:11+00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("12/27/2024"),
            Some(date("2024-12-27").and_time(NaiveTime::MIN))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_offsets_resolve_against_anchor() {
        let anchor = Some(date("2024-01-03"));
        assert_eq!(resolve_slaughter_date(Some("-1"), anchor), Ok(date("2024-01-02")));
        assert_eq!(resolve_slaughter_date(Some("0"), anchor), Ok(date("2024-01-03")));
        assert_eq!(resolve_slaughter_date(Some("+2"), anchor), Ok(date("2024-01-05")));
    }

    #[test]
    fn test_offset_without_anchor() {
        assert_eq!(
            resolve_slaughter_date(Some("-1"), None),
            Err(NormalizationError::UnresolvableDateOffset { offset: -1 })
        );
    }

    #[test]
    fn test_missing_and_invalid() {
        assert_eq!(
            resolve_slaughter_date(None, None),
            Err(NormalizationError::MissingField {
                field: "slaughter_date"
            })
        );
        assert_eq!(
            resolve_slaughter_date(Some("   "), None),
            Err(NormalizationError::MissingField {
                field: "slaughter_date"
            })
        );
        assert!(matches!(
            resolve_slaughter_date(Some("20240102"), None),
            Err(NormalizationError::InvalidDate { .. })
        ));
    }
}
