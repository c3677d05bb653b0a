//! Dataset routing
//!
//! Maps the upstream category taxonomy to one of the four datasets. The map is
//! closed: a category it does not list is an error, never a default.

use livestock_common::Dataset;

use crate::error::NormalizationError;

/// Section and category names, lowercased
const CATEGORY_MAP: &[(&str, Dataset)] = &[
    ("report fis species", Dataset::Slaughter),
    ("fis species", Dataset::Slaughter),
    ("species", Dataset::Slaughter),
    ("report fis cattle", Dataset::Slaughter),
    ("fis cattle", Dataset::Slaughter),
    ("cattle", Dataset::Slaughter),
    ("slaughter", Dataset::Slaughter),
    ("report fis meat production", Dataset::Production),
    ("fis meat production", Dataset::Production),
    ("meat production", Dataset::Production),
    ("production", Dataset::Production),
    ("report fis head percent", Dataset::HeadPercent),
    ("fis head percent", Dataset::HeadPercent),
    ("head percent", Dataset::HeadPercent),
    ("head percentage", Dataset::HeadPercent),
    ("report fis region", Dataset::Region),
    ("fis region", Dataset::Region),
    ("region", Dataset::Region),
    ("regional", Dataset::Region),
];

/// Description taxonomy, consulted only when section and category are blank
const DESCRIPTION_MAP: &[(&str, Dataset)] = &[
    ("head slaughtered", Dataset::Slaughter),
    ("fed cattle", Dataset::Slaughter),
    ("total head", Dataset::Slaughter),
    ("total red meat", Dataset::Production),
    ("red meat production", Dataset::Production),
    ("live weight", Dataset::Production),
    ("dressed weight", Dataset::Production),
    ("average live weight", Dataset::Production),
    ("average dressed weight", Dataset::Production),
    ("percent of total", Dataset::HeadPercent),
    ("percent of head", Dataset::HeadPercent),
    ("regional head slaughtered", Dataset::Region),
];

/// Pick the dataset for a row.
///
/// The routing key is the first non-blank of `section` and `category`. Only
/// when both are blank does the `description` decide.
pub fn route(
    section: Option<&str>,
    category: Option<&str>,
    description: Option<&str>,
) -> Result<Dataset, NormalizationError> {
    let key = [section, category]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty());

    if let Some(key) = key {
        return lookup(CATEGORY_MAP, key).ok_or_else(|| NormalizationError::UnrecognizedCategory {
            category: key.to_string(),
        });
    }

    let description = description.map(str::trim).unwrap_or_default();
    lookup(DESCRIPTION_MAP, description).ok_or_else(|| {
        NormalizationError::UnrecognizedCategory {
            category: description.to_string(),
        }
    })
}

fn lookup(map: &[(&str, Dataset)], key: &str) -> Option<Dataset> {
    let key = key.to_lowercase();
    map.iter()
        .find(|(name, _)| *name == key)
        .map(|(_, dataset)| *dataset)
}
