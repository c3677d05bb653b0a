// USDA MARS (Market News) source
//
// Pulls the Actual Slaughter Under Federal Inspection report (slug 3658 by
// default) from the MARS API:
// - Metadata: GET /services/{version}/reports/{slug_id}
// - Sections: GET /services/{version}/reports/{slug_id}/{section}?q=report_end_date=MM/DD/YYYY
//
// Each section item is enriched with its report's metadata and the section
// name before it is handed to the normalizer.

pub mod client;
pub mod source;

use futures::stream::BoxStream;

use crate::error::Result;
use crate::record::RawRecord;

pub use client::MarsClient;
pub use source::{select_reports, FetchMode, MarsSource, PlannedReport};

/// Lazy sequence of raw records; the first error ends the stream
pub type RecordStream<'a> = BoxStream<'a, Result<RawRecord>>;

/// Sections of the federally inspected slaughter report, in fetch order
pub const SECTIONS: [&str; 5] = [
    "Report FIS Species",
    "Report FIS Cattle",
    "Report FIS Meat Production",
    "Report FIS Head Percent",
    "Report FIS Region",
];
