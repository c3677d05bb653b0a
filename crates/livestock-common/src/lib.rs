//! Livestock Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the livestock dashboard workspace.
//!
//! # Overview
//!
//! - **Types**: the canonical observation row shared by the four slaughter datasets
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Error Handling**: error and result types for the shared types
//!
//! # Example
//!
//! ```no_run
//! use livestock_common::types::{Dataset, ObservationRow};
//!
//! let mut row = ObservationRow::new("2024-01-02".parse().unwrap());
//! row.office_code = Some("AMS01".to_string());
//! row.class = Some("Steers".to_string());
//! println!("{} -> {}", row.natural_key(), Dataset::Slaughter.table_name());
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{LivestockError, Result};
pub use types::{Dataset, NaturalKey, ObservationRow, StoredObservation};
