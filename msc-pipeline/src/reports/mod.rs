//! Offline reports over a run's data files
//!
//! - `validate`: detect which model a JSON file holds and check every item
//! - `export`: flatten enriched tracks into a CSV table
//! - `stats`: per-metric coverage of an enriched dataset

pub mod export;
pub mod stats;
pub mod validate;

pub use export::{export_csv, ExportSummary};
pub use stats::DatasetStats;
pub use validate::{validate_file, validate_value, DataKind, ValidationReport};
