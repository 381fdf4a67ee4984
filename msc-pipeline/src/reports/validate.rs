//! Data file validation
//!
//! The model is detected from the JSON shape, first match wins:
//!
//! | Shape                                   | Model            |
//! |-----------------------------------------|------------------|
//! | object with `rankings` and `year`       | `RankingResults` |
//! | array whose first item has `track`      | `TrackWithStats` |
//! | array whose first item has `title` and `artists` | `Track` |
//!
//! Every array item is then deserialized on its own so one bad entry does
//! not hide the others.

use crate::models::{RankingResults, Track, TrackWithStats};
use crate::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Tracks,
    EnrichedTracks,
    Rankings,
}

impl DataKind {
    /// Detect the model held by `value`
    pub fn detect(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) if map.contains_key("rankings") && map.contains_key("year") => {
                Some(DataKind::Rankings)
            }
            Value::Array(items) => {
                let first = items.first()?.as_object()?;
                if first.contains_key("track") {
                    Some(DataKind::EnrichedTracks)
                } else if first.contains_key("title") && first.contains_key("artists") {
                    Some(DataKind::Tracks)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn model_name(&self) -> &'static str {
        match self {
            DataKind::Tracks => "Track",
            DataKind::EnrichedTracks => "TrackWithStats",
            DataKind::Rankings => "RankingResults",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// `None` when the shape matched no model
    pub kind: Option<DataKind>,
    /// Items checked: array length, or 1 for rankings
    pub items: usize,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.kind.is_some() && self.errors.is_empty()
    }
}

/// Read and validate a JSON file
///
/// Fails only when the file cannot be read or is not JSON at all.
pub fn validate_file(path: &Path) -> Result<ValidationReport> {
    let content = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    let report = validate_value(&value);
    debug!(
        "Validated {}: {:?}, {} errors",
        path.display(),
        report.kind,
        report.errors.len()
    );
    Ok(report)
}

pub fn validate_value(value: &Value) -> ValidationReport {
    let Some(kind) = DataKind::detect(value) else {
        return ValidationReport {
            kind: None,
            items: 0,
            errors: vec!["Unable to detect file type from structure".to_string()],
        };
    };

    let (items, errors) = match kind {
        DataKind::Tracks => check_items::<Track>(value),
        DataKind::EnrichedTracks => check_items::<TrackWithStats>(value),
        DataKind::Rankings => match serde_json::from_value::<RankingResults>(value.clone()) {
            Ok(_) => (1, Vec::new()),
            Err(e) => (1, vec![format!("root: {}", e)]),
        },
    };

    ValidationReport {
        kind: Some(kind),
        items,
        errors,
    }
}

fn check_items<T: DeserializeOwned>(value: &Value) -> (usize, Vec<String>) {
    let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
    let errors = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            serde_json::from_value::<T>(item.clone())
                .err()
                .map(|e| format!("item {}: {}", i, e))
        })
        .collect();
    (items.len(), errors)
}
