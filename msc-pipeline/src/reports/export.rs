//! Flat CSV export of enriched tracks
//!
//! One row per track. Fixed track columns come first, followed by one column
//! per metric name seen in any track (sorted). Multi-valued fields are joined
//! with `"; "`; a metric a track lacks is left empty.

use crate::models::TrackWithStats;
use crate::storage::atomic;
use crate::{PipelineError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

const TRACK_COLUMNS: [&str; 7] = [
    "track_id",
    "title",
    "artists",
    "year",
    "genres",
    "labels",
    "external_id",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub bytes: usize,
}

/// Write `tracks` to `path` as CSV, replacing any existing file atomically
pub fn export_csv(tracks: &[TrackWithStats], path: &Path) -> Result<ExportSummary> {
    let metrics: BTreeSet<&str> = tracks
        .iter()
        .flat_map(|t| t.stats.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());

    let header: Vec<&str> = TRACK_COLUMNS.iter().copied().chain(metrics.iter().copied()).collect();
    writer.write_record(&header)?;

    for item in tracks {
        let track = &item.track;
        let mut row = vec![
            item.identifier(),
            track.title.clone(),
            track.artists.join("; "),
            track.year.to_string(),
            track.genres.join("; "),
            track.labels.join("; "),
            track.external_id.clone().unwrap_or_default(),
        ];
        row.extend(
            metrics
                .iter()
                .map(|name| item.stat(name).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))?;
    atomic::write_bytes(path, &bytes)?;

    info!("Exported {} tracks to {}", tracks.len(), path.display());
    Ok(ExportSummary {
        path: path.to_path_buf(),
        rows: tracks.len(),
        columns: header.len(),
        bytes: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Track;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn enriched(title: &str, artists: &[&str], stats: &[(&str, f64)]) -> TrackWithStats {
        let mut track = Track::new(title, artists.iter().map(|a| a.to_string()).collect(), 2025);
        track.external_id = Some(format!("ext-{}", title));
        let stats: BTreeMap<String, f64> =
            stats.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        TrackWithStats::new(track, stats)
    }

    #[test]
    fn test_metric_columns_are_the_union() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("output").join("export_2025.csv");
        let tracks = vec![
            enriched("One", &["A", "B"], &[("spotify_streams", 10.0)]),
            enriched("Two, Part 2", &["C"], &[("deezer_fans", 3.5)]),
        ];

        let summary = export_csv(&tracks, &path).unwrap();

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.columns, 9);
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(&header[7..], ["deezer_fans", "spotify_streams"]);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][2], "A; B");
        assert_eq!(&rows[0][7], "");
        assert_eq!(&rows[0][8], "10");
        // quoting keeps the comma inside the title
        assert_eq!(&rows[1][1], "Two, Part 2");
        assert_eq!(&rows[1][7], "3.5");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_empty_export_has_header_only() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("export.csv");

        let summary = export_csv(&[], &path).unwrap();

        assert_eq!(summary.rows, 0);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "track_id,title,artists,year,genres,labels,external_id\n");
    }
}
