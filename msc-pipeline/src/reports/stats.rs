//! Dataset statistics for enriched tracks

use crate::models::TrackWithStats;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetStats {
    pub total_tracks: usize,
    /// Metric name to number of tracks with a non-zero value
    pub coverage: BTreeMap<String, usize>,
}

impl DatasetStats {
    pub fn from_tracks(tracks: &[TrackWithStats]) -> Self {
        let mut coverage: BTreeMap<String, usize> = BTreeMap::new();
        for track in tracks {
            for (name, value) in &track.stats {
                let count = coverage.entry(name.clone()).or_default();
                if *value != 0.0 {
                    *count += 1;
                }
            }
        }

        Self {
            total_tracks: tracks.len(),
            coverage,
        }
    }

    /// Share of tracks covered by `metric`, in percent
    pub fn coverage_pct(&self, metric: &str) -> f64 {
        if self.total_tracks == 0 {
            return 0.0;
        }
        let count = self.coverage.get(metric).copied().unwrap_or(0);
        count as f64 / self.total_tracks as f64 * 100.0
    }
}
