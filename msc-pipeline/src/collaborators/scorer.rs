//! Weighted-sum scorer
//!
//! Each weighted metric is min-max normalized across all tracks, multiplied
//! by its weight and summed. Equal values normalize to 0.5; a track missing
//! a metric (or holding a non-finite value) scores 0 for it.

use super::Scorer;
use crate::models::{RankedTrack, TrackWithStats};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct WeightedSumScorer {
    /// Metric name to weight; empty means every metric seen with weight 1
    weights: BTreeMap<String, f64>,
}

impl WeightedSumScorer {
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        Self { weights }
    }

    fn effective_weights(&self, tracks: &[TrackWithStats]) -> BTreeMap<String, f64> {
        if !self.weights.is_empty() {
            return self.weights.clone();
        }
        tracks
            .iter()
            .flat_map(|t| t.stats.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|name| (name, 1.0))
            .collect()
    }
}

fn normalize(values: &[Option<f64>]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    let (Some(min), Some(max)) = (
        finite.iter().copied().reduce(f64::min),
        finite.iter().copied().reduce(f64::max),
    ) else {
        return vec![0.0; values.len()];
    };

    values
        .iter()
        .map(|value| match value {
            Some(v) if v.is_finite() => {
                if max == min {
                    0.5
                } else {
                    (v - min) / (max - min)
                }
            }
            _ => 0.0,
        })
        .collect()
}

impl Scorer for WeightedSumScorer {
    fn rank(&self, tracks: &[TrackWithStats]) -> Vec<RankedTrack> {
        let weights = self.effective_weights(tracks);
        let mut totals = vec![0.0; tracks.len()];

        for (metric, weight) in &weights {
            let values: Vec<Option<f64>> = tracks.iter().map(|t| t.stat(metric)).collect();
            for (total, normalized) in totals.iter_mut().zip(normalize(&values)) {
                *total += normalized * weight;
            }
        }

        let mut scored: Vec<(&TrackWithStats, f64)> = tracks.iter().zip(totals).collect();
        // stable: equal scores keep input order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let rankings: Vec<RankedTrack> = scored
            .into_iter()
            .enumerate()
            .map(|(index, (track, score))| RankedTrack {
                rank: index + 1,
                track_id: track.identifier(),
                artist: track.track.all_artists(),
                title: track.track.title.clone(),
                score,
            })
            .collect();

        if let Some(top) = rankings.first() {
            info!(
                "Ranked {} tracks, top: {} - {} ({:.2})",
                rankings.len(),
                top.artist,
                top.title,
                top.score
            );
        }
        rankings
    }
}
