//! External collaborators of the pipeline
//!
//! The engine only depends on these traits. Network-backed implementations
//! live outside this crate; `offline` provides file-backed ones so a run can
//! be driven end to end from local JSON.

pub mod offline;
pub mod scorer;

pub use offline::{CatalogueResolver, JsonStatsProvider, JsonTrackSource};
pub use scorer::WeightedSumScorer;

use crate::models::{RankedTrack, Track, TrackWithStats};
use std::collections::BTreeMap;

/// Provides the candidate tracks for a run
pub trait TrackSource {
    fn fetch_tracks(&self) -> anyhow::Result<Vec<Track>>;
}

/// Outcome of looking a track up in the external catalogue
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found {
        external_id: String,
        external_title: String,
    },
    NotFound {
        reason: String,
    },
    /// A candidate was found but judged a false positive
    Rejected {
        reason: String,
        candidate_title: String,
    },
}

/// Resolves tracks to external catalogue ids
pub trait TrackResolver {
    fn resolve(&self, track: &Track) -> anyhow::Result<Resolution>;
}

/// Fetches metrics for a resolved track
pub trait StatsProvider {
    fn fetch_stats(&self, external_id: &str) -> anyhow::Result<BTreeMap<String, f64>>;
}

/// Orders enriched tracks
pub trait Scorer {
    /// Ranked tracks, best first, ranks starting at 1
    fn rank(&self, tracks: &[TrackWithStats]) -> Vec<RankedTrack>;
}
