//! Domain models flowing between pipeline stages
//!
//! - `Track`: a candidate item from the track source, optionally resolved
//!   to an external catalogue id by the extraction stage
//! - `TrackWithStats`: a resolved track plus its metrics (enrichment output)
//! - `RankingResults`: scored and ordered tracks (ranking output)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable storage key
///
/// Repositories, checkpoints and the review queue all address items by
/// this key, so it must not change between runs.
pub trait Keyed {
    fn key(&self) -> String;
}

/// Candidate track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,

    /// Artist names, primary artist first
    pub artists: Vec<String>,

    pub year: i32,

    #[serde(default)]
    pub genres: Vec<String>,

    #[serde(default)]
    pub labels: Vec<String>,

    /// Catalogue id, set once the track has been resolved
    #[serde(default)]
    pub external_id: Option<String>,

    /// Title as the catalogue knows it
    #[serde(default)]
    pub external_title: Option<String>,

    /// Query used for the last lookup, kept for debugging unmatched tracks
    #[serde(default)]
    pub search_query: Option<String>,
}

impl Track {
    pub fn new(title: impl Into<String>, artists: Vec<String>, year: i32) -> Self {
        Self {
            title: title.into(),
            artists,
            year,
            genres: Vec::new(),
            labels: Vec::new(),
            external_id: None,
            external_title: None,
            search_query: None,
        }
    }

    /// First artist, or an empty string when no artist is known
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }

    /// Artists joined by ", "
    pub fn all_artists(&self) -> String {
        self.artists.join(", ")
    }

    /// `{primary_artist}_{title}_{year}`, lower-cased with spaces replaced by `_`
    pub fn identifier(&self) -> String {
        format!(
            "{}_{}_{}",
            normalize(self.primary_artist()),
            normalize(&self.title),
            self.year
        )
    }

    pub fn is_resolved(&self) -> bool {
        self.external_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Short "artist - title" label for log and event messages
    pub fn label(&self) -> String {
        format!("{} - {}", self.primary_artist(), self.title)
    }
}

fn normalize(value: &str) -> String {
    value.to_lowercase().replace(' ', "_")
}

impl Keyed for Track {
    fn key(&self) -> String {
        self.identifier()
    }
}

/// Track with fetched metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackWithStats {
    pub track: Track,

    /// Metric name to value, e.g. `spotify_streams`
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
}

impl TrackWithStats {
    pub fn new(track: Track, stats: BTreeMap<String, f64>) -> Self {
        Self { track, stats }
    }

    pub fn identifier(&self) -> String {
        self.track.identifier()
    }

    pub fn stat(&self, name: &str) -> Option<f64> {
        self.stats.get(name).copied()
    }
}

impl Keyed for TrackWithStats {
    fn key(&self) -> String {
        self.identifier()
    }
}

/// One ranked track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTrack {
    /// 1 = highest score
    pub rank: usize,
    pub track_id: String,
    pub artist: String,
    pub title: String,
    pub score: f64,
}

/// Ranking output for one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResults {
    pub year: i32,
    pub generated_at: DateTime<Utc>,
    /// Sorted by score, highest first
    pub rankings: Vec<RankedTrack>,
}

impl RankingResults {
    pub fn new(year: i32, rankings: Vec<RankedTrack>) -> Self {
        Self {
            year,
            generated_at: msc_common::time::now(),
            rankings,
        }
    }

    pub fn total_tracks(&self) -> usize {
        self.rankings.len()
    }

    pub fn top(&self) -> Option<&RankedTrack> {
        self.rankings.first()
    }
}
