//! File-backed collaborators
//!
//! Input layout under `{data_dir}/input/`:
//! - `tracks.json`: JSON array of tracks
//! - `catalogue.json`: `{ track_identifier: { "external_id", "title" } }`
//! - `stats.json`: `{ external_id: { metric: value } }`

use super::{Resolution, StatsProvider, TrackResolver, TrackSource};
use crate::models::Track;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Catalogue titles containing one of these are treated as false positives
pub const REJECT_KEYWORDS: &[&str] = &["karaoke", "instrumental", "cover"];

/// Metrics with this prefix are only kept when YouTube data is requested
const YOUTUBE_PREFIX: &str = "youtube_";

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Tracks from a JSON array file, filtered to one year
#[derive(Debug, Clone)]
pub struct JsonTrackSource {
    path: PathBuf,
    year: i32,
}

impl JsonTrackSource {
    pub fn new(path: impl Into<PathBuf>, year: i32) -> Self {
        Self {
            path: path.into(),
            year,
        }
    }
}

impl TrackSource for JsonTrackSource {
    fn fetch_tracks(&self) -> anyhow::Result<Vec<Track>> {
        let tracks: Vec<Track> = read_json(&self.path)?;
        let total = tracks.len();
        let selected: Vec<Track> = tracks.into_iter().filter(|t| t.year == self.year).collect();
        info!(
            "Read {} tracks from {} ({} for year {})",
            total,
            self.path.display(),
            selected.len(),
            self.year
        );
        Ok(selected)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogueEntry {
    pub external_id: String,
    #[serde(default)]
    pub title: String,
}

/// Resolves tracks through a local catalogue file
///
/// Tracks that already carry an external id are passed through unchanged.
#[derive(Debug, Clone, Default)]
pub struct CatalogueResolver {
    entries: BTreeMap<String, CatalogueEntry>,
}

impl CatalogueResolver {
    pub fn new(entries: BTreeMap<String, CatalogueEntry>) -> Self {
        Self { entries }
    }

    /// Load the catalogue; a missing file gives an empty catalogue
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("No catalogue at {}, resolving pass-through only", path.display());
            return Ok(Self::default());
        }
        Ok(Self::new(read_json(path)?))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn reject_keyword(title: &str) -> Option<&'static str> {
    let lower = title.to_lowercase();
    REJECT_KEYWORDS.iter().copied().find(|k| lower.contains(k))
}

impl TrackResolver for CatalogueResolver {
    fn resolve(&self, track: &Track) -> anyhow::Result<Resolution> {
        if let Some(external_id) = track.external_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(Resolution::Found {
                external_id: external_id.to_string(),
                external_title: track
                    .external_title
                    .clone()
                    .unwrap_or_else(|| track.title.clone()),
            });
        }

        let Some(entry) = self.entries.get(&track.identifier()) else {
            return Ok(Resolution::NotFound {
                reason: "No catalogue entry found".to_string(),
            });
        };

        if let Some(keyword) = reject_keyword(&entry.title) {
            return Ok(Resolution::Rejected {
                reason: format!("Contains reject keyword: '{}'", keyword),
                candidate_title: entry.title.clone(),
            });
        }

        Ok(Resolution::Found {
            external_id: entry.external_id.clone(),
            external_title: if entry.title.is_empty() {
                track.title.clone()
            } else {
                entry.title.clone()
            },
        })
    }
}

/// Metrics from a JSON file keyed by external id
#[derive(Debug, Clone, Default)]
pub struct JsonStatsProvider {
    stats: BTreeMap<String, BTreeMap<String, f64>>,
    include_youtube: bool,
}

impl JsonStatsProvider {
    pub fn new(stats: BTreeMap<String, BTreeMap<String, f64>>, include_youtube: bool) -> Self {
        Self {
            stats,
            include_youtube,
        }
    }

    /// Load metrics; a missing file gives a provider with no stats
    pub fn from_file(path: &Path, include_youtube: bool) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("No stats at {}", path.display());
            return Ok(Self::new(BTreeMap::new(), include_youtube));
        }
        Ok(Self::new(read_json(path)?, include_youtube))
    }
}

impl StatsProvider for JsonStatsProvider {
    fn fetch_stats(&self, external_id: &str) -> anyhow::Result<BTreeMap<String, f64>> {
        let stats = self
            .stats
            .get(external_id)
            .ok_or_else(|| anyhow!("no stats available for {}", external_id))?;

        Ok(stats
            .iter()
            .filter(|(name, _)| self.include_youtube || !name.starts_with(YOUTUBE_PREFIX))
            .map(|(name, value)| (name.clone(), *value))
            .collect())
    }
}
