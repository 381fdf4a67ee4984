//! Manual review queue
//!
//! Items a stage could not resolve on its own are parked here for a human.
//! The queue is one JSON array file, loaded eagerly and rewritten
//! atomically on every change. Entries are keyed by `track_id`; the first
//! entry for a key wins.

use crate::storage::atomic;
use crate::{PipelineError, Result};
use chrono::{DateTime, Utc};
use msc_common::time;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Item waiting for human intervention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualReviewItem {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug)]
pub struct ManualReviewQueue {
    path: PathBuf,
    items: Vec<ManualReviewItem>,
}

impl ManualReviewQueue {
    /// Open the queue stored at `path`
    ///
    /// The parent directory is created. A missing file yields an empty
    /// queue; so does a corrupt one (logged).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = normalize_path(path.as_ref())?;
        let items = load_items(&path);
        Ok(Self { path, items })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue an item unless `track_id` is already present
    ///
    /// Returns true if the item was added and persisted.
    pub fn add(
        &mut self,
        track_id: &str,
        title: &str,
        artist: &str,
        reason: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<bool> {
        if self.contains(track_id) {
            debug!("Already queued for review: {}", track_id);
            return Ok(false);
        }

        self.items.push(ManualReviewItem {
            track_id: track_id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            reason: reason.to_string(),
            timestamp: time::now(),
            metadata: metadata.unwrap_or_default(),
        });
        if let Err(e) = self.save() {
            self.items.pop();
            return Err(e);
        }

        info!("Added to review queue: {} - {} ({})", title, artist, reason);
        Ok(true)
    }

    /// Remove an item; persists only when something was removed
    pub fn remove(&mut self, track_id: &str) -> Result<bool> {
        let before = self.items.len();
        self.items.retain(|item| item.track_id != track_id);

        if self.items.len() == before {
            return Ok(false);
        }

        self.save()?;
        info!("Removed {} from review queue", track_id);
        Ok(true)
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.items.iter().any(|item| item.track_id == track_id)
    }

    pub fn get(&self, track_id: &str) -> Option<&ManualReviewItem> {
        self.items.iter().find(|item| item.track_id == track_id)
    }

    /// Copy of all queued items, oldest first
    pub fn get_all(&self) -> Vec<ManualReviewItem> {
        self.items.clone()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.items.clear();
        self.save()?;
        info!("Cleared review queue");
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    fn save(&self) -> Result<()> {
        atomic::write_json(&self.path, &self.items)?;
        debug!("Saved {} items to review queue", self.items.len());
        Ok(())
    }
}

fn normalize_path(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        PipelineError::from(msc_common::Error::InvalidInput(format!(
            "review queue path has no file name: {}",
            path.display()
        )))
    })?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    Ok(parent.canonicalize()?.join(file_name))
}

fn load_items(path: &Path) -> Vec<ManualReviewItem> {
    if !path.exists() {
        debug!("No review queue file at {}", path.display());
        return Vec::new();
    }

    let parsed = fs::read_to_string(path)
        .map_err(PipelineError::from)
        .and_then(|content| Ok(serde_json::from_str::<Vec<ManualReviewItem>>(&content)?));

    match parsed {
        Ok(items) => {
            info!("Loaded {} items from review queue", items.len());
            items
        }
        Err(e) => {
            warn!(
                "Ignoring unreadable review queue {}: {}",
                path.display(),
                e
            );
            Vec::new()
        }
    }
}
