//! Per-stage checkpoints
//!
//! A checkpoint records which item ids a stage has processed, failed or
//! deliberately skipped, so an interrupted run can resume without redoing
//! work. Each stage owns one `{stage_name}_checkpoint.json` file.
//!
//! Reads fail open: a missing or corrupt file is reported as "no
//! checkpoint". Writes fail closed: a save error is returned to the stage.

use crate::storage::atomic;
use crate::{PipelineError, Result};
use chrono::{DateTime, Utc};
use msc_common::time;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted progress of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub stage_name: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub processed_ids: BTreeSet<String>,
    #[serde(default)]
    pub failed_ids: BTreeSet<String>,
    #[serde(default)]
    pub skipped_ids: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Id counts of a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckpointSummary {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CheckpointState {
    pub fn is_processed(&self, id: &str) -> bool {
        self.processed_ids.contains(id)
    }

    /// Record a success; a previous failure of the same id is forgotten
    pub fn mark_processed(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.failed_ids.remove(&id);
        self.processed_ids.insert(id);
    }

    pub fn mark_failed(&mut self, id: impl Into<String>) {
        self.failed_ids.insert(id.into());
    }

    pub fn mark_skipped(&mut self, id: impl Into<String>) {
        self.skipped_ids.insert(id.into());
    }

    /// Forget a success whose stored result has gone missing
    pub fn unmark_processed(&mut self, id: &str) -> bool {
        self.processed_ids.remove(id)
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            processed: self.processed_ids.len(),
            failed: self.failed_ids.len(),
            skipped: self.skipped_ids.len(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Saves, loads and clears stage checkpoints under one directory
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the checkpoint directory if needed and resolve it to an absolute path
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let dir = dir.canonicalize()?;
        debug!("Checkpoint directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fresh state for a stage; nothing is written
    pub fn create(stage_name: &str, metadata: Option<Map<String, Value>>) -> CheckpointState {
        let now = time::now();
        CheckpointState {
            stage_name: stage_name.to_string(),
            created_at: now,
            last_updated: now,
            processed_ids: BTreeSet::new(),
            failed_ids: BTreeSet::new(),
            skipped_ids: BTreeSet::new(),
            metadata: metadata.unwrap_or_default(),
        }
    }

    /// Atomically overwrite the stage's checkpoint file
    ///
    /// The written copy carries `last_updated = now`; `state` itself is
    /// left untouched.
    pub fn save(&self, state: &CheckpointState) -> Result<()> {
        let path = self.path_for(&state.stage_name)?;

        let mut stamped = state.clone();
        stamped.last_updated = time::now();

        atomic::write_json(&path, &stamped)?;

        let summary = stamped.summary();
        debug!(
            stage = %stamped.stage_name,
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Saved checkpoint"
        );
        Ok(())
    }

    /// Load a stage's checkpoint
    ///
    /// Returns `None` when the file is absent or cannot be parsed.
    pub fn load(&self, stage_name: &str) -> Option<CheckpointState> {
        let path = match self.path_for(stage_name) {
            Ok(path) => path,
            Err(e) => {
                warn!("Refusing to load checkpoint: {}", e);
                return None;
            }
        };

        if !path.exists() {
            debug!("No checkpoint found for {}", stage_name);
            return None;
        }

        let state = fs::read_to_string(&path)
            .map_err(PipelineError::from)
            .and_then(|content| CheckpointState::from_json(&content));

        match state {
            Ok(state) => {
                let summary = state.summary();
                info!(
                    stage = %stage_name,
                    processed = summary.processed,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    "Loaded checkpoint"
                );
                Some(state)
            }
            Err(e) => {
                warn!(
                    "Ignoring unreadable checkpoint {}: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    pub fn exists(&self, stage_name: &str) -> bool {
        self.path_for(stage_name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Delete a stage's checkpoint file if present; failures are only logged
    pub fn clear(&self, stage_name: &str) {
        let path = match self.path_for(stage_name) {
            Ok(path) => path,
            Err(e) => {
                warn!("Refusing to clear checkpoint: {}", e);
                return;
            }
        };

        if !path.exists() {
            return;
        }

        match fs::remove_file(&path) {
            Ok(()) => info!("Cleared checkpoint for {}", stage_name),
            Err(e) => warn!("Failed to clear checkpoint for {}: {}", stage_name, e),
        }
    }

    fn path_for(&self, stage_name: &str) -> Result<PathBuf> {
        validate_stage_name(stage_name)?;
        Ok(self.dir.join(format!("{}_checkpoint.json", stage_name)))
    }
}

fn validate_stage_name(stage_name: &str) -> Result<()> {
    if stage_name.is_empty()
        || stage_name.contains('/')
        || stage_name.contains('\\')
        || stage_name.contains("..")
    {
        return Err(msc_common::Error::InvalidInput(format!(
            "invalid checkpoint stage name '{}'",
            stage_name
        ))
        .into());
    }
    Ok(())
}
