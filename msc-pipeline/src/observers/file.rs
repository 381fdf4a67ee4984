//! JSONL event log
//!
//! Every event is appended to the log as one JSON object per line as soon
//! as it is received. A failed write is logged and does not interrupt the
//! pipeline.

use msc_common::events::{PipelineEvent, PipelineObserver};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::error;

pub struct FileObserver {
    path: PathBuf,
    events: Vec<PipelineEvent>,
}

impl FileObserver {
    /// Create the observer, creating the log's parent directory
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            events: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Events received so far, in order
    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    fn append(&self, event: &PipelineEvent) -> io::Result<()> {
        let line = serde_json::to_string(event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

impl PipelineObserver for FileObserver {
    fn on_event(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        self.events.push(event.clone());
        if let Err(e) = self.append(event) {
            error!("Failed to write event to {}: {}", self.path.display(), e);
        }
        Ok(())
    }
}
