//! Checkpointed per-item processing
//!
//! `ResumableRun` drives one stage's item loop against its checkpoint:
//!
//! 1. An id already in `processed_ids` is looked up in the repository. A
//!    hit is reused and reported as skipped. A miss means the checkpoint
//!    drifted from storage: the id is un-marked and processed again.
//! 2. A success is written to the repository first, then marked processed.
//!    A failure is marked failed and optionally queued for manual review.
//! 3. The checkpoint is saved after every processed item.
//!
//! The repository stays authoritative; the checkpoint only saves work.

use crate::storage::{CheckpointManager, CheckpointState, ManualReviewQueue, Repository};
use crate::Result;
use msc_common::events::{EventError, EventType, Observable, PipelineEvent};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Details for a manual review entry
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRequest {
    pub title: String,
    pub artist: String,
    pub reason: String,
    pub metadata: Option<Map<String, Value>>,
}

/// Result of the work done for one item
#[derive(Debug)]
pub enum ItemOutcome<T> {
    Completed {
        value: T,
        message: String,
    },
    Failed {
        message: String,
        error: Option<EventError>,
        review: Option<ReviewRequest>,
    },
}

impl<T> ItemOutcome<T> {
    pub fn completed(value: T, message: impl Into<String>) -> Self {
        ItemOutcome::Completed {
            value,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ItemOutcome::Failed {
            message: message.into(),
            error: None,
            review: None,
        }
    }

    pub fn with_error(self, error: impl Into<EventError>) -> Self {
        match self {
            ItemOutcome::Failed {
                message, review, ..
            } => ItemOutcome::Failed {
                message,
                error: Some(error.into()),
                review,
            },
            completed => completed,
        }
    }

    pub fn with_review(self, request: ReviewRequest) -> Self {
        match self {
            ItemOutcome::Failed { message, error, .. } => ItemOutcome::Failed {
                message,
                error,
                review: Some(request),
            },
            completed => completed,
        }
    }
}

/// What happened to one item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemResult<T> {
    /// Already processed in an earlier run; stored value reused
    Reused(T),
    Completed(T),
    Failed,
}

impl<T> ItemResult<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            ItemResult::Reused(value) | ItemResult::Completed(value) => Some(value),
            ItemResult::Failed => None,
        }
    }
}

/// One stage's checkpointed pass over its items
pub struct ResumableRun<'a> {
    stage_name: String,
    checkpoints: &'a CheckpointManager,
    observable: &'a Observable,
    state: CheckpointState,
    resumed: bool,
}

impl<'a> ResumableRun<'a> {
    /// Resume the checkpoint stored under `checkpoint_key`, or start a new one
    ///
    /// `metadata` is only used for a new checkpoint. Resuming emits
    /// `CHECKPOINT_LOADED`.
    pub fn start(
        stage_name: &str,
        checkpoint_key: &str,
        checkpoints: &'a CheckpointManager,
        observable: &'a Observable,
        metadata: Map<String, Value>,
    ) -> Result<Self> {
        let (state, resumed) = match checkpoints.load(checkpoint_key) {
            Some(state) => (state, true),
            None => (CheckpointManager::create(checkpoint_key, Some(metadata)), false),
        };

        let run = Self {
            stage_name: stage_name.to_string(),
            checkpoints,
            observable,
            state,
            resumed,
        };

        if resumed {
            let summary = run.state.summary();
            run.emit(
                PipelineEvent::new(EventType::CheckpointLoaded)
                    .with_message(format!(
                        "Resuming from checkpoint: {} processed, {} failed",
                        summary.processed, summary.failed
                    ))
                    .with_meta("processed", summary.processed)
                    .with_meta("failed", summary.failed)
                    .with_meta("skipped", summary.skipped),
            )?;
        }

        Ok(run)
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Process one item
    ///
    /// `work` is only called when no stored result can be reused.
    pub fn process<T, F>(
        &mut self,
        id: &str,
        label: &str,
        repository: &mut dyn Repository<T>,
        review_queue: Option<&mut ManualReviewQueue>,
        work: F,
    ) -> Result<ItemResult<T>>
    where
        T: Clone,
        F: FnOnce() -> ItemOutcome<T>,
    {
        if let Some(stored) = self.reuse(id, label, repository)? {
            return Ok(ItemResult::Reused(stored));
        }

        self.emit(
            PipelineEvent::new(EventType::ItemProcessing)
                .with_item(id)
                .with_message(format!("Processing: {}", label)),
        )?;

        match work() {
            ItemOutcome::Completed { value, message } => {
                repository.add(value.clone())?;
                self.state.mark_processed(id);
                self.checkpoints.save(&self.state)?;
                self.emit(
                    PipelineEvent::new(EventType::ItemCompleted)
                        .with_item(id)
                        .with_message(message),
                )?;
                Ok(ItemResult::Completed(value))
            }
            ItemOutcome::Failed {
                message,
                error,
                review,
            } => {
                if let (Some(queue), Some(request)) = (review_queue, review) {
                    queue.add(
                        id,
                        &request.title,
                        &request.artist,
                        &request.reason,
                        request.metadata,
                    )?;
                }
                self.state.mark_failed(id);
                self.checkpoints.save(&self.state)?;

                let mut event = PipelineEvent::new(EventType::ItemFailed)
                    .with_item(id)
                    .with_message(message);
                if let Some(error) = error {
                    event = event.with_error(error);
                }
                self.emit(event)?;
                Ok(ItemResult::Failed)
            }
        }
    }

    /// Record an item the stage deliberately does not process
    pub fn skip(&mut self, id: &str, message: impl Into<String>) -> Result<()> {
        self.state.mark_skipped(id);
        self.checkpoints.save(&self.state)?;
        self.emit(
            PipelineEvent::new(EventType::ItemSkipped)
                .with_item(id)
                .with_message(message),
        )
    }

    /// Consume the run, returning the final checkpoint state
    pub fn finish(self) -> CheckpointState {
        self.state
    }

    fn reuse<T>(
        &mut self,
        id: &str,
        label: &str,
        repository: &dyn Repository<T>,
    ) -> Result<Option<T>> {
        if !self.state.is_processed(id) {
            return Ok(None);
        }

        match repository.get(id) {
            Some(stored) => {
                debug!("Skipping already processed item: {}", id);
                self.emit(
                    PipelineEvent::new(EventType::ItemSkipped)
                        .with_item(id)
                        .with_message(format!("Already processed: {}", label)),
                )?;
                Ok(Some(stored))
            }
            None => {
                warn!(
                    stage = %self.stage_name,
                    item = %id,
                    "Item in checkpoint but missing from repository, reprocessing"
                );
                self.state.unmark_processed(id);
                Ok(None)
            }
        }
    }

    fn emit(&self, event: PipelineEvent) -> Result<()> {
        self.observable
            .notify(&event.with_stage(self.stage_name.as_str()))?;
        Ok(())
    }
}
