//! Extraction stage: read candidate tracks and resolve their external ids
//!
//! Resolved tracks are stored in the track repository as they complete.
//! Tracks that cannot be resolved (no match, rejected match, lookup error)
//! are marked failed, queued for manual review and still passed on
//! without an external id.

use crate::collaborators::{Resolution, TrackResolver, TrackSource};
use crate::models::Track;
use crate::pipeline::resume::{ItemOutcome, ItemResult, ResumableRun, ReviewRequest};
use crate::pipeline::stages::{load_failed, stage_failed};
use crate::pipeline::PipelineStage;
use crate::storage::{CheckpointManager, ManualReviewQueue, Repository};
use crate::{PipelineError, Result};
use msc_common::events::{EventError, EventType, Observable, PipelineEvent};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

pub const EXTRACTION_STAGE: &str = "Extraction";
pub const EXTRACTION_CHECKPOINT: &str = "extraction";

pub struct ExtractionStage<'a> {
    source: &'a dyn TrackSource,
    resolver: &'a dyn TrackResolver,
    repository: &'a mut dyn Repository<Track>,
    checkpoints: &'a CheckpointManager,
    review_queue: &'a mut ManualReviewQueue,
    observable: Observable,
    year: i32,
}

impl<'a> ExtractionStage<'a> {
    pub fn new(
        source: &'a dyn TrackSource,
        resolver: &'a dyn TrackResolver,
        repository: &'a mut dyn Repository<Track>,
        checkpoints: &'a CheckpointManager,
        review_queue: &'a mut ManualReviewQueue,
        year: i32,
    ) -> Self {
        Self {
            source,
            resolver,
            repository,
            checkpoints,
            review_queue,
            observable: Observable::new(),
            year,
        }
    }

    pub fn observable(&self) -> &Observable {
        &self.observable
    }

    pub fn observable_mut(&mut self) -> &mut Observable {
        &mut self.observable
    }

    fn resolve_all(&mut self, tracks: Vec<Track>) -> Result<Vec<Track>> {
        let mut metadata = Map::new();
        metadata.insert("year".into(), json!(self.year));
        metadata.insert("started_at".into(), json!(msc_common::time::now()));

        let resolver = self.resolver;
        let mut run = ResumableRun::start(
            EXTRACTION_STAGE,
            EXTRACTION_CHECKPOINT,
            self.checkpoints,
            &self.observable,
            metadata,
        )?;

        self.observable.notify(
            &PipelineEvent::new(EventType::StageStarted)
                .with_stage(EXTRACTION_STAGE)
                .with_message("Resolving external ids")
                .with_meta("total", tracks.len()),
        )?;

        let mut resolved = Vec::with_capacity(tracks.len());
        for track in tracks {
            let id = track.identifier();
            let label = track.label();
            let queried = Track {
                search_query: Some(search_query(&track)),
                ..track
            };

            let result = run.process(
                &id,
                &label,
                &mut *self.repository,
                Some(&mut *self.review_queue),
                || resolve_one(resolver, &queried),
            )?;

            match result {
                ItemResult::Reused(track) | ItemResult::Completed(track) => resolved.push(track),
                ItemResult::Failed => resolved.push(queried),
            }
        }

        let state = run.finish();
        self.observable.notify(
            &PipelineEvent::new(EventType::StageCompleted)
                .with_stage(EXTRACTION_STAGE)
                .with_message(format!("Processed {} tracks", resolved.len()))
                .with_meta("total", resolved.len())
                .with_meta("found_ids", state.processed_ids.len())
                .with_meta("missing_ids", state.failed_ids.len()),
        )?;

        Ok(resolved)
    }
}

/// Lookup query recorded on the track for later debugging
fn search_query(track: &Track) -> String {
    format!("{} {}", track.all_artists(), track.title)
        .to_lowercase()
        .trim()
        .to_string()
}

fn resolve_one(resolver: &dyn TrackResolver, track: &Track) -> ItemOutcome<Track> {
    let query = track.search_query.clone().unwrap_or_default();
    let review = |reason: String, extra: Option<(&str, Value)>| {
        let mut metadata = Map::new();
        metadata.insert("query".into(), json!(query));
        if let Some((key, value)) = extra {
            metadata.insert(key.into(), value);
        }
        ReviewRequest {
            title: track.title.clone(),
            artist: track.primary_artist().to_string(),
            reason,
            metadata: Some(metadata),
        }
    };

    match resolver.resolve(track) {
        Ok(Resolution::Found {
            external_id,
            external_title,
        }) => {
            info!("Found external id for '{}': {}", track.label(), external_id);
            let message = format!("Found ID: {}", external_id);
            let resolved = Track {
                external_id: Some(external_id),
                external_title: Some(external_title),
                ..track.clone()
            };
            ItemOutcome::completed(resolved, message)
        }
        Ok(Resolution::NotFound { reason }) => {
            warn!("No external id found for: {}", track.label());
            ItemOutcome::failed(format!(
                "{} (added to review queue): {}",
                reason,
                track.label()
            ))
            .with_review(review(reason, None))
        }
        Ok(Resolution::Rejected {
            reason,
            candidate_title,
        }) => {
            warn!(
                "Rejected match for '{}': {} (candidate: '{}')",
                track.label(),
                reason,
                candidate_title
            );
            ItemOutcome::failed(format!("Rejected match ({}): {}", reason, candidate_title))
                .with_review(review(
                    format!("Rejected: {}", reason),
                    Some(("candidate_title", json!(candidate_title))),
                ))
        }
        Err(e) => {
            warn!("Lookup failed for {}: {:#}", track.label(), e);
            ItemOutcome::failed(format!("Lookup failed: {}", e))
                .with_error(EventError::new("Collaborator", format!("{:#}", e)))
                .with_review(review(format!("Error during lookup: {}", e), None))
        }
    }
}

impl PipelineStage for ExtractionStage<'_> {
    type Input = Vec<Track>;
    type Output = Vec<Track>;

    fn stage_name(&self) -> &str {
        EXTRACTION_STAGE
    }

    /// Fetch candidate tracks from the source
    fn extract(&mut self) -> Result<Vec<Track>> {
        self.observable.notify(
            &PipelineEvent::new(EventType::StageStarted)
                .with_stage(EXTRACTION_STAGE)
                .with_message(format!("Extracting tracks for {}", self.year)),
        )?;

        match self.source.fetch_tracks() {
            Ok(tracks) => {
                info!("Extracted {} tracks (year {})", tracks.len(), self.year);
                Ok(tracks)
            }
            Err(e) => Err(stage_failed(
                &self.observable,
                EXTRACTION_STAGE,
                "Failed to extract tracks",
                PipelineError::SourceUnavailable(format!("{:#}", e)),
            )),
        }
    }

    /// Resolve external ids, one checkpointed item at a time
    fn transform(&mut self, tracks: Vec<Track>) -> Result<Vec<Track>> {
        if tracks.is_empty() {
            warn!("No tracks to transform");
            return Ok(Vec::new());
        }

        self.resolve_all(tracks).map_err(|e| {
            stage_failed(&self.observable, EXTRACTION_STAGE, "Extraction failed", e)
        })
    }

    /// Store every track, resolved or not
    fn load(&mut self, tracks: &Vec<Track>) -> Result<()> {
        if let Err(e) = self.repository.save_batch(tracks) {
            return Err(load_failed(
                &self.observable,
                EXTRACTION_STAGE,
                "Failed to save tracks",
                e,
            ));
        }
        info!("Saved {} tracks to repository", tracks.len());

        self.observable.notify(
            &PipelineEvent::new(EventType::CheckpointSaved)
                .with_stage(EXTRACTION_STAGE)
                .with_message("Tracks saved to repository")
                .with_meta("total", tracks.len()),
        )?;
        Ok(())
    }
}
