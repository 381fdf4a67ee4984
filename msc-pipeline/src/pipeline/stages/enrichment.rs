//! Enrichment stage: fetch metrics for every resolved track

use crate::collaborators::StatsProvider;
use crate::models::{Track, TrackWithStats};
use crate::pipeline::resume::{ItemOutcome, ResumableRun};
use crate::pipeline::stages::{load_failed, stage_failed};
use crate::pipeline::PipelineStage;
use crate::storage::{CheckpointManager, Repository};
use crate::Result;
use msc_common::events::{EventError, EventType, Observable, PipelineEvent};
use serde_json::{json, Map};
use tracing::{debug, info, warn};

pub const ENRICHMENT_STAGE: &str = "Enrichment";
pub const ENRICHMENT_CHECKPOINT: &str = "enrichment";

pub struct EnrichmentStage<'a> {
    stats: &'a dyn StatsProvider,
    repository: &'a mut dyn Repository<TrackWithStats>,
    checkpoints: &'a CheckpointManager,
    /// Input for standalone runs
    tracks: Option<&'a dyn Repository<Track>>,
    observable: Observable,
    include_youtube: bool,
}

impl<'a> EnrichmentStage<'a> {
    pub fn new(
        stats: &'a dyn StatsProvider,
        repository: &'a mut dyn Repository<TrackWithStats>,
        checkpoints: &'a CheckpointManager,
        include_youtube: bool,
    ) -> Self {
        Self {
            stats,
            repository,
            checkpoints,
            tracks: None,
            observable: Observable::new(),
            include_youtube,
        }
    }

    /// Read input tracks from `tracks` when run on its own
    pub fn with_track_repository(mut self, tracks: &'a dyn Repository<Track>) -> Self {
        self.tracks = Some(tracks);
        self
    }

    pub fn observable(&self) -> &Observable {
        &self.observable
    }

    pub fn observable_mut(&mut self) -> &mut Observable {
        &mut self.observable
    }

    fn enrich_all(&mut self, tracks: Vec<Track>) -> Result<Vec<TrackWithStats>> {
        let (with_ids, without_ids): (Vec<Track>, Vec<Track>) =
            tracks.into_iter().partition(Track::is_resolved);

        if with_ids.is_empty() {
            warn!("No tracks have external ids, skipping enrichment");
            return Ok(Vec::new());
        }

        let mut metadata = Map::new();
        metadata.insert("include_youtube".into(), json!(self.include_youtube));
        metadata.insert("started_at".into(), json!(msc_common::time::now()));

        let stats = self.stats;
        let mut run = ResumableRun::start(
            ENRICHMENT_STAGE,
            ENRICHMENT_CHECKPOINT,
            self.checkpoints,
            &self.observable,
            metadata,
        )?;

        for track in &without_ids {
            run.skip(
                &track.identifier(),
                format!("No external id: {}", track.label()),
            )?;
        }

        self.observable.notify(
            &PipelineEvent::new(EventType::StageStarted)
                .with_stage(ENRICHMENT_STAGE)
                .with_message(format!(
                    "Enriching {} tracks with platform stats",
                    with_ids.len()
                ))
                .with_meta("total", with_ids.len()),
        )?;

        let mut enriched = Vec::with_capacity(with_ids.len());
        for track in with_ids {
            let id = track.identifier();
            let label = track.label();

            let result = run.process(&id, &label, &mut *self.repository, None, || {
                enrich_one(stats, track)
            })?;

            if let Some(item) = result.into_value() {
                enriched.push(item);
            }
        }

        let state = run.finish();
        self.observable.notify(
            &PipelineEvent::new(EventType::StageCompleted)
                .with_stage(ENRICHMENT_STAGE)
                .with_message(format!("Enriched {} tracks", enriched.len()))
                .with_meta("total", enriched.len())
                .with_meta("successful", state.processed_ids.len())
                .with_meta("failed", state.failed_ids.len())
                .with_meta("skipped", state.skipped_ids.len()),
        )?;

        Ok(enriched)
    }
}

fn enrich_one(stats: &dyn StatsProvider, track: Track) -> ItemOutcome<TrackWithStats> {
    let Some(external_id) = track.external_id.clone() else {
        return ItemOutcome::failed("Track has no external id");
    };

    match stats.fetch_stats(&external_id) {
        Ok(metrics) if metrics.is_empty() => {
            warn!("No platform stats found for {} ({})", track.label(), external_id);
            ItemOutcome::failed("No platform stats found")
        }
        Ok(metrics) => {
            info!(
                "Enriched track: {} (ID: {}, {} metrics)",
                track.label(),
                external_id,
                metrics.len()
            );
            ItemOutcome::completed(
                TrackWithStats::new(track, metrics),
                "Stats fetched successfully",
            )
        }
        Err(e) => {
            warn!("Failed to enrich {}: {:#}", track.label(), e);
            ItemOutcome::failed(format!("Enrichment failed: {}", e))
                .with_error(EventError::new("Collaborator", format!("{:#}", e)))
        }
    }
}

impl PipelineStage for EnrichmentStage<'_> {
    type Input = Vec<Track>;
    type Output = Vec<TrackWithStats>;

    fn stage_name(&self) -> &str {
        ENRICHMENT_STAGE
    }

    /// Load tracks from the track repository, if one was given
    fn extract(&mut self) -> Result<Vec<Track>> {
        match self.tracks {
            Some(repository) => {
                let tracks = repository.get_all();
                info!("Loaded {} tracks from repository", tracks.len());
                Ok(tracks)
            }
            None => {
                debug!("No track repository provided, nothing to enrich");
                Ok(Vec::new())
            }
        }
    }

    fn transform(&mut self, tracks: Vec<Track>) -> Result<Vec<TrackWithStats>> {
        if tracks.is_empty() {
            warn!("No tracks to enrich");
            return Ok(Vec::new());
        }

        self.enrich_all(tracks).map_err(|e| {
            stage_failed(&self.observable, ENRICHMENT_STAGE, "Enrichment failed", e)
        })
    }

    fn load(&mut self, enriched: &Vec<TrackWithStats>) -> Result<()> {
        if let Err(e) = self.repository.save_batch(enriched) {
            return Err(load_failed(
                &self.observable,
                ENRICHMENT_STAGE,
                "Failed to save enriched tracks",
                e,
            ));
        }
        info!("Saved {} enriched tracks to repository", enriched.len());

        self.observable.notify(
            &PipelineEvent::new(EventType::CheckpointSaved)
                .with_stage(ENRICHMENT_STAGE)
                .with_message("Enriched tracks saved to repository")
                .with_meta("total", enriched.len()),
        )?;
        Ok(())
    }
}
