//! Ranking stage: score enriched tracks and export the rankings

use crate::collaborators::Scorer;
use crate::models::{RankingResults, TrackWithStats};
use crate::pipeline::stages::load_failed;
use crate::pipeline::PipelineStage;
use crate::storage::{atomic, Repository};
use crate::Result;
use msc_common::events::{EventType, Observable, PipelineEvent};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const RANKING_STAGE: &str = "Ranking";

pub struct RankingStage<'a> {
    scorer: &'a dyn Scorer,
    /// Input for standalone runs
    stats: Option<&'a dyn Repository<TrackWithStats>>,
    output_path: PathBuf,
    year: i32,
    observable: Observable,
}

impl<'a> RankingStage<'a> {
    pub fn new(scorer: &'a dyn Scorer, output_path: impl Into<PathBuf>, year: i32) -> Self {
        Self {
            scorer,
            stats: None,
            output_path: output_path.into(),
            year,
            observable: Observable::new(),
        }
    }

    /// Read enriched tracks from `stats` when run on its own
    pub fn with_stats_repository(mut self, stats: &'a dyn Repository<TrackWithStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Where `load` writes the rankings
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn observable(&self) -> &Observable {
        &self.observable
    }

    pub fn observable_mut(&mut self) -> &mut Observable {
        &mut self.observable
    }
}

impl PipelineStage for RankingStage<'_> {
    type Input = Vec<TrackWithStats>;
    type Output = RankingResults;

    fn stage_name(&self) -> &str {
        RANKING_STAGE
    }

    fn extract(&mut self) -> Result<Vec<TrackWithStats>> {
        match self.stats {
            Some(repository) => {
                let tracks = repository.get_all();
                info!("Loaded {} enriched tracks from repository", tracks.len());
                Ok(tracks)
            }
            None => {
                debug!("No stats repository provided, nothing to rank");
                Ok(Vec::new())
            }
        }
    }

    fn transform(&mut self, tracks: Vec<TrackWithStats>) -> Result<RankingResults> {
        if tracks.is_empty() {
            warn!("No tracks to rank");
            return Ok(RankingResults::new(self.year, Vec::new()));
        }

        self.observable.notify(
            &PipelineEvent::new(EventType::StageStarted)
                .with_stage(RANKING_STAGE)
                .with_message(format!(
                    "Computing power rankings for {} tracks",
                    tracks.len()
                ))
                .with_meta("total", tracks.len()),
        )?;

        let rankings = self.scorer.rank(&tracks);
        let results = RankingResults::new(self.year, rankings);

        let top = results
            .top()
            .map(|t| format!("{} - {}", t.artist, t.title))
            .unwrap_or_else(|| "N/A".to_string());
        let top_score = results.top().map(|t| t.score).unwrap_or(0.0);

        self.observable.notify(
            &PipelineEvent::new(EventType::StageCompleted)
                .with_stage(RANKING_STAGE)
                .with_message(format!("Computed {} rankings", results.total_tracks()))
                .with_meta("total_tracks", results.total_tracks())
                .with_meta("top_track", top)
                .with_meta("top_score", top_score),
        )?;

        Ok(results)
    }

    /// Export rankings as JSON
    fn load(&mut self, results: &RankingResults) -> Result<()> {
        if let Err(e) = atomic::write_json(&self.output_path, results) {
            return Err(load_failed(
                &self.observable,
                RANKING_STAGE,
                "Export failed",
                e,
            ));
        }
        info!("Exported rankings to {}", self.output_path.display());

        self.observable.notify(
            &PipelineEvent::new(EventType::CheckpointSaved)
                .with_stage(RANKING_STAGE)
                .with_message(format!(
                    "Rankings exported to {}",
                    self.output_path.display()
                ))
                .with_meta("path", self.output_path.display().to_string()),
        )?;
        Ok(())
    }
}
