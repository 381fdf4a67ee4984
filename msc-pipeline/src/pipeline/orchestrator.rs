//! Pipeline orchestration
//!
//! An `Orchestrator` owns one run directory under `{data_dir}/runs`:
//!
//! ```text
//! runs/{year}_{run_id}/
//!     checkpoints/{stage}_checkpoint.json
//!     tracks.json
//!     enriched_tracks.json
//!     manual_review.json
//! ```
//!
//! It attaches the standard observers (console, event log, progress,
//! metrics) to itself and to every stage it runs, runs the stages in order
//! and brackets the run with `PIPELINE_*` events.

use crate::collaborators::{Scorer, StatsProvider, TrackResolver, TrackSource};
use crate::models::{RankingResults, Track, TrackWithStats};
use crate::observers::{
    ConsoleObserver, FileObserver, MetricsObserver, PipelineMetrics, ProgressObserver,
};
use crate::pipeline::stages::enrichment::ENRICHMENT_CHECKPOINT;
use crate::pipeline::stages::extraction::EXTRACTION_CHECKPOINT;
use crate::pipeline::stages::{EnrichmentStage, ExtractionStage, RankingStage};
use crate::pipeline::PipelineStage;
use crate::storage::{
    CheckpointManager, CheckpointSummary, JsonRepository, ManualReviewItem, ManualReviewQueue,
    Repository,
};
use crate::Result;
use msc_common::config::Settings;
use msc_common::events::{
    shared, EventType, NotifyPolicy, Observable, PipelineEvent, SharedObserver,
};
use msc_common::time;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// External services a run depends on
pub struct Collaborators {
    pub source: Box<dyn TrackSource>,
    pub resolver: Box<dyn TrackResolver>,
    pub stats: Box<dyn StatsProvider>,
    pub scorer: Box<dyn Scorer>,
}

/// Which stages a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSelection {
    pub extraction: bool,
    pub enrichment: bool,
    pub ranking: bool,
}

impl Default for StageSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl StageSelection {
    pub fn all() -> Self {
        Self {
            extraction: true,
            enrichment: true,
            ranking: true,
        }
    }

    /// Select only the named stages (`extraction`, `enrichment`, `ranking`)
    pub fn only<S: AsRef<str>>(names: &[S]) -> msc_common::Result<Self> {
        let mut selection = Self {
            extraction: false,
            enrichment: false,
            ranking: false,
        };
        for name in names {
            match name.as_ref().trim().to_ascii_lowercase().as_str() {
                "extraction" => selection.extraction = true,
                "enrichment" => selection.enrichment = true,
                "ranking" => selection.ranking = true,
                other => {
                    return Err(msc_common::Error::InvalidInput(format!(
                        "unknown stage '{}' (expected extraction, enrichment or ranking)",
                        other
                    )))
                }
            }
        }
        Ok(selection)
    }
}

/// How an orchestrator picks its run and which observers it attaches
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Resume this run id instead of looking for the latest one
    pub run_id: Option<String>,
    /// Start a new run even if an earlier one exists for the year
    pub new_run: bool,
    pub include_console: bool,
    pub include_progress: bool,
    pub verbose: bool,
    pub notify_policy: NotifyPolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            run_id: None,
            new_run: false,
            include_console: true,
            include_progress: true,
            verbose: false,
            notify_policy: NotifyPolicy::default(),
        }
    }
}

impl OrchestratorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            verbose: settings.verbose,
            notify_policy: settings.notify_policy,
            ..Self::default()
        }
    }
}

/// Snapshot of a run's persisted state
#[derive(Debug, Clone)]
pub struct RunStatus {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub extraction: Option<CheckpointSummary>,
    pub enrichment: Option<CheckpointSummary>,
    pub tracks: usize,
    pub enriched_tracks: usize,
    pub review_items: usize,
}

pub struct Orchestrator {
    year: i32,
    include_youtube: bool,
    run_id: String,
    run_dir: PathBuf,
    event_log: PathBuf,
    output_path: PathBuf,
    collaborators: Collaborators,
    checkpoints: CheckpointManager,
    review_queue: ManualReviewQueue,
    tracks: JsonRepository<Track>,
    enriched: JsonRepository<TrackWithStats>,
    observable: Observable,
    metrics: Arc<Mutex<MetricsObserver>>,
}

impl Orchestrator {
    /// Resolve the run directory, open its storage and attach the standard observers
    pub fn new(
        settings: &Settings,
        options: OrchestratorOptions,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let runs_dir = settings.runs_dir();
        let run_id = match options.run_id {
            Some(run_id) => {
                validate_run_id(&run_id)?;
                info!("Using run id {}", run_id);
                run_id
            }
            None if options.new_run => {
                let run_id = time::new_run_id();
                info!("Starting new run {}", run_id);
                run_id
            }
            None => match find_latest_run(&runs_dir, settings.year) {
                Some(run_id) => {
                    info!("Resuming latest run {}", run_id);
                    run_id
                }
                None => {
                    let run_id = time::new_run_id();
                    info!("No earlier run for {}, starting {}", settings.year, run_id);
                    run_id
                }
            },
        };

        let run_dir = runs_dir.join(format!("{}_{}", settings.year, run_id));
        fs::create_dir_all(&run_dir)?;
        info!(run_id = %run_id, run_dir = %run_dir.display(), "Run directory ready");

        let checkpoints = CheckpointManager::new(run_dir.join("checkpoints"))?;
        let review_queue = ManualReviewQueue::open(run_dir.join("manual_review.json"))?;
        let tracks = JsonRepository::open(run_dir.join("tracks.json"));
        let enriched = JsonRepository::open(run_dir.join("enriched_tracks.json"));

        let event_log = settings
            .logs_dir()
            .join(format!("pipeline_events_{}.jsonl", run_id));
        let output_path = settings
            .output_dir()
            .join(format!("power_rankings_{}.json", settings.year));

        let mut observable = Observable::with_policy(options.notify_policy);
        if options.include_console {
            observable.attach(shared(ConsoleObserver::new(options.verbose)));
        }
        observable.attach(shared(FileObserver::new(&event_log)?));
        if options.include_progress {
            observable.attach(shared(ProgressObserver::new()));
        }
        let metrics = shared(MetricsObserver::new());
        observable.attach(metrics.clone());
        debug!(
            observers = observable.len(),
            event_log = %event_log.display(),
            "Observers attached"
        );

        Ok(Self {
            year: settings.year,
            include_youtube: settings.include_youtube,
            run_id,
            run_dir,
            event_log,
            output_path,
            collaborators,
            checkpoints,
            review_queue,
            tracks,
            enriched,
            observable,
            metrics,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// JSONL event log of this run
    pub fn event_log_path(&self) -> &Path {
        &self.event_log
    }

    /// Where the ranking stage exports its results
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Counters gathered by the metrics observer so far
    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .metrics()
    }

    /// Enrichment output stored in this run
    pub fn enriched_tracks(&self) -> Vec<TrackWithStats> {
        self.enriched.get_all()
    }

    pub fn review_items(&self) -> Vec<ManualReviewItem> {
        self.review_queue.get_all()
    }

    pub fn review_queue_mut(&mut self) -> &mut ManualReviewQueue {
        &mut self.review_queue
    }

    pub fn observers(&self) -> &[SharedObserver] {
        self.observable.observers()
    }

    /// Attach an extra observer; it also receives every stage's events
    pub fn add_observer(&mut self, observer: SharedObserver) -> bool {
        self.observable.attach(observer)
    }

    pub fn status(&self) -> RunStatus {
        RunStatus {
            run_id: self.run_id.clone(),
            run_dir: self.run_dir.clone(),
            extraction: self
                .checkpoints
                .load(EXTRACTION_CHECKPOINT)
                .map(|state| state.summary()),
            enrichment: self
                .checkpoints
                .load(ENRICHMENT_CHECKPOINT)
                .map(|state| state.summary()),
            tracks: self.tracks.count(),
            enriched_tracks: self.enriched.count(),
            review_items: self.review_queue.count(),
        }
    }

    /// Run the selected stages
    ///
    /// Returns the rankings when the ranking stage ran. Any stage error, or a
    /// failure to deliver `PIPELINE_COMPLETED`, emits `PIPELINE_FAILED` and
    /// is returned unchanged.
    pub fn run(&mut self, selection: StageSelection) -> Result<Option<RankingResults>> {
        info!(run_id = %self.run_id, year = self.year, "Starting pipeline");
        self.observable.notify(
            &PipelineEvent::new(EventType::PipelineStarted)
                .with_message(format!("Starting pipeline for {}", self.year))
                .with_meta("extraction", selection.extraction)
                .with_meta("enrichment", selection.enrichment)
                .with_meta("ranking", selection.ranking)
                .with_meta("include_youtube", self.include_youtube)
                .with_meta("run_id", self.run_id.clone())
                .with_meta("run_dir", self.run_dir.display().to_string()),
        )?;

        let outcome = self.run_stages(selection).and_then(|results| {
            self.report_completed()?;
            Ok(results)
        });

        outcome.map_err(|e| {
            error!("Pipeline failed: {}", e);
            let event = PipelineEvent::new(EventType::PipelineFailed)
                .with_message(format!("Pipeline failed: {}", e))
                .with_error(&e);
            if let Err(notify_err) = self.observable.notify(&event) {
                warn!("Could not report pipeline failure: {}", notify_err);
            }
            e
        })
    }

    fn report_completed(&self) -> Result<()> {
        let metrics = self.metrics();
        info!(
            stages_completed = metrics.stages_completed,
            items_processed = metrics.items_processed,
            items_failed = metrics.items_failed,
            "Pipeline completed"
        );
        self.observable.notify(
            &PipelineEvent::new(EventType::PipelineCompleted)
                .with_message("Pipeline completed")
                .with_meta("stages_completed", metrics.stages_completed)
                .with_meta("items_processed", metrics.items_processed)
                .with_meta("items_failed", metrics.items_failed)
                .with_meta("items_skipped", metrics.items_skipped)
                .with_meta("success_rate", metrics.success_rate()),
        )?;
        Ok(())
    }

    fn run_stages(&mut self, selection: StageSelection) -> Result<Option<RankingResults>> {
        let mut tracks = None;
        if selection.extraction {
            let mut stage = ExtractionStage::new(
                self.collaborators.source.as_ref(),
                self.collaborators.resolver.as_ref(),
                &mut self.tracks,
                &self.checkpoints,
                &mut self.review_queue,
                self.year,
            );
            wire(stage.observable_mut(), &self.observable);
            tracks = Some(stage.run()?);
        } else {
            info!("Skipping extraction");
        }

        let enriched = if selection.enrichment {
            let input = match tracks {
                Some(tracks) => tracks,
                None => {
                    let stored = self.tracks.get_all();
                    info!("Loaded {} tracks from repository", stored.len());
                    stored
                }
            };
            let mut stage = EnrichmentStage::new(
                self.collaborators.stats.as_ref(),
                &mut self.enriched,
                &self.checkpoints,
                self.include_youtube,
            );
            wire(stage.observable_mut(), &self.observable);
            stage.run_with(input)?
        } else {
            info!("Skipping enrichment");
            let stored = self.enriched.get_all();
            debug!("Loaded {} enriched tracks from repository", stored.len());
            stored
        };

        if !selection.ranking {
            info!("Skipping ranking");
            return Ok(None);
        }

        let mut stage = RankingStage::new(
            self.collaborators.scorer.as_ref(),
            self.output_path.clone(),
            self.year,
        );
        wire(stage.observable_mut(), &self.observable);
        Ok(Some(stage.run_with(enriched)?))
    }

    /// Delete the extraction and enrichment checkpoints
    pub fn clear_checkpoints(&self) {
        self.checkpoints.clear(EXTRACTION_CHECKPOINT);
        self.checkpoints.clear(ENRICHMENT_CHECKPOINT);
        info!("Cleared checkpoints for run {}", self.run_id);
    }

    /// Clear checkpoints, both repositories and the review queue
    ///
    /// Not transactional: an error leaves the earlier steps done.
    pub fn reset_pipeline(&mut self) -> Result<()> {
        self.clear_checkpoints();
        self.tracks.clear()?;
        self.enriched.clear()?;
        self.review_queue.clear()?;
        warn!("Reset run {}", self.run_id);
        Ok(())
    }
}

/// Give a stage's observable the orchestrator's observers and policy
fn wire(stage: &mut Observable, orchestrator: &Observable) {
    stage.set_policy(orchestrator.policy());
    for observer in orchestrator.observers() {
        stage.attach(Arc::clone(observer));
    }
}

/// Latest run id under `runs_dir` for `year`
///
/// Run ids become a directory name under `runs/`
fn validate_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty()
        || run_id.contains('/')
        || run_id.contains('\\')
        || run_id.contains("..")
    {
        return Err(msc_common::Error::InvalidInput(format!("invalid run id '{}'", run_id)).into());
    }
    Ok(())
}

/// Run directories are named `{year}_{run_id}`; the lexicographically
/// greatest run id wins. Scan errors count as "no runs".
pub fn find_latest_run(runs_dir: &Path, year: i32) -> Option<String> {
    let entries = match fs::read_dir(runs_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Could not scan {}: {}", runs_dir.display(), e);
            return None;
        }
    };

    let prefix = format!("{}_", year);
    entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Could not read entry in {}: {}", runs_dir.display(), e);
                None
            }
        })
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(&prefix))
                .filter(|run_id| !run_id.is_empty())
                .map(str::to_string)
        })
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_latest_run_per_year() {
        let temp = TempDir::new().unwrap();
        for name in [
            "2024_20250101_000000",
            "2024_20240601_120000",
            "2023_20991231_235959",
        ] {
            fs::create_dir_all(temp.path().join(name)).unwrap();
        }
        // files are not runs
        fs::write(temp.path().join("2024_20991231_000000"), "x").unwrap();

        assert_eq!(
            find_latest_run(temp.path(), 2024).as_deref(),
            Some("20250101_000000")
        );
        assert_eq!(find_latest_run(temp.path(), 2025), None);
    }

    #[test]
    fn test_run_id_must_stay_inside_runs_dir() {
        for bad in ["", "../../x", "a/b", "a\\b", ".."] {
            assert!(validate_run_id(bad).is_err(), "accepted {:?}", bad);
        }
        validate_run_id("20250301_120000").unwrap();
        validate_run_id("nightly-2").unwrap();
    }

    #[test]
    fn test_latest_run_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert_eq!(find_latest_run(&temp.path().join("runs"), 2024), None);
    }

    #[test]
    fn test_stage_selection_only() {
        let selection = StageSelection::only(&["Ranking", "enrichment"]).unwrap();
        assert_eq!(
            selection,
            StageSelection {
                extraction: false,
                enrichment: true,
                ranking: true,
            }
        );
        assert!(StageSelection::only(&["scoring"]).is_err());
        assert_eq!(StageSelection::default(), StageSelection::all());
    }

    #[test]
    fn test_options_from_settings() {
        let settings = Settings {
            verbose: true,
            notify_policy: NotifyPolicy::Isolate,
            ..Settings::default()
        };
        let options = OrchestratorOptions::from_settings(&settings);
        assert!(options.verbose);
        assert_eq!(options.notify_policy, NotifyPolicy::Isolate);
        assert!(options.include_console);
        assert!(options.run_id.is_none());
    }
}
