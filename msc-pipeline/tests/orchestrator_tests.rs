//! Orchestrator integration tests: run resolution, bracketing, event log

mod common;

use common::*;
use msc_common::config::Settings;
use msc_common::events::{EventType, NotifyPolicy, SharedObserver};
use msc_pipeline::pipeline::{Collaborators, Orchestrator, OrchestratorOptions, StageSelection};
use msc_pipeline::reports::{self, DataKind, DatasetStats};
use msc_pipeline::PipelineError;
use serde_json::Value;
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const RUN_ID: &str = "20250301_120000";

fn settings(temp: &TempDir) -> Settings {
    Settings {
        data_dir: temp.path().to_path_buf(),
        year: YEAR,
        ..Settings::default()
    }
}

fn options(run_id: Option<&str>) -> OrchestratorOptions {
    OrchestratorOptions {
        run_id: run_id.map(str::to_string),
        include_console: false,
        include_progress: false,
        ..OrchestratorOptions::default()
    }
}

fn abc() -> Collaborators {
    collaborators(vec![track("a"), track("bb"), track("ccc")], &["bb"])
}

fn with_collector(orchestrator: &mut Orchestrator) -> Arc<Mutex<Collector>> {
    let events = collector();
    assert!(orchestrator.add_observer(events.clone()));
    events
}

#[test]
fn test_full_run() {
    // Given: three tracks, "bb" cannot be resolved
    let temp = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(&settings(&temp), options(Some(RUN_ID)), abc()).unwrap();
    let events = with_collector(&mut orchestrator);

    // When: every stage runs
    let results = orchestrator.run(StageSelection::all()).unwrap().unwrap();

    // Then: the two resolved tracks are ranked and exported
    assert_eq!(results.total_tracks(), 2);
    assert_eq!(results.top().unwrap().title, "ccc");
    assert!(temp
        .path()
        .join("output")
        .join("power_rankings_2025.json")
        .exists());
    assert_eq!(
        orchestrator.run_dir(),
        temp.path().join("runs").join("2025_20250301_120000")
    );

    // And: "bb" waits for review
    let review = orchestrator.review_items();
    assert_eq!(review.len(), 1);
    assert_eq!(review[0].track_id, id("bb"));

    // And: metrics cover extraction and enrichment items
    let metrics = orchestrator.metrics();
    assert_eq!(metrics.items_processed, 4);
    assert_eq!(metrics.items_failed, 1);
    assert_eq!(metrics.items_skipped, 1);
    assert_eq!(metrics.stages_completed, 3);
    assert!((metrics.success_rate() - 80.0).abs() < 1e-9);

    // And: the run is bracketed by pipeline events
    let events = events.lock().unwrap();
    let types = events.types();
    assert_eq!(types.first(), Some(&EventType::PipelineStarted));
    assert_eq!(types.last(), Some(&EventType::PipelineCompleted));
    let started = &events.events[0];
    assert_eq!(started.meta("run_id").and_then(Value::as_str), Some(RUN_ID));
    assert_eq!(started.meta("extraction").and_then(Value::as_bool), Some(true));
    let completed = events.events.last().unwrap();
    assert_eq!(completed.meta("stages_completed").unwrap(), 3);
    assert_eq!(completed.meta("items_failed").unwrap(), 1);
}

#[test]
fn test_status_and_admin() {
    let temp = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(&settings(&temp), options(Some(RUN_ID)), abc()).unwrap();
    orchestrator.run(StageSelection::all()).unwrap();

    let status = orchestrator.status();
    assert_eq!(status.run_id, RUN_ID);
    let extraction = status.extraction.unwrap();
    assert_eq!((extraction.processed, extraction.failed), (2, 1));
    assert_eq!(status.enrichment.unwrap().skipped, 1);
    assert_eq!(status.tracks, 3);
    assert_eq!(status.enriched_tracks, 2);
    assert_eq!(status.review_items, 1);

    orchestrator.clear_checkpoints();
    let status = orchestrator.status();
    assert!(status.extraction.is_none());
    assert!(status.enrichment.is_none());
    assert_eq!(status.tracks, 3);

    orchestrator.reset_pipeline().unwrap();
    let status = orchestrator.status();
    assert_eq!(status.tracks, 0);
    assert_eq!(status.enriched_tracks, 0);
    assert_eq!(status.review_items, 0);
}

#[test]
fn test_latest_run_is_resumed() {
    // Given: runs for two years
    let temp = TempDir::new().unwrap();
    let runs = temp.path().join("runs");
    for name in [
        "2025_20250101_000000",
        "2025_20250201_000000",
        "2024_20991231_000000",
    ] {
        fs::create_dir_all(runs.join(name)).unwrap();
    }

    // When: no run id is given
    let orchestrator = Orchestrator::new(&settings(&temp), options(None), abc()).unwrap();

    // Then: the latest run of the configured year is picked
    assert_eq!(orchestrator.run_id(), "20250201_000000");

    // When: a fresh run is forced
    let fresh = Orchestrator::new(
        &settings(&temp),
        OrchestratorOptions {
            new_run: true,
            ..options(None)
        },
        abc(),
    )
    .unwrap();

    // Then: a new run directory is created
    assert_ne!(fresh.run_id(), "20250201_000000");
    assert!(fresh.run_dir().is_dir());
    assert!(fresh.run_dir().ends_with(format!("2025_{}", fresh.run_id())));
}

#[test]
fn test_skipped_stages_reload_from_repository() {
    // Given: a run that only extracted
    let temp = TempDir::new().unwrap();
    let mut first = Orchestrator::new(&settings(&temp), options(Some(RUN_ID)), abc()).unwrap();
    let selection = StageSelection::only(&["extraction"]).unwrap();
    assert!(first.run(selection).unwrap().is_none());
    drop(first);

    // When: enrichment and ranking run with a source that would fail
    let collaborators = Collaborators {
        source: Box::new(FailingSource),
        ..abc()
    };
    let mut second = Orchestrator::new(&settings(&temp), options(Some(RUN_ID)), collaborators).unwrap();
    let results = second
        .run(StageSelection {
            extraction: false,
            ..StageSelection::all()
        })
        .unwrap();

    // Then: the stored tracks are enriched and ranked
    assert_eq!(results.unwrap().total_tracks(), 2);
}

#[test]
fn test_stage_error_emits_pipeline_failed() {
    // Given: a source that cannot be read
    let temp = TempDir::new().unwrap();
    let collaborators = Collaborators {
        source: Box::new(FailingSource),
        ..abc()
    };
    let mut orchestrator =
        Orchestrator::new(&settings(&temp), options(Some(RUN_ID)), collaborators).unwrap();
    let events = with_collector(&mut orchestrator);

    // When: the pipeline runs
    let result = orchestrator.run(StageSelection::all());

    // Then: the stage error is returned after PIPELINE_FAILED
    assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
    let events = events.lock().unwrap();
    assert_eq!(
        events.types(),
        vec![
            EventType::PipelineStarted,
            EventType::StageStarted,
            EventType::StageFailed,
            EventType::PipelineFailed,
        ]
    );
    let failed = events.events.last().unwrap();
    assert_eq!(failed.error.as_ref().unwrap().kind, "SourceUnavailable");
    assert_eq!(orchestrator.metrics().stages_failed, 1);
}

#[test]
fn test_observer_error_propagates_by_default() {
    let temp = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(&settings(&temp), options(Some(RUN_ID)), abc()).unwrap();
    let failing: SharedObserver = msc_common::events::shared(FailingObserver);
    orchestrator.add_observer(failing);

    let result = orchestrator.run(StageSelection::all());

    assert!(matches!(
        result,
        Err(PipelineError::Common(msc_common::Error::Observer(_)))
    ));
    assert!(orchestrator.status().extraction.is_none());
}

#[test]
fn test_completed_notify_failure_emits_pipeline_failed() {
    // Given: an observer that rejects PIPELINE_COMPLETED
    let temp = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(&settings(&temp), options(Some(RUN_ID)), abc()).unwrap();
    let events = with_collector(&mut orchestrator);
    orchestrator.add_observer(msc_common::events::shared(FailOn(EventType::PipelineCompleted)));

    // When: every stage succeeds
    let result = orchestrator.run(StageSelection::all());

    // Then: the delivery error is reported as a pipeline failure
    assert!(matches!(
        result,
        Err(PipelineError::Common(msc_common::Error::Observer(_)))
    ));
    let events = events.lock().unwrap();
    let types = events.types();
    assert_eq!(
        types[types.len() - 2..],
        [EventType::PipelineCompleted, EventType::PipelineFailed]
    );
    assert_eq!(events.events.last().unwrap().error.as_ref().unwrap().kind, "Observer");
}

#[test]
fn test_run_id_cannot_escape_runs_dir() {
    let temp = TempDir::new().unwrap();
    let settings = Settings {
        data_dir: temp.path().join("data"),
        ..settings(&temp)
    };

    let result = Orchestrator::new(&settings, options(Some("../../x")), abc());

    assert!(matches!(
        result,
        Err(PipelineError::Common(msc_common::Error::InvalidInput(_)))
    ));
    assert!(!temp.path().join("data").exists());
    assert!(!temp.path().join("x").exists());
}

#[test]
fn test_reports_over_a_finished_run() {
    let temp = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(&settings(&temp), options(Some(RUN_ID)), abc()).unwrap();
    orchestrator.run(StageSelection::all()).unwrap();

    let report = reports::validate_file(orchestrator.output_path()).unwrap();
    assert!(report.is_valid());
    assert_eq!(report.kind, Some(DataKind::Rankings));

    let enriched = orchestrator.enriched_tracks();
    let export = reports::export_csv(&enriched, &temp.path().join("export_2025.csv")).unwrap();
    assert_eq!(export.rows, 2);

    let stats = DatasetStats::from_tracks(&enriched);
    assert_eq!(stats.coverage_pct("streams"), 100.0);
}

#[test]
fn test_isolate_policy_keeps_running() {
    let temp = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(
        &settings(&temp),
        OrchestratorOptions {
            notify_policy: NotifyPolicy::Isolate,
            ..options(Some(RUN_ID))
        },
        abc(),
    )
    .unwrap();
    orchestrator.add_observer(msc_common::events::shared(FailingObserver));
    let events = with_collector(&mut orchestrator);

    let results = orchestrator.run(StageSelection::all()).unwrap();

    assert_eq!(results.unwrap().total_tracks(), 2);
    let events = events.lock().unwrap();
    assert_eq!(events.types().last(), Some(&EventType::PipelineCompleted));
}

#[test]
fn test_event_log_is_jsonl() {
    let temp = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(&settings(&temp), options(Some(RUN_ID)), abc()).unwrap();
    orchestrator.run(StageSelection::all()).unwrap();

    let path = temp
        .path()
        .join("logs")
        .join("pipeline_events_20250301_120000.jsonl");
    assert_eq!(orchestrator.event_log_path(), path);

    let lines: Vec<Value> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.first().unwrap()["event_type"], "pipeline_started");
    assert_eq!(lines.last().unwrap()["event_type"], "pipeline_completed");

    let failed = lines
        .iter()
        .find(|line| line["event_type"] == "item_failed")
        .unwrap();
    assert_eq!(failed["stage_name"], "Extraction");
    assert_eq!(failed["item_id"], id("bb"));
    assert_eq!(failed["error"]["type"], "Collaborator");
    assert!(failed["error"]["message"]
        .as_str()
        .unwrap()
        .contains("lookup timed out"));
}
