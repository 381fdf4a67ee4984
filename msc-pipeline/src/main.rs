//! msc - music-charts pipeline CLI
//!
//! Drives the extraction, enrichment and ranking stages over the offline
//! inputs in `{data_dir}/input` and manages a run's persisted state.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use msc_common::config::{CliOverrides, Settings};
use msc_common::events::NotifyPolicy;
use msc_pipeline::collaborators::{
    CatalogueResolver, JsonStatsProvider, JsonTrackSource, WeightedSumScorer,
};
use msc_pipeline::pipeline::{
    find_latest_run, Collaborators, Orchestrator, OrchestratorOptions, StageSelection,
};
use msc_pipeline::models::TrackWithStats;
use msc_pipeline::reports::{self, DatasetStats};
use msc_pipeline::storage::CheckpointSummary;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "msc")]
#[command(version)]
#[command(about = "Resumable music-charts pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory holding input, runs, logs and output
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Chart year
    #[arg(short, long, global = true)]
    year: Option<i32>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline, resuming the latest run for the year
    Run {
        /// Only run these stages (extraction, enrichment, ranking)
        #[arg(long = "stage", value_name = "STAGE")]
        stages: Vec<String>,

        #[arg(long)]
        skip_extraction: bool,

        #[arg(long)]
        skip_enrichment: bool,

        #[arg(long)]
        skip_ranking: bool,

        /// Resume this run id
        #[arg(long, conflicts_with = "new_run")]
        run_id: Option<String>,

        /// Start a new run
        #[arg(long)]
        new_run: bool,

        /// What to do when an observer fails: propagate or isolate
        #[arg(long)]
        policy: Option<NotifyPolicy>,

        /// Keep YouTube metrics
        #[arg(long)]
        include_youtube: bool,

        /// Do not draw progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Show checkpoint and review state of a run
    Status {
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Manage the manual review queue
    Review {
        #[command(subcommand)]
        action: ReviewAction,

        #[arg(long)]
        run_id: Option<String>,
    },

    /// Delete the extraction and enrichment checkpoints
    ClearCheckpoints {
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Delete checkpoints, stored tracks and the review queue
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,

        #[arg(long)]
        run_id: Option<String>,
    },

    /// Check a tracks, enriched tracks or rankings JSON file
    Validate {
        file: PathBuf,
    },

    /// Export a run's enriched tracks as a flat table
    Export {
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Defaults to {data_dir}/output/export_{year}.csv
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        run_id: Option<String>,
    },

    /// Show metric coverage of a run's enriched tracks
    Stats {
        #[arg(long)]
        run_id: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
}

#[derive(Subcommand)]
enum ReviewAction {
    /// List items waiting for review
    List,
    /// Remove one item
    Remove { track_id: String },
    /// Remove every item
    Clear,
}

/// Resolve settings under a temporary warn-level subscriber writing to `writer`
///
/// The global subscriber depends on the resolved log level, so warnings from
/// resolution (missing or unreadable config file) go here instead.
fn resolve_settings<W>(overrides: &CliOverrides, writer: W) -> Result<Settings>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(writer)
        .compact()
        .finish();
    tracing::subscriber::with_default(bootstrap, || Settings::resolve(overrides))
        .context("Failed to load configuration")
}

fn setup_logging(settings: &Settings) {
    let default_level = if settings.verbose {
        "debug"
    } else {
        settings.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();
}

fn offline_collaborators(settings: &Settings) -> Result<Collaborators> {
    let input = settings.input_dir();
    Ok(Collaborators {
        source: Box::new(JsonTrackSource::new(input.join("tracks.json"), settings.year)),
        resolver: Box::new(CatalogueResolver::from_file(&input.join("catalogue.json"))?),
        stats: Box::new(JsonStatsProvider::from_file(
            &input.join("stats.json"),
            settings.include_youtube,
        )?),
        scorer: Box::new(WeightedSumScorer::default()),
    })
}

/// Orchestrator over an existing run, without console or progress output
fn open_existing(settings: &Settings, run_id: Option<String>) -> Result<Orchestrator> {
    let run_id = match run_id.or_else(|| find_latest_run(&settings.runs_dir(), settings.year)) {
        Some(run_id) => run_id,
        None => bail!(
            "No runs found for {} under {}",
            settings.year,
            settings.runs_dir().display()
        ),
    };

    let options = OrchestratorOptions {
        run_id: Some(run_id),
        include_console: false,
        include_progress: false,
        ..OrchestratorOptions::from_settings(settings)
    };
    Ok(Orchestrator::new(
        settings,
        options,
        offline_collaborators(settings)?,
    )?)
}

/// Enriched tracks of an existing run; fails when there are none
fn enriched_tracks(settings: &Settings, run_id: Option<String>) -> Result<Vec<TrackWithStats>> {
    let orchestrator = open_existing(settings, run_id)?;
    let tracks = orchestrator.enriched_tracks();
    if tracks.is_empty() {
        bail!(
            "No enriched tracks in run {}. Run the pipeline first: msc run --year {}",
            orchestrator.run_id(),
            settings.year
        );
    }
    Ok(tracks)
}

fn summary_line(name: &str, summary: Option<CheckpointSummary>) -> String {
    match summary {
        Some(s) => format!(
            "  {:<11} {} processed, {} failed, {} skipped",
            name, s.processed, s.failed, s.skipped
        ),
        None => format!("  {:<11} no checkpoint", name),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (include_youtube, notify_policy) = match &cli.command {
        Commands::Run {
            include_youtube,
            policy,
            ..
        } => (include_youtube.then_some(true), *policy),
        _ => (None, None),
    };
    let overrides = CliOverrides {
        config: cli.config.clone(),
        data_dir: cli.data_dir.clone(),
        year: cli.year,
        include_youtube,
        verbose: cli.verbose,
        notify_policy,
    };
    let settings = resolve_settings(&overrides, std::io::stderr)?;

    setup_logging(&settings);
    info!(
        "msc {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("MSC_GIT_HASH"),
        env!("MSC_BUILD_TIMESTAMP"),
        env!("MSC_BUILD_PROFILE")
    );
    info!(
        data_dir = %settings.data_dir.display(),
        year = settings.year,
        "Settings resolved"
    );

    match cli.command {
        Commands::Run {
            stages,
            skip_extraction,
            skip_enrichment,
            skip_ranking,
            run_id,
            new_run,
            no_progress,
            ..
        } => {
            let mut selection = if stages.is_empty() {
                StageSelection::all()
            } else {
                StageSelection::only(&stages)?
            };
            selection.extraction &= !skip_extraction;
            selection.enrichment &= !skip_enrichment;
            selection.ranking &= !skip_ranking;

            let options = OrchestratorOptions {
                run_id,
                new_run,
                include_progress: !no_progress,
                ..OrchestratorOptions::from_settings(&settings)
            };
            let mut orchestrator =
                Orchestrator::new(&settings, options, offline_collaborators(&settings)?)?;

            let results = orchestrator.run(selection)?;
            let metrics = orchestrator.metrics();

            println!();
            println!("{}", "Pipeline finished".green().bold());
            println!("  Run:          {}", orchestrator.run_id());
            println!(
                "  Items:        {} processed, {} failed, {} skipped ({:.1}% success)",
                metrics.items_processed,
                metrics.items_failed,
                metrics.items_skipped,
                metrics.success_rate()
            );
            println!("  Review queue: {}", orchestrator.review_items().len());
            println!(
                "  Event log:    {}",
                orchestrator.event_log_path().display()
            );
            if let Some(results) = results {
                println!(
                    "  Rankings:     {} tracks -> {}",
                    results.total_tracks(),
                    orchestrator.output_path().display()
                );
                if let Some(top) = results.top() {
                    println!("  Top track:    {} - {} ({:.3})", top.artist, top.title, top.score);
                }
            }
        }

        Commands::Validate { file } => {
            println!("Validating: {}", file.display());
            let report = reports::validate_file(&file)
                .with_context(|| format!("Could not read {}", file.display()))?;
            if report.is_valid() {
                let kind = report.kind.map(|k| k.model_name()).unwrap_or_default();
                println!(
                    "{} {} file with {} item(s)",
                    "Valid".green().bold(),
                    kind,
                    report.items
                );
            } else {
                for error in &report.errors {
                    println!("  {}", error.red());
                }
                bail!("Validation failed: {} error(s) found", report.errors.len());
            }
        }

        Commands::Export {
            format: ExportFormat::Csv,
            output,
            run_id,
        } => {
            let tracks = enriched_tracks(&settings, run_id)?;
            let path = output.unwrap_or_else(|| {
                settings
                    .output_dir()
                    .join(format!("export_{}.csv", settings.year))
            });
            let summary = reports::export_csv(&tracks, &path)?;
            println!(
                "{} {} rows, {} columns, {} bytes -> {}",
                "Exported".green().bold(),
                summary.rows,
                summary.columns,
                summary.bytes,
                summary.path.display()
            );
        }

        Commands::Stats { run_id } => {
            let stats = DatasetStats::from_tracks(&enriched_tracks(&settings, run_id)?);
            println!("{}", format!("Dataset statistics - {}", settings.year).bold());
            println!("  Total tracks: {}", stats.total_tracks);
            println!("  Metric coverage:");
            for (metric, count) in &stats.coverage {
                println!(
                    "    {:<20} {:>5} tracks ({:5.1}%)",
                    metric,
                    count,
                    stats.coverage_pct(metric)
                );
            }
        }

        Commands::Status { run_id } => {
            let orchestrator = open_existing(&settings, run_id)?;
            let status = orchestrator.status();
            println!("{} {}", "Run".bold(), status.run_id);
            println!("  {}", status.run_dir.display());
            println!("{}", summary_line("extraction", status.extraction));
            println!("{}", summary_line("enrichment", status.enrichment));
            println!("  Tracks stored:  {}", status.tracks);
            println!("  Enriched:       {}", status.enriched_tracks);
            println!("  Review queue:   {}", status.review_items);
        }

        Commands::Review { action, run_id } => {
            let mut orchestrator = open_existing(&settings, run_id)?;
            match action {
                ReviewAction::List => {
                    let items = orchestrator.review_items();
                    if items.is_empty() {
                        println!("Review queue is empty");
                    }
                    for item in items {
                        println!(
                            "{}  {} - {}  {}",
                            item.track_id.bold(),
                            item.artist,
                            item.title,
                            item.reason.yellow()
                        );
                    }
                }
                ReviewAction::Remove { track_id } => {
                    if orchestrator.review_queue_mut().remove(&track_id)? {
                        println!("Removed {}", track_id);
                    } else {
                        bail!("{} is not in the review queue", track_id);
                    }
                }
                ReviewAction::Clear => {
                    orchestrator.review_queue_mut().clear()?;
                    println!("Review queue cleared");
                }
            }
        }

        Commands::ClearCheckpoints { run_id } => {
            let orchestrator = open_existing(&settings, run_id)?;
            orchestrator.clear_checkpoints();
            println!("Checkpoints cleared for run {}", orchestrator.run_id());
        }

        Commands::Reset { yes, run_id } => {
            if !yes {
                bail!("Reset deletes checkpoints, stored tracks and the review queue; pass --yes to confirm");
            }
            let mut orchestrator = open_existing(&settings, run_id)?;
            orchestrator.reset_pipeline()?;
            println!("{} run {}", "Reset".red().bold(), orchestrator.run_id());
        }
    }

    Ok(())
}
