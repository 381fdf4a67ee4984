//! Standard observers attached by the orchestrator
//!
//! - `ConsoleObserver`: coloured event lines on stdout
//! - `FileObserver`: JSONL event log
//! - `ProgressObserver`: one progress bar per stage
//! - `MetricsObserver`: counters for the run summary

pub mod console;
pub mod file;
pub mod metrics;
pub mod progress;

pub use console::ConsoleObserver;
pub use file::FileObserver;
pub use metrics::{MetricsObserver, PipelineMetrics};
pub use progress::ProgressObserver;
