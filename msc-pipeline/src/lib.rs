//! # msc-pipeline
//!
//! Resumable music-charts pipeline engine.
//!
//! - `storage`: atomic JSON files, stage checkpoints, manual review queue, repositories
//! - `pipeline`: stage contract, resume helper, concrete stages, orchestrator
//! - `observers`: console, event log, progress and metrics sinks
//! - `collaborators`: traits for external services plus offline implementations
//! - `reports`: file validation, CSV export and dataset statistics

pub mod collaborators;
pub mod error;
pub mod models;
pub mod observers;
pub mod pipeline;
pub mod reports;
pub mod storage;

pub use error::{PipelineError, Result};
