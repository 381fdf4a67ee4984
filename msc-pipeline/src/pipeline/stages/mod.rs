//! Concrete stages: extraction, enrichment, ranking
//!
//! Each stage owns an `Observable` and reports `STAGE_*` and `ITEM_*`
//! events through it. Collaborators, repositories, the checkpoint manager
//! and the review queue are borrowed from the caller.

pub mod enrichment;
pub mod extraction;
pub mod ranking;

pub use enrichment::EnrichmentStage;
pub use extraction::ExtractionStage;
pub use ranking::RankingStage;

use crate::PipelineError;
use msc_common::events::{EventType, Observable, PipelineEvent};
use tracing::{error, warn};

/// Report a stage failure and hand the error back to the caller
///
/// A failure to deliver the event is logged; the stage error is still returned.
pub(crate) fn stage_failed(
    observable: &Observable,
    stage_name: &str,
    message: &str,
    err: PipelineError,
) -> PipelineError {
    error!(stage = %stage_name, "{}: {}", message, err);
    let event = PipelineEvent::new(EventType::StageFailed)
        .with_stage(stage_name)
        .with_message(format!("{}: {}", message, err))
        .with_error(&err);
    if let Err(notify_err) = observable.notify(&event) {
        warn!("Could not report stage failure: {}", notify_err);
    }
    err
}

/// Report a load (persistence) failure as an `ERROR` event
pub(crate) fn load_failed(
    observable: &Observable,
    stage_name: &str,
    message: &str,
    err: PipelineError,
) -> PipelineError {
    error!(stage = %stage_name, "{}: {}", message, err);
    let event = PipelineEvent::new(EventType::Error)
        .with_stage(stage_name)
        .with_message(message)
        .with_error(&err);
    if let Err(notify_err) = observable.notify(&event) {
        warn!("Could not report load failure: {}", notify_err);
    }
    err
}
