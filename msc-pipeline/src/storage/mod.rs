//! Persistence: atomic JSON writes, checkpoints, review queue, repositories

pub mod atomic;
pub mod checkpoint;
pub mod repository;
pub mod review_queue;

pub use checkpoint::{CheckpointManager, CheckpointState, CheckpointSummary};
pub use repository::{JsonRepository, Repository};
pub use review_queue::{ManualReviewItem, ManualReviewQueue};
