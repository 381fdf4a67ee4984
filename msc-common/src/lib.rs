//! # MSC Common Library
//!
//! Shared code for the music-charts pipeline crates:
//! - Error type and Result alias
//! - Settings loading (TOML + environment)
//! - Event model (`PipelineEvent`, `EventType`)
//! - Observer contract and the `Observable` fan-out
//! - Time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventType, Observable, PipelineEvent, PipelineObserver, SharedObserver};
