//! Event types for the msc pipeline event system
//!
//! Provides the immutable `PipelineEvent` value, the closed `EventType` set,
//! and (in the `observer` sub-module) the observer contract plus the
//! synchronous `Observable` fan-out used by stages and the orchestrator.

mod observer;

pub use observer::{dispatch, shared, NotifyPolicy, Observable, PipelineObserver, SharedObserver};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Pipeline event types
///
/// The first ten variants have a dedicated `PipelineObserver` handler;
/// the remaining ones are only delivered through `on_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PipelineStarted,
    PipelineCompleted,
    PipelineFailed,

    StageStarted,
    StageCompleted,
    StageFailed,

    ItemProcessing,
    ItemCompleted,
    ItemFailed,
    ItemSkipped,

    CheckpointSaved,
    CheckpointLoaded,

    Warning,
    Error,
}

impl EventType {
    /// All event types, in declaration order
    pub const ALL: [EventType; 14] = [
        EventType::PipelineStarted,
        EventType::PipelineCompleted,
        EventType::PipelineFailed,
        EventType::StageStarted,
        EventType::StageCompleted,
        EventType::StageFailed,
        EventType::ItemProcessing,
        EventType::ItemCompleted,
        EventType::ItemFailed,
        EventType::ItemSkipped,
        EventType::CheckpointSaved,
        EventType::CheckpointLoaded,
        EventType::Warning,
        EventType::Error,
    ];

    /// Get event type as string (same value as the serialized form)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PipelineStarted => "pipeline_started",
            EventType::PipelineCompleted => "pipeline_completed",
            EventType::PipelineFailed => "pipeline_failed",
            EventType::StageStarted => "stage_started",
            EventType::StageCompleted => "stage_completed",
            EventType::StageFailed => "stage_failed",
            EventType::ItemProcessing => "item_processing",
            EventType::ItemCompleted => "item_completed",
            EventType::ItemFailed => "item_failed",
            EventType::ItemSkipped => "item_skipped",
            EventType::CheckpointSaved => "checkpoint_saved",
            EventType::CheckpointLoaded => "checkpoint_loaded",
            EventType::Warning => "warning",
            EventType::Error => "error",
        }
    }

    /// Whether this event signals a failure of some kind
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventType::PipelineFailed
                | EventType::StageFailed
                | EventType::ItemFailed
                | EventType::Error
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error captured on an event
///
/// Events are plain values, so the originating error is reduced to its
/// type name and message at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    /// Short type (or variant) name of the error
    #[serde(rename = "type")]
    pub kind: String,
    /// Rendered error message
    pub message: String,
}

impl EventError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Capture any std error, using its short type name as `kind`
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        Self::new(short_type_name::<E>(), error.to_string())
    }
}

impl From<&crate::Error> for EventError {
    fn from(error: &crate::Error) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

/// Last path segment of a type name, without generic arguments
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Immutable pipeline event
///
/// Built by the emitting component with `PipelineEvent::new(..)` and the
/// `with_*` helpers, handed to `Observable::notify` by reference, then
/// dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub stage_name: Option<String>,
    pub item_id: Option<String>,
    pub message: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

impl PipelineEvent {
    /// Create an event stamped with the current time
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            timestamp: crate::time::now(),
            stage_name: None,
            item_id: None,
            message: None,
            metadata: None,
            error: None,
        }
    }

    pub fn with_stage(mut self, stage_name: impl Into<String>) -> Self {
        self.stage_name = Some(stage_name.into());
        self
    }

    pub fn with_item(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Replace the metadata map
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add one metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<EventError>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Look up a metadata value
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.to_rfc3339(), self.event_type)?;
        if let Some(stage) = &self.stage_name {
            write!(f, " stage={}", stage)?;
        }
        if let Some(item) = &self.item_id {
            write!(f, " item={}", item)?;
        }
        if let Some(message) = &self.message {
            write!(f, " {}", message)?;
        }
        Ok(())
    }
}
