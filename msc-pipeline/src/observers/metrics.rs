//! Run counters

use msc_common::events::{PipelineEvent, PipelineObserver};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counters accumulated over a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineMetrics {
    pub items_processed: usize,
    pub items_failed: usize,
    pub items_skipped: usize,
    pub stages_completed: usize,
    pub stages_failed: usize,
    /// Count of every event received, keyed by event type
    pub events_by_type: BTreeMap<String, usize>,
}

impl PipelineMetrics {
    /// Percentage of finished items that succeeded; 0 before any item finishes
    pub fn success_rate(&self) -> f64 {
        let finished = self.items_processed + self.items_failed;
        if finished == 0 {
            return 0.0;
        }
        self.items_processed as f64 / finished as f64 * 100.0
    }
}

#[derive(Debug, Default)]
pub struct MetricsObserver {
    metrics: PipelineMetrics,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the counters
    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.clone()
    }

    pub fn success_rate(&self) -> f64 {
        self.metrics.success_rate()
    }
}

impl PipelineObserver for MetricsObserver {
    fn on_event(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        *self
            .metrics
            .events_by_type
            .entry(event.event_type.as_str().to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    fn on_item_completed(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        self.metrics.items_processed += 1;
        self.on_event(event)
    }

    fn on_item_failed(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        self.metrics.items_failed += 1;
        self.on_event(event)
    }

    fn on_item_skipped(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        self.metrics.items_skipped += 1;
        self.on_event(event)
    }

    fn on_stage_completed(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        self.metrics.stages_completed += 1;
        self.on_event(event)
    }

    fn on_stage_failed(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        self.metrics.stages_failed += 1;
        self.on_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msc_common::events::{dispatch, EventType};

    fn feed(observer: &mut MetricsObserver, types: &[EventType]) {
        for event_type in types {
            dispatch(observer, &PipelineEvent::new(*event_type)).unwrap();
        }
    }

    #[test]
    fn test_counts_items_and_stages() {
        let mut observer = MetricsObserver::new();
        feed(
            &mut observer,
            &[
                EventType::StageStarted,
                EventType::ItemCompleted,
                EventType::ItemFailed,
                EventType::ItemCompleted,
                EventType::ItemSkipped,
                EventType::StageCompleted,
                EventType::StageFailed,
            ],
        );

        let metrics = observer.metrics();
        assert_eq!(metrics.items_processed, 2);
        assert_eq!(metrics.items_failed, 1);
        assert_eq!(metrics.items_skipped, 1);
        assert_eq!(metrics.stages_completed, 1);
        assert_eq!(metrics.stages_failed, 1);
        assert_eq!(metrics.events_by_type["item_completed"], 2);
        assert_eq!(metrics.events_by_type["stage_started"], 1);
        assert_eq!(metrics.events_by_type.values().sum::<usize>(), 7);
    }

    #[test]
    fn test_success_rate() {
        let mut observer = MetricsObserver::new();
        assert_eq!(observer.success_rate(), 0.0);

        feed(
            &mut observer,
            &[
                EventType::ItemCompleted,
                EventType::ItemCompleted,
                EventType::ItemCompleted,
                EventType::ItemFailed,
                EventType::ItemSkipped,
            ],
        );
        assert!((observer.success_rate() - 75.0).abs() < 1e-9);
    }
}
