//! Terminal progress bars, one per stage

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use msc_common::events::{PipelineEvent, PipelineObserver};
use serde_json::Value;
use std::collections::HashMap;

const BAR_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";

/// Draws a bar for every stage that announces a `total`
///
/// A bar is created on the stage-started event carrying a `total` in its
/// metadata, advanced by each completed, failed or skipped item and
/// finished when the stage completes.
pub struct ProgressObserver {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: HashMap<String, ProgressBar>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Observer that tracks progress without drawing
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .map(|s| s.progress_chars("##-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        Self {
            multi: MultiProgress::with_draw_target(target),
            style,
            bars: HashMap::new(),
        }
    }

    /// Current position of a stage's bar
    pub fn position(&self, stage: &str) -> Option<u64> {
        self.bars.get(stage).map(ProgressBar::position)
    }

    /// Length of a stage's bar
    pub fn length(&self, stage: &str) -> Option<u64> {
        self.bars.get(stage).and_then(ProgressBar::length)
    }

    fn advance(&self, event: &PipelineEvent) {
        if let Some(bar) = event.stage_name.as_ref().and_then(|s| self.bars.get(s)) {
            bar.inc(1);
        }
    }

    fn finish_all(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.finish();
            }
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineObserver for ProgressObserver {
    fn on_event(&mut self, _event: &PipelineEvent) -> msc_common::Result<()> {
        Ok(())
    }

    fn on_stage_started(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        let (Some(stage), Some(total)) = (
            event.stage_name.as_ref(),
            event.meta("total").and_then(Value::as_u64),
        ) else {
            return Ok(());
        };

        let bar = self.multi.add(ProgressBar::new(total));
        bar.set_style(self.style.clone());
        bar.set_message(stage.clone());
        if let Some(previous) = self.bars.insert(stage.clone(), bar) {
            previous.finish_and_clear();
        }
        Ok(())
    }

    fn on_item_completed(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        self.advance(event);
        Ok(())
    }

    fn on_item_failed(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        self.advance(event);
        Ok(())
    }

    fn on_item_skipped(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        self.advance(event);
        Ok(())
    }

    fn on_stage_completed(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        if let Some(bar) = event.stage_name.as_ref().and_then(|s| self.bars.get(s)) {
            if let Some(len) = bar.length() {
                bar.set_position(len);
            }
            bar.finish();
        }
        Ok(())
    }

    fn on_pipeline_completed(&mut self, _event: &PipelineEvent) -> msc_common::Result<()> {
        self.finish_all();
        Ok(())
    }

    fn on_pipeline_failed(&mut self, _event: &PipelineEvent) -> msc_common::Result<()> {
        self.finish_all();
        Ok(())
    }
}
