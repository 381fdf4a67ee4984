//! Console event printer

use colored::{ColoredString, Colorize};
use msc_common::events::{EventType, PipelineEvent, PipelineObserver};

pub struct ConsoleObserver {
    verbose: bool,
}

impl ConsoleObserver {
    /// `verbose` also prints per-item progress and checkpoint saves
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Styled line for `event`, or `None` if it is filtered out
    pub fn render(&self, event: &PipelineEvent) -> Option<ColoredString> {
        if !self.verbose
            && matches!(
                event.event_type,
                EventType::ItemProcessing | EventType::CheckpointSaved
            )
        {
            return None;
        }

        let line = event.to_string();
        let styled = match event.event_type {
            EventType::PipelineFailed | EventType::StageFailed | EventType::Error => {
                line.red().bold()
            }
            EventType::ItemFailed | EventType::Warning => line.yellow(),
            EventType::PipelineCompleted | EventType::StageCompleted => line.green().bold(),
            EventType::PipelineStarted | EventType::StageStarted => line.blue().bold(),
            _ => line.dimmed(),
        };
        Some(styled)
    }
}

impl PipelineObserver for ConsoleObserver {
    fn on_event(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        if let Some(line) = self.render(event) {
            println!("{}", line);
        }
        Ok(())
    }
}
