//! Shared helpers for msc-pipeline integration tests

#![allow(dead_code)]

use anyhow::anyhow;
use msc_common::events::{EventType, PipelineEvent, PipelineObserver};
use msc_pipeline::collaborators::{
    Resolution, StatsProvider, TrackResolver, TrackSource, WeightedSumScorer,
};
use msc_pipeline::models::Track;
use msc_pipeline::pipeline::Collaborators;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

pub const YEAR: i32 = 2025;

pub fn track(title: &str) -> Track {
    Track::new(title, vec!["Artist".to_string()], YEAR)
}

/// `artist_{title}_2025`
pub fn id(title: &str) -> String {
    track(title).identifier()
}

/// Source returning a fixed list
pub struct VecSource(pub Vec<Track>);

impl TrackSource for VecSource {
    fn fetch_tracks(&self) -> anyhow::Result<Vec<Track>> {
        Ok(self.0.clone())
    }
}

pub struct FailingSource;

impl TrackSource for FailingSource {
    fn fetch_tracks(&self) -> anyhow::Result<Vec<Track>> {
        Err(anyhow!("chart service unreachable"))
    }
}

/// Resolves every track to `ext-{title}` except the titles in `failing`,
/// whose lookup errors
#[derive(Default)]
pub struct StubResolver {
    pub failing: BTreeSet<String>,
    pub calls: Mutex<Vec<String>>,
}

impl StubResolver {
    pub fn failing(titles: &[&str]) -> Self {
        Self {
            failing: titles.iter().map(|t| t.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TrackResolver for StubResolver {
    fn resolve(&self, track: &Track) -> anyhow::Result<Resolution> {
        self.calls.lock().unwrap().push(track.title.clone());
        if self.failing.contains(&track.title) {
            return Err(anyhow!("lookup timed out"));
        }
        Ok(Resolution::Found {
            external_id: format!("ext-{}", track.title),
            external_title: track.title.clone(),
        })
    }
}

/// Same stats for every external id; the id's length scales the score
pub struct StubStats;

impl StatsProvider for StubStats {
    fn fetch_stats(&self, external_id: &str) -> anyhow::Result<BTreeMap<String, f64>> {
        let mut stats = BTreeMap::new();
        stats.insert("streams".to_string(), external_id.len() as f64);
        Ok(stats)
    }
}

pub fn collaborators(tracks: Vec<Track>, failing: &[&str]) -> Collaborators {
    Collaborators {
        source: Box::new(VecSource(tracks)),
        resolver: Box::new(StubResolver::failing(failing)),
        stats: Box::new(StubStats),
        scorer: Box::new(WeightedSumScorer::default()),
    }
}

/// Observer recording every event
#[derive(Default)]
pub struct Collector {
    pub events: Vec<PipelineEvent>,
}

impl Collector {
    pub fn types(&self) -> Vec<EventType> {
        self.events.iter().map(|e| e.event_type).collect()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl PipelineObserver for Collector {
    fn on_event(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Observer failing on every event
pub struct FailingObserver;

impl PipelineObserver for FailingObserver {
    fn on_event(&mut self, _event: &PipelineEvent) -> msc_common::Result<()> {
        Err(msc_common::Error::Observer("sink closed".to_string()))
    }
}

pub fn collector() -> Arc<Mutex<Collector>> {
    msc_common::events::shared(Collector::default())
}

/// Observer failing only on one event type
pub struct FailOn(pub EventType);

impl PipelineObserver for FailOn {
    fn on_event(&mut self, event: &PipelineEvent) -> msc_common::Result<()> {
        if event.event_type == self.0 {
            return Err(msc_common::Error::Observer(format!(
                "rejected {:?}",
                event.event_type
            )));
        }
        Ok(())
    }
}
