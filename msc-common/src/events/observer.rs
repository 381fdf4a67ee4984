//! Observer contract and synchronous event fan-out
//!
//! Observers are shared handles so the same sink (console, event log,
//! metrics, ...) can be attached to the orchestrator and to every stage.
//! Delivery is synchronous: `Observable::notify` returns only after every
//! attached observer handled the event, in attachment order.

use super::{EventType, PipelineEvent};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Sink for pipeline events
///
/// Only `on_event` is required. Every type-specific handler defaults to
/// forwarding to `on_event`, so an observer overrides just the events it
/// treats differently.
pub trait PipelineObserver: Send {
    /// Handle any pipeline event
    fn on_event(&mut self, event: &PipelineEvent) -> Result<()>;

    fn on_pipeline_started(&mut self, event: &PipelineEvent) -> Result<()> {
        self.on_event(event)
    }

    fn on_pipeline_completed(&mut self, event: &PipelineEvent) -> Result<()> {
        self.on_event(event)
    }

    fn on_pipeline_failed(&mut self, event: &PipelineEvent) -> Result<()> {
        self.on_event(event)
    }

    fn on_stage_started(&mut self, event: &PipelineEvent) -> Result<()> {
        self.on_event(event)
    }

    fn on_stage_completed(&mut self, event: &PipelineEvent) -> Result<()> {
        self.on_event(event)
    }

    fn on_stage_failed(&mut self, event: &PipelineEvent) -> Result<()> {
        self.on_event(event)
    }

    fn on_item_processing(&mut self, event: &PipelineEvent) -> Result<()> {
        self.on_event(event)
    }

    fn on_item_completed(&mut self, event: &PipelineEvent) -> Result<()> {
        self.on_event(event)
    }

    fn on_item_failed(&mut self, event: &PipelineEvent) -> Result<()> {
        self.on_event(event)
    }

    fn on_item_skipped(&mut self, event: &PipelineEvent) -> Result<()> {
        self.on_event(event)
    }
}

/// Shared observer handle
pub type SharedObserver = Arc<Mutex<dyn PipelineObserver>>;

/// Wrap an observer so it can be attached to several observables
///
/// Keep the returned concrete handle to read the observer's state later;
/// it coerces to `SharedObserver` when attached.
pub fn shared<O: PipelineObserver + 'static>(observer: O) -> Arc<Mutex<O>> {
    Arc::new(Mutex::new(observer))
}

/// Route an event to the handler matching its type
pub fn dispatch(observer: &mut dyn PipelineObserver, event: &PipelineEvent) -> Result<()> {
    match event.event_type {
        EventType::PipelineStarted => observer.on_pipeline_started(event),
        EventType::PipelineCompleted => observer.on_pipeline_completed(event),
        EventType::PipelineFailed => observer.on_pipeline_failed(event),
        EventType::StageStarted => observer.on_stage_started(event),
        EventType::StageCompleted => observer.on_stage_completed(event),
        EventType::StageFailed => observer.on_stage_failed(event),
        EventType::ItemProcessing => observer.on_item_processing(event),
        EventType::ItemCompleted => observer.on_item_completed(event),
        EventType::ItemFailed => observer.on_item_failed(event),
        EventType::ItemSkipped => observer.on_item_skipped(event),
        EventType::CheckpointSaved
        | EventType::CheckpointLoaded
        | EventType::Warning
        | EventType::Error => observer.on_event(event),
    }
}

/// What `notify` does when an observer returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Stop the fan-out and return the error to the emitter
    #[default]
    Propagate,
    /// Log the error and keep delivering to the remaining observers
    Isolate,
}

impl std::str::FromStr for NotifyPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "propagate" => Ok(NotifyPolicy::Propagate),
            "isolate" => Ok(NotifyPolicy::Isolate),
            other => Err(Error::InvalidInput(format!(
                "unknown notify policy '{}' (expected 'propagate' or 'isolate')",
                other
            ))),
        }
    }
}

/// Ordered set of observers with synchronous fan-out
#[derive(Clone, Default)]
pub struct Observable {
    observers: Vec<SharedObserver>,
    policy: NotifyPolicy,
}

impl Observable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: NotifyPolicy) -> Self {
        Self {
            observers: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> NotifyPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: NotifyPolicy) {
        self.policy = policy;
    }

    /// Attach an observer; returns false if this handle was already attached
    pub fn attach(&mut self, observer: SharedObserver) -> bool {
        if self.contains(&observer) {
            return false;
        }
        self.observers.push(observer);
        true
    }

    /// Detach an observer; returns false if it was not attached
    pub fn detach(&mut self, observer: &SharedObserver) -> bool {
        match self.observers.iter().position(|o| same_observer(o, observer)) {
            Some(index) => {
                self.observers.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, observer: &SharedObserver) -> bool {
        self.observers.iter().any(|o| same_observer(o, observer))
    }

    /// Attached observers, in attachment order
    pub fn observers(&self) -> &[SharedObserver] {
        &self.observers
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Build an event stamped with the current time
    pub fn create_event(event_type: EventType) -> PipelineEvent {
        PipelineEvent::new(event_type)
    }

    /// Deliver an event to every observer, in attachment order
    pub fn notify(&self, event: &PipelineEvent) -> Result<()> {
        for observer in &self.observers {
            let result = {
                let mut guard = lock_observer(observer);
                dispatch(&mut *guard, event)
            };

            if let Err(e) = result {
                match self.policy {
                    NotifyPolicy::Propagate => return Err(e),
                    NotifyPolicy::Isolate => {
                        warn!(
                            event_type = %event.event_type,
                            error = %e,
                            "Observer failed to handle event, continuing delivery"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("observers", &self.observers.len())
            .field("policy", &self.policy)
            .finish()
    }
}

fn same_observer(a: &SharedObserver, b: &SharedObserver) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Lock an observer, recovering from a poisoned mutex
fn lock_observer(observer: &SharedObserver) -> MutexGuard<'_, dyn PipelineObserver + 'static> {
    observer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records (observer name, handler name, event type) into a shared log
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<(String, &'static str, EventType)>>>,
    }

    impl PipelineObserver for Recorder {
        fn on_event(&mut self, event: &PipelineEvent) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push((self.name.to_string(), "on_event", event.event_type));
            Ok(())
        }

        fn on_stage_started(&mut self, event: &PipelineEvent) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push((self.name.to_string(), "on_stage_started", event.event_type));
            Ok(())
        }
    }

    struct Failing;

    impl PipelineObserver for Failing {
        fn on_event(&mut self, _event: &PipelineEvent) -> Result<()> {
            Err(Error::Observer("sink unavailable".to_string()))
        }
    }

    type Log = Arc<Mutex<Vec<(String, &'static str, EventType)>>>;

    fn recorder(name: &'static str, log: &Log) -> SharedObserver {
        shared(Recorder {
            name,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_fan_out_in_attachment_order() {
        let log: Log = Arc::default();
        let mut observable = Observable::new();
        observable.attach(recorder("o1", &log));
        observable.attach(recorder("o2", &log));
        observable.attach(recorder("o3", &log));

        observable
            .notify(&PipelineEvent::new(EventType::ItemCompleted))
            .unwrap();

        let names: Vec<String> = log.lock().unwrap().iter().map(|r| r.0.clone()).collect();
        assert_eq!(names, vec!["o1", "o2", "o3"]);
    }

    #[test]
    fn test_specific_handler_used_when_overridden() {
        let log: Log = Arc::default();
        let mut observable = Observable::new();
        observable.attach(recorder("o1", &log));

        observable
            .notify(&PipelineEvent::new(EventType::StageStarted))
            .unwrap();
        observable
            .notify(&PipelineEvent::new(EventType::StageCompleted))
            .unwrap();
        observable
            .notify(&PipelineEvent::new(EventType::CheckpointSaved))
            .unwrap();

        let handlers: Vec<&str> = log.lock().unwrap().iter().map(|r| r.1).collect();
        assert_eq!(handlers, vec!["on_stage_started", "on_event", "on_event"]);
    }

    #[test]
    fn test_attach_is_idempotent() {
        let log: Log = Arc::default();
        let observer = recorder("o1", &log);
        let mut observable = Observable::new();

        assert!(observable.attach(Arc::clone(&observer)));
        assert!(!observable.attach(Arc::clone(&observer)));
        assert_eq!(observable.len(), 1);

        observable
            .notify(&PipelineEvent::new(EventType::Warning))
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_detach_unknown_is_noop() {
        let log: Log = Arc::default();
        let mut observable = Observable::new();
        observable.attach(recorder("o1", &log));

        let stranger = recorder("o2", &log);
        assert!(!observable.detach(&stranger));
        assert_eq!(observable.len(), 1);
    }

    #[test]
    fn test_detach_removes_observer() {
        let log: Log = Arc::default();
        let observer = recorder("o1", &log);
        let mut observable = Observable::new();
        observable.attach(Arc::clone(&observer));

        assert!(observable.detach(&observer));
        assert!(observable.is_empty());
        observable
            .notify(&PipelineEvent::new(EventType::Warning))
            .unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_poisoned_observer_still_receives_events() {
        let log: Log = Arc::default();
        let observer = recorder("o1", &log);
        let poisoner = Arc::clone(&observer);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("observer panicked mid-event");
        })
        .join();
        assert!(observer.is_poisoned());

        let mut observable = Observable::new();
        observable.attach(observer);
        observable
            .notify(&PipelineEvent::new(EventType::Warning))
            .unwrap();

        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_propagate_policy_stops_delivery() {
        let log: Log = Arc::default();
        let mut observable = Observable::new();
        observable.attach(recorder("before", &log));
        observable.attach(shared(Failing));
        observable.attach(recorder("after", &log));

        let result = observable.notify(&PipelineEvent::new(EventType::Warning));

        assert!(matches!(result, Err(Error::Observer(_))));
        let names: Vec<String> = log.lock().unwrap().iter().map(|r| r.0.clone()).collect();
        assert_eq!(names, vec!["before"]);
    }

    #[test]
    fn test_isolate_policy_continues_delivery() {
        let log: Log = Arc::default();
        let mut observable = Observable::with_policy(NotifyPolicy::Isolate);
        observable.attach(recorder("before", &log));
        observable.attach(shared(Failing));
        observable.attach(recorder("after", &log));

        observable
            .notify(&PipelineEvent::new(EventType::Warning))
            .unwrap();

        let names: Vec<String> = log.lock().unwrap().iter().map(|r| r.0.clone()).collect();
        assert_eq!(names, vec!["before", "after"]);
    }

    #[test]
    fn test_notify_policy_from_str() {
        assert_eq!("isolate".parse::<NotifyPolicy>().unwrap(), NotifyPolicy::Isolate);
        assert_eq!(" Propagate ".parse::<NotifyPolicy>().unwrap(), NotifyPolicy::Propagate);
        assert!("ignore".parse::<NotifyPolicy>().is_err());
    }
}
