//! Stage contract and sequential stage runner
//!
//! A stage is a three-phase unit: `extract` produces its input,
//! `transform` does the work, `load` persists the result. `Pipeline` runs
//! a list of heterogeneous stages in order and collects their outputs by
//! stage name; it is the generic runner for stages that each extract their
//! own input. The `Orchestrator` chains the built-in stages itself so that
//! one stage's output feeds the next through `run_with`.

pub mod orchestrator;
pub mod resume;
pub mod stages;

pub use orchestrator::{
    find_latest_run, Collaborators, Orchestrator, OrchestratorOptions, RunStatus, StageSelection,
};
pub use resume::{ItemOutcome, ItemResult, ResumableRun, ReviewRequest};

use crate::Result;
use std::any::Any;
use std::collections::BTreeMap;
use tracing::{error, info};

/// Extract / transform / load execution unit
pub trait PipelineStage {
    type Input;
    type Output;

    /// Human-readable stage name, also used in events
    fn stage_name(&self) -> &str;

    fn extract(&mut self) -> Result<Self::Input>;

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;

    fn load(&mut self, output: &Self::Output) -> Result<()>;

    /// Run extract, transform and load in order
    ///
    /// The first error aborts the run; nothing is rolled back.
    fn run(&mut self) -> Result<Self::Output> {
        info!("Starting {}", self.stage_name());

        info!("{}: extracting", self.stage_name());
        let input = self.extract()?;

        self.run_with(input)
    }

    /// Run transform and load on input handed over by an earlier stage
    fn run_with(&mut self, input: Self::Input) -> Result<Self::Output> {
        let name = self.stage_name().to_string();

        info!("{}: transforming", name);
        let output = self.transform(input)?;

        info!("{}: loading", name);
        self.load(&output)?;

        info!("Completed {}", name);
        Ok(output)
    }
}

/// Object-safe view of a stage with its output boxed
trait ErasedStage {
    fn name(&self) -> String;
    fn run_boxed(&mut self) -> Result<Box<dyn Any>>;
}

impl<S> ErasedStage for S
where
    S: PipelineStage,
    S::Output: 'static,
{
    fn name(&self) -> String {
        self.stage_name().to_string()
    }

    fn run_boxed(&mut self) -> Result<Box<dyn Any>> {
        Ok(Box::new(self.run()?))
    }
}

/// Ordered list of self-contained stages, run one after another
#[derive(Default)]
pub struct Pipeline<'a> {
    stages: Vec<Box<dyn ErasedStage + 'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn add_stage<S>(&mut self, stage: S) -> &mut Self
    where
        S: PipelineStage + 'a,
        S::Output: 'static,
    {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage whose name is in `only` (all stages when `None`)
    ///
    /// A later stage with the same name overwrites the earlier output. The
    /// first failing stage aborts the remaining ones.
    pub fn run(&mut self, only: Option<&[&str]>) -> Result<StageOutputs> {
        let mut outputs = StageOutputs::default();

        for stage in &mut self.stages {
            let name = stage.name();
            if let Some(only) = only {
                if !only.contains(&name.as_str()) {
                    info!("Skipping {}", name);
                    continue;
                }
            }

            match stage.run_boxed() {
                Ok(output) => outputs.insert(name, output),
                Err(e) => {
                    error!("Stage {} failed: {}", name, e);
                    return Err(e);
                }
            }
        }

        Ok(outputs)
    }
}

/// Stage outputs keyed by stage name
#[derive(Default)]
pub struct StageOutputs {
    outputs: BTreeMap<String, Box<dyn Any>>,
}

impl StageOutputs {
    fn insert(&mut self, name: String, output: Box<dyn Any>) {
        self.outputs.insert(name, output);
    }

    /// Output of `name`, if it ran and produced a `T`
    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.outputs.get(name).and_then(|o| o.downcast_ref::<T>())
    }

    /// Take ownership of an output
    pub fn take<T: 'static>(&mut self, name: &str) -> Option<T> {
        match self.outputs.remove(name)?.downcast::<T>() {
            Ok(output) => Some(*output),
            Err(other) => {
                self.outputs.insert(name.to_string(), other);
                None
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.outputs.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Stage that records its phases into a shared log
    struct Recording {
        name: &'static str,
        value: i32,
        fail_in: Option<&'static str>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Recording {
        fn new(name: &'static str, value: i32, log: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                name,
                value,
                fail_in: None,
                log: Rc::clone(log),
            }
        }

        fn record(&self, phase: &'static str) -> Result<()> {
            self.log.borrow_mut().push(format!("{}:{}", self.name, phase));
            if self.fail_in == Some(phase) {
                return Err(PipelineError::stage(self.name, format!("{} failed", phase)));
            }
            Ok(())
        }
    }

    impl PipelineStage for Recording {
        type Input = i32;
        type Output = i32;

        fn stage_name(&self) -> &str {
            self.name
        }

        fn extract(&mut self) -> Result<i32> {
            self.record("extract")?;
            Ok(self.value)
        }

        fn transform(&mut self, input: i32) -> Result<i32> {
            self.record("transform")?;
            Ok(input * 10)
        }

        fn load(&mut self, _output: &i32) -> Result<()> {
            self.record("load")
        }
    }

    /// Stage with a different output type
    struct Labels;

    impl PipelineStage for Labels {
        type Input = ();
        type Output = Vec<String>;

        fn stage_name(&self) -> &str {
            "labels"
        }

        fn extract(&mut self) -> Result<()> {
            Ok(())
        }

        fn transform(&mut self, _input: ()) -> Result<Vec<String>> {
            Ok(vec!["a".into(), "b".into()])
        }

        fn load(&mut self, _output: &Vec<String>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stage_run_executes_phases_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stage = Recording::new("one", 2, &log);

        assert_eq!(stage.run().unwrap(), 20);
        assert_eq!(
            *log.borrow(),
            vec!["one:extract", "one:transform", "one:load"]
        );
    }

    #[test]
    fn test_stage_run_stops_at_first_error() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stage = Recording::new("one", 2, &log);
        stage.fail_in = Some("transform");

        assert!(stage.run().is_err());
        assert_eq!(*log.borrow(), vec!["one:extract", "one:transform"]);
    }

    #[test]
    fn test_run_with_skips_extract() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stage = Recording::new("one", 2, &log);

        assert_eq!(stage.run_with(7).unwrap(), 70);
        assert_eq!(*log.borrow(), vec!["one:transform", "one:load"]);
    }

    #[test]
    fn test_pipeline_collects_typed_outputs() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline
            .add_stage(Recording::new("one", 1, &log))
            .add_stage(Labels);

        let mut outputs = pipeline.run(None).unwrap();

        assert_eq!(outputs.get::<i32>("one"), Some(&10));
        assert!(outputs.get::<String>("one").is_none());
        assert_eq!(
            outputs.take::<Vec<String>>("labels").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(!outputs.contains("labels"));
    }

    #[test]
    fn test_pipeline_runs_only_selected_stages() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline
            .add_stage(Recording::new("one", 1, &log))
            .add_stage(Recording::new("two", 2, &log));

        let outputs = pipeline.run(Some(&["two"])).unwrap();

        assert_eq!(outputs.names(), vec!["two"]);
        assert!(log.borrow().iter().all(|entry| entry.starts_with("two:")));
    }

    #[test]
    fn test_pipeline_repeated_name_overwrites() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline
            .add_stage(Recording::new("same", 1, &log))
            .add_stage(Recording::new("same", 2, &log));

        let outputs = pipeline.run(None).unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs.get::<i32>("same"), Some(&20));
    }

    #[test]
    fn test_pipeline_failure_aborts_remaining_stages() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut failing = Recording::new("one", 1, &log);
        failing.fail_in = Some("load");
        let mut pipeline = Pipeline::new();
        pipeline
            .add_stage(failing)
            .add_stage(Recording::new("two", 2, &log));

        let result = pipeline.run(None);

        assert!(matches!(result, Err(PipelineError::Stage { .. })));
        assert!(!log.borrow().iter().any(|entry| entry.starts_with("two:")));
    }
}
