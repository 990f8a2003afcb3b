//! A small declarative workflow graph.
//!
//! Each computation step is a [`Provider`]: a plain function together with the [`Key`] of the
//! value it produces and the keys of the values it consumes. A [`Pipeline`] is a registry of
//! providers and parameters (pre-set values). Asking the pipeline for a set of targets resolves
//! the dependency graph into an [`ExecutionPlan`], topologically sorted when the plan is built,
//! so missing inputs and cycles are reported before anything is computed.
use fxhash::{FxHashMap, FxHashSet};
use ndarray::Array2;
use std::path::PathBuf;
use strum_macros::Display;

use super::error::PipelineError;
use super::image_stack::{AllImageStacks, ImageStack};
use super::nexus::HistogramModeDetector;
use super::time_log::TimeLog;

/// Identifier of every value that can flow through a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum Key {
    // Parameters
    FilePath,
    ImageDetectorName,
    HistogramModeDetectorsPath,
    RotationMotionSensorName,
    MinDim1,
    MaxDim1,
    MinDim2,
    MaxDim2,
    BackgroundPixelThreshold,
    SamplePixelThreshold,
    // Loading and classification
    HistogramModeDetector,
    HistogramModeDetectorData,
    ImageKeyLogs,
    RotationLogs,
    AllImageStacks,
    RawSampleImageStacks,
    OpenBeamImageStacks,
    DarkCurrentImageStacks,
    RotationAngleCoord,
    SampleImageStacks,
    // Normalization
    OpenBeamImage,
    DarkCurrentImage,
    RawBackgroundImage,
    BackgroundImage,
    RawCleansedSampleImages,
    CleansedSampleImages,
    AverageBackgroundPixelCounts,
    AverageSamplePixelCounts,
    ScaleFactor,
    NormalizedSampleImages,
}

/// A value computed by (or given to) a workflow
#[derive(Debug, Clone)]
pub enum Value {
    Path(PathBuf),
    Text(String),
    Detector(HistogramModeDetector),
    Stack(ImageStack),
    Stacks(AllImageStacks),
    KeyLog(TimeLog<i64>),
    FloatLog(TimeLog<f64>),
    Coord(Vec<f64>),
    Image(Array2<f64>),
    Scalar(f64),
    /// An optional pixel index bound
    Bound(Option<usize>),
}

/// Signature of every provider function
pub type ProviderFn = fn(&Inputs) -> Result<Value, PipelineError>;

/// A computation step: produces `output` from `inputs`
#[derive(Debug, Clone)]
pub struct Provider {
    pub output: Key,
    pub inputs: Vec<Key>,
    pub func: ProviderFn,
}

impl Provider {
    pub fn new(output: Key, inputs: &[Key], func: ProviderFn) -> Self {
        Self {
            output,
            inputs: inputs.to_vec(),
            func,
        }
    }
}

macro_rules! typed_getter {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, key: Key) -> Result<&$ty, PipelineError> {
            match self.get(key)? {
                Value::$variant(value) => Ok(value),
                _ => Err(PipelineError::TypeMismatch {
                    key,
                    expected: stringify!($variant),
                }),
            }
        }
    };
}

/// Read-only view of the values available to a provider
#[derive(Debug)]
pub struct Inputs<'a> {
    values: &'a FxHashMap<Key, Value>,
}

impl<'a> Inputs<'a> {
    pub fn get(&self, key: Key) -> Result<&'a Value, PipelineError> {
        self.values.get(&key).ok_or(PipelineError::NotComputed(key))
    }

    typed_getter!(path, Path, PathBuf);
    typed_getter!(text, Text, String);
    typed_getter!(detector, Detector, HistogramModeDetector);
    typed_getter!(stack, Stack, ImageStack);
    typed_getter!(stacks, Stacks, AllImageStacks);
    typed_getter!(key_log, KeyLog, TimeLog<i64>);
    typed_getter!(float_log, FloatLog, TimeLog<f64>);
    typed_getter!(coord, Coord, Vec<f64>);
    typed_getter!(image, Image, Array2<f64>);
    typed_getter!(scalar, Scalar, f64);
    typed_getter!(bound, Bound, Option<usize>);
}

/// Registry of providers and parameters
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    providers: FxHashMap<Key, Provider>,
    params: FxHashMap<Key, Value>,
}

impl Pipeline {
    pub fn new(providers: Vec<Provider>) -> Self {
        let mut pipeline = Self::default();
        for provider in providers {
            pipeline.insert(provider);
        }
        pipeline
    }

    /// Register a provider, replacing any previous provider of the same key
    pub fn insert(&mut self, provider: Provider) {
        self.providers.insert(provider.output, provider);
    }

    /// Set a parameter. A parameter takes precedence over a provider of the same key.
    pub fn set_param(&mut self, key: Key, value: Value) {
        self.params.insert(key, value);
    }

    pub fn param(&self, key: Key) -> Option<&Value> {
        self.params.get(&key)
    }

    /// Resolve the providers needed for `targets`, in an order where every provider runs after
    /// the providers of its inputs.
    pub fn build(&self, targets: &[Key]) -> Result<ExecutionPlan<'_>, PipelineError> {
        let mut order: Vec<&Provider> = Vec::new();
        let mut done: FxHashSet<Key> = FxHashSet::default();
        let mut visiting: FxHashSet<Key> = FxHashSet::default();
        for target in targets {
            self.visit(*target, &mut order, &mut done, &mut visiting)?;
        }
        Ok(ExecutionPlan {
            pipeline: self,
            targets: targets.to_vec(),
            order,
        })
    }

    fn visit<'a>(
        &'a self,
        key: Key,
        order: &mut Vec<&'a Provider>,
        done: &mut FxHashSet<Key>,
        visiting: &mut FxHashSet<Key>,
    ) -> Result<(), PipelineError> {
        if done.contains(&key) || self.params.contains_key(&key) {
            return Ok(());
        }
        let provider = self
            .providers
            .get(&key)
            .ok_or(PipelineError::MissingInput(key))?;
        if !visiting.insert(key) {
            return Err(PipelineError::Cycle(key));
        }
        for input in provider.inputs.iter() {
            self.visit(*input, order, done, visiting)?;
        }
        visiting.remove(&key);
        done.insert(key);
        order.push(provider);
        Ok(())
    }

    /// Build and run a plan for `targets` in one go
    pub fn compute(&self, targets: &[Key]) -> Result<FxHashMap<Key, Value>, PipelineError> {
        self.build(targets)?.run()
    }

    /// Compute a single target
    pub fn compute_one(&self, target: Key) -> Result<Value, PipelineError> {
        self.compute(&[target])?
            .remove(&target)
            .ok_or(PipelineError::NotComputed(target))
    }
}

/// A topologically sorted list of providers ready to run
#[derive(Debug)]
pub struct ExecutionPlan<'a> {
    pipeline: &'a Pipeline,
    targets: Vec<Key>,
    order: Vec<&'a Provider>,
}

impl ExecutionPlan<'_> {
    /// Keys of the providers in the order they will run
    pub fn steps(&self) -> Vec<Key> {
        self.order.iter().map(|provider| provider.output).collect()
    }

    /// Run every step and return the values of the targets
    pub fn run(&self) -> Result<FxHashMap<Key, Value>, PipelineError> {
        let mut values: FxHashMap<Key, Value> = self.pipeline.params.clone();
        for provider in self.order.iter() {
            spdlog::debug!("Computing {}", provider.output);
            let value = (provider.func)(&Inputs { values: &values })?;
            values.insert(provider.output, value);
        }
        let mut outputs = FxHashMap::default();
        for target in self.targets.iter() {
            let value = values
                .remove(target)
                .ok_or(PipelineError::NotComputed(*target))?;
            outputs.insert(*target, value);
        }
        Ok(outputs)
    }
}
