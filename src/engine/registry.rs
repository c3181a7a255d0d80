//! Capability registry: maps `module.function` identifiers to step and loader implementations.
//!
//! Populated at startup by static registration ([`StepRegistry::with_builtins`] plus any
//! `register_*` calls made by the embedding program). Nothing is loaded dynamically.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::ItemState;
use crate::pipeline::SharedState;

/// Parameters handed to a step: its own config section plus the run's shared lock and map.
#[derive(Clone, Debug, Default)]
pub struct StepParams {
    params: BTreeMap<String, String>,
    shared: SharedState,
}

impl StepParams {
    pub fn new(params: BTreeMap<String, String>, shared: SharedState) -> Self {
        Self { params, shared }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parse a parameter. Missing is `Ok(None)`; present but unparsable is an error.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.get(key)
            .map(|v| {
                v.trim()
                    .parse::<T>()
                    .with_context(|| format!("invalid value for parameter `{key}`: {v:?}"))
            })
            .transpose()
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }
}

/// One analysis stage. Mutates the item in place; an error abandons the item.
pub trait PipelineStep: Send + Sync {
    fn run(&self, state: &mut ItemState, params: &StepParams) -> Result<()>;
}

impl<F> PipelineStep for F
where
    F: Fn(&mut ItemState, &StepParams) -> Result<()> + Send + Sync,
{
    fn run(&self, state: &mut ItemState, params: &StepParams) -> Result<()> {
        self(state, params)
    }
}

/// Builds the [`ItemState`] for one input path. `outdir` already exists when this is called.
pub trait ItemLoader: Send + Sync {
    fn load(
        &self,
        path: &Path,
        outdir: &Path,
        params: &BTreeMap<String, String>,
    ) -> Result<ItemState>;
}

impl<F> ItemLoader for F
where
    F: Fn(&Path, &Path, &BTreeMap<String, String>) -> Result<ItemState> + Send + Sync,
{
    fn load(
        &self,
        path: &Path,
        outdir: &Path,
        params: &BTreeMap<String, String>,
    ) -> Result<ItemState> {
        self(path, outdir, params)
    }
}

/// Identifier → capability tables.
#[derive(Default, Clone)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn PipelineStep>>,
    loaders: HashMap<String, Arc<dyn ItemLoader>>,
}

impl StepRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in loader and steps from [`crate::engine::steps`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::engine::steps::register_builtins(&mut registry);
        registry
    }

    /// Register a step under `module.function`. A later registration replaces an earlier one.
    pub fn register_step<S>(&mut self, key: &str, step: S) -> &mut Self
    where
        S: PipelineStep + 'static,
    {
        self.steps.insert(key.to_string(), Arc::new(step));
        self
    }

    pub fn register_loader<L>(&mut self, key: &str, loader: L) -> &mut Self
    where
        L: ItemLoader + 'static,
    {
        self.loaders.insert(key.to_string(), Arc::new(loader));
        self
    }

    pub fn step(&self, key: &str) -> Option<Arc<dyn PipelineStep>> {
        self.steps.get(key).cloned()
    }

    pub fn loader(&self, key: &str) -> Option<Arc<dyn ItemLoader>> {
        self.loaders.get(key).cloned()
    }

    /// Registered step keys, sorted.
    pub fn step_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}
