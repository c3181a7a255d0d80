//! Resolve configured step identifiers into capabilities with their parameter maps.

use log::info;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::registry::{ItemLoader, PipelineStep, StepRegistry};
use crate::error::RunError;
use crate::utils::config::ConfigSections;
use crate::utils::pipeline_toml::PipelineConfig;

/// Parsed `module.function[:variant]` identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepId {
    pub module: String,
    pub function: String,
    pub variant: Option<String>,
}

impl StepId {
    pub fn parse(id: &str) -> Result<Self, RunError> {
        let malformed = || {
            RunError::Configuration(format!(
                "malformed step {id:?}: expected module.function[:variant]"
            ))
        };
        let (module, rest) = id.split_once('.').ok_or_else(malformed)?;
        let (function, variant) = match rest.split_once(':') {
            Some((f, v)) => (f, Some(v.to_string())),
            None => (rest, None),
        };
        if module.is_empty() || function.is_empty() || function.contains('.') {
            return Err(malformed());
        }
        Ok(Self {
            module: module.to_string(),
            function: function.to_string(),
            variant,
        })
    }

    /// Registry key: the identifier without its variant.
    pub fn key(&self) -> String {
        format!("{}.{}", self.module, self.function)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)?;
        if let Some(v) = &self.variant {
            write!(f, ":{v}")?;
        }
        Ok(())
    }
}

/// A step ready to run: full identifier, its parameters and the capability.
#[derive(Clone)]
pub struct ResolvedStep {
    pub id: String,
    pub params: BTreeMap<String, String>,
    pub step: Arc<dyn PipelineStep>,
}

impl fmt::Debug for ResolvedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedStep")
            .field("id", &self.id)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ResolvedLoader {
    pub id: String,
    pub params: BTreeMap<String, String>,
    pub loader: Arc<dyn ItemLoader>,
}

/// Loader plus the ordered step list. Immutable once built; each worker holds its own clone.
#[derive(Clone)]
pub struct Pipeline {
    pub loader: ResolvedLoader,
    pub steps: Vec<ResolvedStep>,
}

impl Pipeline {
    /// Step identifiers in order, as written in the config.
    pub fn step_ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("loader", &self.loader.id)
            .field("steps", &self.steps)
            .finish()
    }
}

/// Resolve every configured step against `registry`. Logs the resolved list; call it once, on
/// the coordinating thread.
pub fn load_pipeline(
    config: &PipelineConfig,
    registry: &StepRegistry,
) -> Result<Pipeline, RunError> {
    let loader_id = ConfigSections::LOADER;
    let loader = registry.loader(loader_id).ok_or_else(|| {
        RunError::Configuration(format!("no item loader registered as {loader_id:?}"))
    })?;
    let loader = ResolvedLoader {
        id: loader_id.to_string(),
        params: config.section(loader_id),
        loader,
    };

    if config.steps().is_empty() {
        return Err(RunError::Configuration(format!(
            "[{}] {} is empty",
            ConfigSections::PIPELINE,
            ConfigSections::STEPS_KEY
        )));
    }

    info!("Pipeline will use these steps:");
    let mut steps = Vec::with_capacity(config.steps().len());
    for id in config.steps() {
        let parsed = StepId::parse(id)?;
        info!("\t\t{}\t{}", parsed.module, parsed.function);
        let step = registry.step(&parsed.key()).ok_or_else(|| {
            RunError::Configuration(format!(
                "unknown step {:?} (registered: {})",
                id,
                registry.step_keys().join(", ")
            ))
        })?;
        steps.push(ResolvedStep {
            id: id.clone(),
            params: config.section(id),
            step,
        });
    }
    Ok(Pipeline { loader, steps })
}
