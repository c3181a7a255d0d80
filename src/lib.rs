//! batchqc: run a configurable, ordered pipeline of analysis steps over many independent files
//! in parallel, writing one incremental tab-separated report per run.

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

use std::path::PathBuf;

use engine::StepRegistry;
use utils::PipelineConfig;

/// Result alias used by public batchqc API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Library entry point: resolve `config` against `registry`, then run `items` with `run`.
///
/// `items` are taken as given (see [`pipeline::enumerate_items`] to expand CLI-style input).
/// Per-item failures are returned in the summary; only fatal errors are `Err`.
///
/// ```ignore
/// let mut registry = batchqc::engine::StepRegistry::with_builtins();
/// registry.register_step("MyModule.measure", my_measure);
/// let config = batchqc::utils::PipelineConfig::load(Path::new("config.toml"))?;
/// let meta = batchqc::RunMetadata::new(config.steps().to_vec(), out, None, String::new());
/// let summary = batchqc::process_items(&items, &config, &registry, &RunConfig::new(out, meta))?;
/// ```
pub fn process_items(
    items: &[PathBuf],
    config: &PipelineConfig,
    registry: &StepRegistry,
    run: &RunConfig,
) -> Result<RunSummary> {
    let pipeline = pipeline::load_pipeline(config, registry)?;
    log::debug!(
        "{} RUN: {} items, {:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        items.len(),
        pipeline
    );
    pipeline::run_pipeline(items, &pipeline, run)
}
