//! CLI command handler: resolve the pipeline, enumerate items, run.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::PathBuf;

use crate::engine::arg_parser::Cli;
use crate::engine::registry::StepRegistry;
use crate::engine::tools::make_dir_safe;
use crate::pipeline::{
    InputSpec, enumerate_items, load_pipeline, previous_report_exists, run_pipeline,
};
use crate::utils::config::RunDefaults;
use crate::utils::{PipelineConfig, setup_logging};
use crate::{OverwritePolicy, RunConfig, RunMetadata, RunSummary};

fn command_line() -> String {
    std::env::args().collect::<Vec<_>>().join(" ")
}

/// Run with the built-in step registry.
pub fn handle_run(cli: &Cli) -> Result<RunSummary> {
    handle_run_with(cli, &StepRegistry::with_builtins())
}

/// Run with a caller-supplied registry (programs embedding their own steps).
pub fn handle_run_with(cli: &Cli, registry: &StepRegistry) -> Result<RunSummary> {
    let fault_log = PathBuf::from(RunDefaults::FAULT_LOG_FILENAME);
    setup_logging(cli.verbose, Some(&fault_log));
    debug!("{} CLI: {:#?}", env!("CARGO_PKG_NAME").to_uppercase(), cli);

    let spec = InputSpec::from_args(&cli.input)?;

    let config_path = cli.config_path();
    if cli.config.is_none() {
        warn!(
            "Configuration file not set (--config), using default: {}",
            config_path.display()
        );
    }
    let pipeline_config = PipelineConfig::load(&config_path)?;
    let pipeline = load_pipeline(&pipeline_config, registry)?;

    let outdir = cli.outdir();
    make_dir_safe(&outdir)
        .with_context(|| format!("create output directory {}", outdir.display()))?;
    let previous = previous_report_exists(&outdir);
    let policy = OverwritePolicy::resolve(cli.force, previous);
    match policy {
        OverwritePolicy::Force if previous => {
            info!("Previous run detected....overwriting (--force set)")
        }
        OverwritePolicy::Append => {
            info!("Previous run detected....skipping completed (--force not set)")
        }
        _ => {}
    }

    let items = enumerate_items(&spec, &cli.basepath)?;
    info!("Number of files detected by pattern:\t{}", items.len());

    let metadata = RunMetadata::new(
        pipeline.step_ids(),
        &outdir,
        Some(&config_path),
        command_line(),
    );
    let config = RunConfig {
        batch_size: cli.batch,
        policy,
        workers: cli.workers(),
        task_timeout: cli.task_timeout(),
        link_dir: cli.link_dir(),
        fault_log: Some(fault_log),
        verbose: cli.verbose,
        ..RunConfig::new(outdir, metadata)
    };
    run_pipeline(&items, &pipeline, &config)
}
