use anyhow::{Context, Result};
use crossbeam_channel::{RecvTimeoutError, Receiver, bounded, unbounded};
use log::{debug, info};
use std::path::PathBuf;
use std::thread::JoinHandle;

use crate::engine::progress::{ProgressBar, create_progress_bar, finish_bar, tick};
use crate::engine::tools::make_dir_safe;
use crate::error::RunError;
use crate::pipeline::{
    FailureCollector, Pipeline, ReportWriter, SharedState, WorkerContext, finalize, worker,
};
use crate::utils::config::RunDefaults;
use crate::{FailureRecord, RunConfig, RunSummary, TaskOutcome};

/// Handles for a started pool: drain `outcome_rx`, then join.
pub struct PoolHandles {
    pub outcome_rx: Receiver<TaskOutcome>,
    pub submit_handle: JoinHandle<usize>,
    pub worker_handles: Vec<JoinHandle<()>>,
}

/// Start the worker pool and submit every item in order. The caller receives outcomes from
/// `outcome_rx` and must join the handles when done.
pub fn start_pool(
    items: Vec<PathBuf>,
    pipeline: &Pipeline,
    config: &RunConfig,
    shared: SharedState,
) -> PoolHandles {
    let num_workers = config.workers.max(1);
    let (task_tx, task_rx) = bounded(num_workers * RunDefaults::QUEUE_DEPTH_PER_WORKER);
    let (outcome_tx, outcome_rx) = unbounded();
    let ctx = WorkerContext {
        pipeline: pipeline.clone(),
        shared,
        outdir: config.outdir.clone(),
        policy: config.policy,
    };
    debug!("Starting {} worker(s)", num_workers);

    let worker_handles = worker::spawn_workers(task_rx, &outcome_tx, &ctx, num_workers);
    // Dropping the last sender closes the channel once all workers exit.
    drop(outcome_tx);
    let submit_handle = worker::spawn_submit_thread(task_tx, items);

    PoolHandles {
        outcome_rx,
        submit_handle,
        worker_handles,
    }
}

/// Join the submitter and workers after the outcome stream is drained.
pub fn shutdown_pool(
    submit_handle: JoinHandle<usize>,
    worker_handles: Vec<JoinHandle<()>>,
) -> Result<usize> {
    let submitted = submit_handle
        .join()
        .map_err(|_| anyhow::anyhow!("submit thread panicked"))?;
    for h in worker_handles {
        h.join().map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    }
    Ok(submitted)
}

/// Everything the coordinating thread mutates during a run. Never touched by workers.
struct RunState {
    report: ReportWriter,
    failures: FailureCollector,
    skipped: usize,
    resolved: usize,
    bar: Option<ProgressBar>,
}

impl RunState {
    fn handle(&mut self, outcome: TaskOutcome) -> Result<(), RunError> {
        match outcome {
            TaskOutcome::Completed(state) => match self.report.field_mismatch(&state) {
                Some(reason) => {
                    self.failures.record(FailureRecord {
                        path: state.path.clone(),
                        step: "report".to_string(),
                        description: reason,
                    });
                }
                None => self.report.write_item(&state)?,
            },
            TaskOutcome::Skipped(path) => {
                debug!("skipped {}", path.display());
                self.skipped += 1;
            }
            TaskOutcome::Failed(record) => {
                self.failures.record(record);
            }
        }
        self.resolved += 1;
        tick(self.bar.as_ref());
        Ok(())
    }
}

/// Run every item through `pipeline` and write the report.
///
/// Items are processed by `config.workers` threads; results are written as they complete.
/// Failed items are collected and summarized, never fatal. Waiting longer than
/// `config.task_timeout` for the next item to resolve aborts the run with [`RunError::Timeout`].
pub fn run_pipeline(
    items: &[PathBuf],
    pipeline: &Pipeline,
    config: &RunConfig,
) -> Result<RunSummary> {
    let total = items.len();
    if total == 0 {
        return Err(RunError::Usage("no items to process".to_string()).into());
    }
    make_dir_safe(&config.outdir)
        .with_context(|| format!("create output directory {}", config.outdir.display()))?;
    info!("----------");
    info!("Overwrite policy: {}", config.policy);

    let report = ReportWriter::open(
        &config.outdir,
        config.batch_size,
        config.policy,
        &config.metadata,
    )?;
    let mut run = RunState {
        report,
        failures: FailureCollector::new(),
        skipped: 0,
        resolved: 0,
        bar: config.verbose.then(|| create_progress_bar(total, "Processing")),
    };

    let (claimed, refused) = worker::claim_outdirs(items, &config.outdir);
    for record in refused {
        run.handle(TaskOutcome::Failed(record))?;
    }

    let PoolHandles {
        outcome_rx,
        submit_handle,
        worker_handles,
    } = start_pool(claimed, pipeline, config, SharedState::new());

    while run.resolved < total {
        match outcome_rx.recv_timeout(config.task_timeout) {
            Ok(outcome) => run.handle(outcome)?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(RunError::Timeout(config.task_timeout, run.resolved, total).into());
            }
            Err(RecvTimeoutError::Disconnected) => {
                anyhow::bail!(
                    "workers exited after {} of {} items resolved",
                    run.resolved,
                    total
                );
            }
        }
    }
    finish_bar(run.bar.as_ref());

    let submitted = shutdown_pool(submit_handle, worker_handles)?;
    debug!("{} tasks submitted, {} resolved", submitted, run.resolved);
    finalize_run(run, config)
}

/// Close the report, summarize failures, publish the link, copy the fault log (last).
fn finalize_run(mut run: RunState, config: &RunConfig) -> Result<RunSummary> {
    run.report.close()?;
    info!("------------Done---------");
    run.failures.log_summary();

    if let Some(link_dir) = &config.link_dir {
        finalize::publish_link(&config.outdir, link_dir);
    }

    let summary = RunSummary {
        reported: run.report.completed(),
        skipped: run.skipped,
        report_files: run.report.files().to_vec(),
        failures: run.failures.into_records(),
    };
    info!(
        "{} reported, {} skipped, {} failed",
        summary.reported,
        summary.skipped,
        summary.failures.len()
    );

    if let Some(fault_log) = &config.fault_log {
        finalize::persist_fault_log(fault_log, &config.outdir)?;
    }
    Ok(summary)
}
