//! Worker side of the pool: run the loader and every step for one item, isolating faults.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use super::definition::Pipeline;
use super::shared::SharedState;
use crate::engine::registry::StepParams;
use crate::engine::tools::{item_outdir, make_dir_safe};
use crate::error::ItemFault;
use crate::{FailureRecord, ItemState, OverwritePolicy, TaskOutcome};

/// Identifier used in faults raised while preparing the output directory.
pub const OUTDIR_STAGE: &str = "output directory";

/// One unit of work, submitted in enumeration order.
#[derive(Clone, Debug)]
pub struct Task {
    pub index: usize,
    pub total: usize,
    pub path: PathBuf,
}

/// Everything a worker needs besides the task itself. Each worker owns a clone.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    pub pipeline: Pipeline,
    pub shared: SharedState,
    pub outdir: PathBuf,
    pub policy: OverwritePolicy,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Run `f`, turning both errors and panics into a message.
fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(panic_message(payload)),
    }
}

/// Split `items` into those that own their output directory and failures for the rest. Items
/// map to `<outdir>/<basename>`, so a later item with the same basename as an earlier one would
/// share (or, under force, delete) that item's directory; it is refused before any work starts.
pub fn claim_outdirs(items: &[PathBuf], outdir: &Path) -> (Vec<PathBuf>, Vec<FailureRecord>) {
    let mut owners: HashMap<PathBuf, &PathBuf> = HashMap::new();
    let mut claimed = Vec::with_capacity(items.len());
    let mut refused = Vec::new();
    for item in items {
        let dir = item_outdir(outdir, item);
        match owners.get(&dir) {
            Some(owner) => refused.push(FailureRecord {
                path: item.clone(),
                step: OUTDIR_STAGE.to_string(),
                description: format!(
                    "output directory {} already belongs to {}",
                    dir.display(),
                    owner.display()
                ),
            }),
            None => {
                owners.insert(dir, item);
                claimed.push(item.clone());
            }
        }
    }
    (claimed, refused)
}

fn fault(path: &Path, step: &str, message: impl Into<String>) -> ItemFault {
    ItemFault {
        path: path.to_path_buf(),
        step: step.to_string(),
        message: message.into(),
    }
}

/// Create the item's output directory. `Ok(None)` means the item was already processed and the
/// policy says to leave it alone.
fn prepare_outdir(task: &Task, ctx: &WorkerContext) -> Result<Option<PathBuf>, ItemFault> {
    let outdir = item_outdir(&ctx.outdir, &task.path);
    if outdir.is_dir() {
        if ctx.policy.recomputes_existing() {
            // Remove everything so no stale files survive.
            std::fs::remove_dir_all(&outdir)
                .map_err(|e| fault(&task.path, OUTDIR_STAGE, format!("remove old output: {e}")))?;
        } else {
            warn!(
                "{} already seems to be processed (output directory exists), skipping. \
                 To avoid this behavior use --force",
                task.path.display()
            );
            return Ok(None);
        }
    }
    make_dir_safe(&outdir).map_err(|e| {
        fault(
            &task.path,
            OUTDIR_STAGE,
            format!("create {}: {e}", outdir.display()),
        )
    })?;
    Ok(Some(outdir))
}

/// Load the item and run every step in order. No partial state escapes on a fault.
pub fn process_item(task: &Task, ctx: &WorkerContext) -> Result<Option<ItemState>, ItemFault> {
    let Some(outdir) = prepare_outdir(task, ctx)? else {
        return Ok(None);
    };
    info!(
        "-----Working on:\t{}\t\t{} of {}",
        task.path.display(),
        task.index + 1,
        task.total
    );

    let loader = &ctx.pipeline.loader;
    let mut state = guarded(|| loader.loader.load(&task.path, &outdir, &loader.params))
        .map_err(|msg| fault(&task.path, &loader.id, msg))?;

    for step in &ctx.pipeline.steps {
        let params = StepParams::new(step.params.clone(), ctx.shared.clone());
        guarded(|| step.step.run(&mut state, &params))
            .map_err(|msg| fault(&task.path, &step.id, msg))?;
        state.completed.push(step.id.clone());
        debug!("{}: {} done", task.path.display(), step.id);
    }

    state.strip_handle();
    Ok(Some(state))
}

/// [`process_item`] folded into a [`TaskOutcome`].
pub fn run_task(task: &Task, ctx: &WorkerContext) -> TaskOutcome {
    match process_item(task, ctx) {
        Ok(Some(state)) => TaskOutcome::Completed(state),
        Ok(None) => TaskOutcome::Skipped(task.path.clone()),
        Err(fault) => TaskOutcome::Failed(fault.into()),
    }
}

/// Single worker: take tasks from task_rx until it closes, send each outcome on outcome_tx.
fn worker_loop(task_rx: Receiver<Task>, outcome_tx: Sender<TaskOutcome>, ctx: WorkerContext) {
    while let Ok(task) = task_rx.recv() {
        if outcome_tx.send(run_task(&task, &ctx)).is_err() {
            break;
        }
    }
    drop(outcome_tx);
}

/// Spawn `num_workers` workers. Caller must drop its own outcome sender afterwards so the
/// outcome channel closes once every worker exits.
pub fn spawn_workers(
    task_rx: Receiver<Task>,
    outcome_tx: &Sender<TaskOutcome>,
    ctx: &WorkerContext,
    num_workers: usize,
) -> Vec<JoinHandle<()>> {
    (0..num_workers)
        .map(|_| {
            let task_rx = task_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let ctx = ctx.clone();
            thread::spawn(move || worker_loop(task_rx, outcome_tx, ctx))
        })
        .collect()
}

/// Feed tasks in enumeration order from a separate thread so the coordinator can drain
/// outcomes while submission is still blocked on a full queue. Returns the number submitted.
pub fn spawn_submit_thread(task_tx: Sender<Task>, items: Vec<PathBuf>) -> JoinHandle<usize> {
    thread::spawn(move || {
        let total = items.len();
        let mut count = 0_usize;
        for (index, path) in items.into_iter().enumerate() {
            if task_tx.send(Task { index, total, path }).is_err() {
                break;
            }
            count += 1;
        }
        drop(task_tx);
        count
    })
}
