//! Public and internal types for the batchqc API and pipeline.

use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ItemFault;
use crate::utils::config::RunDefaults;

/// Per-item record threaded by `&mut` through every step of the pipeline.
///
/// Created by the item loader, mutated in place by each step, then handed to the report
/// writer with the resource handle stripped. Never shared between tasks.
pub struct ItemState {
    /// Canonical source path of the item.
    pub path: PathBuf,
    /// Output directory owned by this item for the run.
    pub outdir: PathBuf,
    /// Identifiers of the steps that ran to completion, in order.
    pub completed: Vec<String>,
    /// Warnings collected by steps; end up pipe-joined in the report's last column.
    pub warnings: Vec<String>,
    outputs: Vec<(String, String)>,
    handle: Option<Box<dyn Any + Send>>,
}

impl ItemState {
    pub fn new(path: impl Into<PathBuf>, outdir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            outdir: outdir.into(),
            completed: Vec::new(),
            warnings: Vec::new(),
            outputs: Vec::new(),
            handle: None,
        }
    }

    /// Set a named output field. A new name is appended to the report columns; an existing
    /// name keeps its position and gets the new value.
    pub fn set_output(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self.outputs.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.outputs.push((name, value)),
        }
    }

    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Output field names in report order.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(n, _)| n.as_str())
    }

    /// Output values in report order.
    pub fn output_values(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(_, v)| v.as_str())
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Attach the opaque resource handle (open file, decoder, ...) steps may share.
    pub fn set_handle<T: Any + Send>(&mut self, handle: T) {
        self.handle = Some(Box::new(handle));
    }

    pub fn handle<T: Any + Send>(&self) -> Option<&T> {
        self.handle.as_ref().and_then(|h| h.downcast_ref::<T>())
    }

    pub fn handle_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.handle.as_mut().and_then(|h| h.downcast_mut::<T>())
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Drop the resource handle; done once the last step has run.
    pub fn strip_handle(&mut self) {
        self.handle = None;
    }

    /// Basename of the source path, used for the output directory and log lines.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl fmt::Debug for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemState")
            .field("path", &self.path)
            .field("outdir", &self.outdir)
            .field("completed", &self.completed)
            .field("outputs", &self.outputs)
            .field("warnings", &self.warnings)
            .field("has_handle", &self.handle.is_some())
            .finish()
    }
}

/// What to do with output left behind by an earlier run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Items whose output directory exists are skipped; report files are written fresh.
    #[default]
    Skip,
    /// Existing item directories are removed and recomputed; report files are rewritten.
    Force,
    /// A previous report exists: finished items are skipped and rows are appended without a header.
    Append,
}

impl OverwritePolicy {
    /// Pick the policy from the `--force` flag and whether a previous report is present.
    pub fn resolve(force: bool, previous_report: bool) -> Self {
        match (force, previous_report) {
            (true, _) => OverwritePolicy::Force,
            (false, true) => OverwritePolicy::Append,
            (false, false) => OverwritePolicy::Skip,
        }
    }

    /// True when report files are opened for appending and get no header.
    pub fn appends_report(&self) -> bool {
        matches!(self, OverwritePolicy::Append)
    }

    pub fn recomputes_existing(&self) -> bool {
        matches!(self, OverwritePolicy::Force)
    }
}

impl fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverwritePolicy::Skip => "skip",
            OverwritePolicy::Force => "force",
            OverwritePolicy::Append => "append",
        };
        f.write_str(s)
    }
}

/// Run description written at the top of each fresh report file.
#[derive(Clone, Debug)]
pub struct RunMetadata {
    pub steps: Vec<String>,
    pub start_time: chrono::DateTime<chrono::Local>,
    pub outdir: PathBuf,
    pub config_file: Option<PathBuf>,
    pub command_line: String,
}

impl RunMetadata {
    /// Metadata for a run starting now. Paths are resolved to real paths when they exist.
    pub fn new(
        steps: Vec<String>,
        outdir: &Path,
        config_file: Option<&Path>,
        command_line: String,
    ) -> Self {
        let real = |p: &Path| p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
        Self {
            steps,
            start_time: chrono::Local::now(),
            outdir: real(outdir),
            config_file: config_file.map(real),
            command_line,
        }
    }

    /// Header lines without the comment prefix, in report order.
    pub fn header_lines(&self) -> Vec<String> {
        vec![
            format!("pipeline: {}", self.steps.join(" ")),
            format!("start_time:\t{}", self.start_time.format("%Y-%m-%d %H:%M:%S%.6f")),
            format!("outdir:\t{}", self.outdir.display()),
            format!(
                "config_file:\t{}",
                self.config_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ),
            format!("command_line_args:\t{}", self.command_line),
        ]
    }
}

/// Options that stay fixed for a whole run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Run output directory; holds one subdirectory per item plus the report files.
    pub outdir: PathBuf,
    /// Items per report file. `None` writes a single `results.tsv`.
    pub batch_size: Option<NonZeroUsize>,
    pub policy: OverwritePolicy,
    /// Worker thread count.
    pub workers: usize,
    /// Bound on waiting for the next task to resolve. Exceeding it aborts the run.
    pub task_timeout: Duration,
    /// Directory receiving the discovery symlink. `None` disables the link.
    pub link_dir: Option<PathBuf>,
    /// Warning-and-above log to copy into `outdir` at the end of the run.
    pub fault_log: Option<PathBuf>,
    pub metadata: RunMetadata,
    /// Show a progress bar.
    pub verbose: bool,
}

impl RunConfig {
    /// Defaults for everything except the output directory and metadata.
    pub fn new(outdir: impl Into<PathBuf>, metadata: RunMetadata) -> Self {
        Self {
            outdir: outdir.into(),
            batch_size: None,
            policy: OverwritePolicy::default(),
            workers: RunDefaults::WORKERS,
            task_timeout: RunDefaults::TASK_TIMEOUT,
            link_dir: None,
            fault_log: None,
            metadata,
            verbose: false,
        }
    }
}

/// An item that was abandoned. Recorded once, never retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureRecord {
    pub path: PathBuf,
    /// Identifier of the step (or loader) that faulted.
    pub step: String,
    pub description: String,
}

impl From<ItemFault> for FailureRecord {
    fn from(fault: ItemFault) -> Self {
        FailureRecord {
            path: fault.path,
            step: fault.step,
            description: fault.message,
        }
    }
}

/// How one task resolved.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed(ItemState),
    /// Output directory already present and the policy does not recompute.
    Skipped(PathBuf),
    Failed(FailureRecord),
}

/// What a finished run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Items written to the report.
    pub reported: usize,
    pub skipped: usize,
    pub failures: Vec<FailureRecord>,
    /// Report files opened during the run, in batch order.
    pub report_files: Vec<PathBuf>,
}
