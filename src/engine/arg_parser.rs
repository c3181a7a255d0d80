use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::config::{PackagePaths, RunDefaults};

struct DefaultArgs;

impl DefaultArgs {
    pub const NTHREADS: usize = RunDefaults::WORKERS;
    pub const LINK_DIR: &'static str = RunDefaults::LINK_DIR;
}

/// Run a configurable analysis pipeline over many input files in parallel.
#[derive(Clone, Debug, Parser)]
#[command(name = "batchqc")]
#[command(
    about = "Run a configurable analysis pipeline over many files and write a tab-separated report."
)]
pub struct Cli {
    /// Input: a glob pattern (try: '*.svs' or 'target_path/*.svs'), a list of files, or a .tsv
    /// file whose first column lists the files to analyze.
    #[arg(value_name = "INPUT")]
    pub input: Vec<String>,

    /// Output directory. Default: ./logs/batchqc_output_<timestamp>.
    #[arg(long, short = 'o')]
    pub outdir: Option<PathBuf>,

    /// Base path prepended to file names (helps when using an existing report as input).
    #[arg(long, short = 'p', default_value = "")]
    pub basepath: String,

    /// Pipeline config file. Default: ./config.toml.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Force overwriting of existing outputs.
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Split the report into files of this many items each.
    #[arg(long, short = 'b')]
    pub batch: Option<NonZeroUsize>,

    /// Number of worker threads. 0 = one per available core.
    #[arg(long, short = 'n', default_value_t = DefaultArgs::NTHREADS)]
    pub nthreads: usize,

    /// Turn OFF creation of the discovery symlink.
    #[arg(long, short = 's')]
    pub symlinkoff: bool,

    /// Directory receiving the discovery symlink to the output directory.
    #[arg(long, default_value = DefaultArgs::LINK_DIR)]
    pub link_dir: PathBuf,

    /// Seconds to wait for the next item to finish before aborting the run.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Verbose output (debug logs and a progress bar).
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    pub fn outdir(&self) -> PathBuf {
        self.outdir
            .clone()
            .unwrap_or_else(|| PathBuf::from(PackagePaths::get().default_outdir()))
    }

    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(PackagePaths::get().config_filename()))
    }

    /// Worker count with 0 expanded to the available parallelism.
    pub fn workers(&self) -> usize {
        match self.nthreads {
            0 => rayon::current_num_threads(),
            n => n,
        }
    }

    pub fn task_timeout(&self) -> Duration {
        self.timeout
            .map(Duration::from_secs)
            .unwrap_or(RunDefaults::TASK_TIMEOUT)
    }

    /// `None` when the symlink is turned off.
    pub fn link_dir(&self) -> Option<PathBuf> {
        (!self.symlinkoff).then(|| self.link_dir.clone())
    }
}
