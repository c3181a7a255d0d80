//! Application configuration constants.
//! Defaults and file names in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    output_dir_prefix: String,
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                output_dir_prefix: format!("{pkg}_output_"),
                config_filename: "config.toml".to_string(),
            }
        })
    }

    /// Prefix of the timestamped default output directory (`./logs/<prefix><stamp>`).
    pub fn output_dir_prefix(&self) -> &str {
        &self.output_dir_prefix
    }

    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Default output directory for a run started now.
    pub fn default_outdir(&self) -> String {
        format!(
            "./logs/{}{}",
            self.output_dir_prefix,
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        )
    }
}

// ---- Report ----

/// Report file names and markers.
pub struct ReportConsts;

impl ReportConsts {
    /// Base name of the report file (`results.tsv` or `results_<k>.tsv`).
    pub const BASE_NAME: &'static str = "results";
    pub const EXTENSION: &'static str = "tsv";
    /// Prefix of metadata lines in the report header.
    pub const COMMENT_PREFIX: &'static str = "#";
    /// Prefix of the column header line (after the comment prefix).
    pub const DATASET_PREFIX: &'static str = "dataset:";
    /// Name of the trailing column holding pipe-joined warnings.
    pub const WARNINGS_COLUMN: &'static str = "warnings";
    pub const WARNINGS_SEPARATOR: &'static str = "|";
}

// ---- Run ----

/// Defaults for the worker pool and finalization.
pub struct RunDefaults;

impl RunDefaults {
    pub const WORKERS: usize = 1;
    /// Bound on waiting for the next task to resolve (30 minutes).
    pub const TASK_TIMEOUT: Duration = Duration::from_secs(60 * 30);
    /// Well-known directory that receives the discovery symlink to each run's output.
    pub const LINK_DIR: &'static str = "/app/data/ui/data";
    /// Warning-and-above log, copied into the output directory at run end.
    pub const FAULT_LOG_FILENAME: &'static str = "error.log";
    /// Task queue capacity per worker (submission blocks beyond this).
    pub const QUEUE_DEPTH_PER_WORKER: usize = 4;
}

// ---- Config sections ----

/// Well-known sections of the pipeline config file.
pub struct ConfigSections;

impl ConfigSections {
    pub const PIPELINE: &'static str = "pipeline";
    pub const STEPS_KEY: &'static str = "steps";
    /// Section supplying the item loader's parameters.
    pub const LOADER: &'static str = "BaseImage.BaseImage";
}

// ---- Hashing ----

/// Hashing I/O thresholds and buffer sizes.
pub struct HashingConsts;

impl HashingConsts {
    /// File size above which hashing uses memory-mapped I/O (bytes). 100 MB.
    pub const HASH_MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
    /// Chunk size for reading files below mmap threshold (bytes). 1 MB.
    pub const HASH_READ_CHUNK_SIZE: usize = 1024 * 1024;
}
