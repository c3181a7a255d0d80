//! Engine module: CLI surface, capability registry, built-in steps and helpers

pub mod arg_parser;
pub mod cli;
pub mod hashing;
pub mod progress;
pub mod registry;
pub mod steps;
pub mod tools;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use cli::{handle_run, handle_run_with};
pub use hashing::{digest_hex, hash_file};
pub use registry::{ItemLoader, PipelineStep, StepParams, StepRegistry};
pub use tools::{absolutize, glob_match, item_outdir, join_basepath, make_dir_safe};
