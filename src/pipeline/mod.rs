//! Pipeline components: definition loading, item enumeration, workers, report, finalization.

pub mod definition;
pub mod enumerate;
pub mod error_handler;
pub mod finalize;
pub mod orchestrator;
pub mod report;
pub mod shared;
pub mod worker;

pub use definition::{Pipeline, ResolvedLoader, ResolvedStep, StepId, load_pipeline};
pub use enumerate::{InputSpec, enumerate_items, expand_glob, parse_manifest};
pub use error_handler::FailureCollector;
pub use orchestrator::{PoolHandles, run_pipeline, shutdown_pool, start_pool};
pub use report::{ReportWriter, batch_index, previous_report_exists, report_filename};
pub use shared::SharedState;
pub use worker::{Task, WorkerContext, claim_outdirs, process_item, run_task};
