use log::{error, info};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::FailureRecord;
use crate::utils::config::RunDefaults;

/// Coordinator-side list of abandoned items. Each failure is logged at error level when it
/// arrives, so it also lands in the fault log.
#[derive(Debug, Default)]
pub struct FailureCollector {
    failures: Vec<FailureRecord>,
    seen: HashSet<PathBuf>,
}

impl FailureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. Returns false (and records nothing) if this item already failed.
    pub fn record(&mut self, record: FailureRecord) -> bool {
        if !self.seen.insert(record.path.clone()) {
            return false;
        }
        error!(
            "{} - \t{} - Error analyzing file (skipping): \t {}",
            record.path.display(),
            record.step,
            record.description
        );
        self.failures.push(record);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn into_records(self) -> Vec<FailureRecord> {
        self.failures
    }

    /// Run-end listing of every failed item.
    pub fn log_summary(&self) {
        if self.failures.is_empty() {
            return;
        }
        info!(
            "These items failed (available also in {}), \
             warnings are listed in warnings column in output:",
            RunDefaults::FAULT_LOG_FILENAME
        );
        for f in &self.failures {
            info!("{}\t{}\t{}", f.path.display(), f.step, f.description);
        }
    }
}
