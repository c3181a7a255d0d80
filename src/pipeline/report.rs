//! Report writer: rotating tab-separated result files, one row per completed item.
//!
//! Runs on the coordinating thread only. Rows are flushed as soon as they are written, so an
//! abrupt stop loses at most the row in flight.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::error::RunError;
use crate::utils::config::ReportConsts;
use crate::{ItemState, OverwritePolicy, RunMetadata};

/// Report file name for 1-based batch `batch`.
pub fn report_filename(batch_size: Option<NonZeroUsize>, batch: usize) -> String {
    match batch_size {
        None => format!("{}.{}", ReportConsts::BASE_NAME, ReportConsts::EXTENSION),
        Some(_) => format!(
            "{}_{}.{}",
            ReportConsts::BASE_NAME,
            batch,
            ReportConsts::EXTENSION
        ),
    }
}

/// 1-based file index receiving the `count`-th completed item (`count` >= 1).
pub fn batch_index(count: usize, batch_size: Option<NonZeroUsize>) -> usize {
    match batch_size {
        None => 1,
        Some(b) => count.saturating_sub(1) / b.get() + 1,
    }
}

/// True if `outdir` already holds a report from an earlier run.
pub fn previous_report_exists(outdir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(outdir) else {
        return false;
    };
    let prefix = ReportConsts::BASE_NAME;
    let suffix = format!(".{}", ReportConsts::EXTENSION);
    entries.flatten().any(|e| {
        let name = e.file_name();
        let name = name.to_string_lossy();
        name.starts_with(prefix) && name.ends_with(&suffix)
    })
}

/// Replace characters that would break the row/column structure.
fn sanitize_cell(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// Format one data row: output values, then pipe-joined warnings.
pub fn format_row(state: &ItemState) -> String {
    let mut cells: Vec<String> = state.output_values().map(sanitize_cell).collect();
    let warnings: Vec<String> = state.warnings.iter().map(|w| sanitize_cell(w)).collect();
    cells.push(warnings.join(ReportConsts::WARNINGS_SEPARATOR));
    cells.join("\t")
}

/// Column header line: `#dataset:` + field names + the warnings column.
pub fn format_column_header(fields: &[String]) -> String {
    let mut line = format!(
        "{}{}{}",
        ReportConsts::COMMENT_PREFIX,
        ReportConsts::DATASET_PREFIX,
        fields.join("\t")
    );
    line.push('\t');
    line.push_str(ReportConsts::WARNINGS_COLUMN);
    line
}

/// The one writable report file.
struct ReportBatch {
    path: PathBuf,
    writer: BufWriter<File>,
    header_written: bool,
}

impl ReportBatch {
    fn open(path: PathBuf, append: bool) -> Result<Self, RunError> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options
            .open(&path)
            .map_err(|e| RunError::io(format!("open report {}", path.display()), e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            header_written: false,
        })
    }

    fn write_line(&mut self, line: &str) -> Result<(), RunError> {
        writeln!(self.writer, "{line}")
            .map_err(|e| RunError::io(format!("write report {}", self.path.display()), e))
    }

    fn flush(&mut self) -> Result<(), RunError> {
        self.writer
            .flush()
            .map_err(|e| RunError::io(format!("flush report {}", self.path.display()), e))
    }
}

/// Coordinator-owned report state: counter, current batch, and the run's column set.
pub struct ReportWriter {
    outdir: PathBuf,
    batch_size: Option<NonZeroUsize>,
    append: bool,
    metadata: Vec<String>,
    batch: usize,
    completed: usize,
    fields: Option<Vec<String>>,
    current: Option<ReportBatch>,
    files: Vec<PathBuf>,
}

impl ReportWriter {
    /// Open the first report file right away, so a run always leaves one behind.
    pub fn open(
        outdir: &Path,
        batch_size: Option<NonZeroUsize>,
        policy: OverwritePolicy,
        metadata: &RunMetadata,
    ) -> Result<Self, RunError> {
        let mut writer = Self {
            outdir: outdir.to_path_buf(),
            batch_size,
            append: policy.appends_report(),
            metadata: metadata.header_lines(),
            batch: 1,
            completed: 0,
            fields: None,
            current: None,
            files: Vec::new(),
        };
        writer.open_batch()?;
        Ok(writer)
    }

    fn open_batch(&mut self) -> Result<(), RunError> {
        let path = self
            .outdir
            .join(report_filename(self.batch_size, self.batch));
        self.current = Some(ReportBatch::open(path.clone(), self.append)?);
        self.files.push(path);
        Ok(())
    }

    /// Close the current file and open the next batch when the counter hits a multiple of
    /// the batch size.
    fn rotate_if_due(&mut self) -> Result<(), RunError> {
        let Some(b) = self.batch_size else {
            return Ok(());
        };
        if self.completed > 0 && self.completed.is_multiple_of(b.get()) {
            self.close()?;
            self.batch += 1;
            self.open_batch()?;
        }
        Ok(())
    }

    /// Why `state` cannot go into this run's report, if it cannot. The first item written fixes
    /// the column set; later items must carry the same field names in the same order.
    pub fn field_mismatch(&self, state: &ItemState) -> Option<String> {
        let fields = self.fields.as_ref()?;
        let same = state.output_names().eq(fields.iter().map(String::as_str));
        (!same).then(|| {
            format!(
                "output fields [{}] differ from the report columns [{}]",
                state.output_names().collect::<Vec<_>>().join(", "),
                fields.join(", ")
            )
        })
    }

    /// Append one completed item. Call [`Self::field_mismatch`] first; a mismatched item is
    /// rejected here as a configuration error.
    pub fn write_item(&mut self, state: &ItemState) -> Result<(), RunError> {
        if let Some(reason) = self.field_mismatch(state) {
            return Err(RunError::Configuration(reason));
        }
        let fields = self
            .fields
            .get_or_insert_with(|| state.output_names().map(str::to_string).collect())
            .clone();

        self.rotate_if_due()?;
        let append = self.append;
        let Some(batch) = self.current.as_mut() else {
            return Err(RunError::io(
                format!("write report in {}", self.outdir.display()),
                std::io::Error::other("report already closed"),
            ));
        };

        if !batch.header_written && !append {
            for line in &self.metadata {
                batch.write_line(&format!("{}{}", ReportConsts::COMMENT_PREFIX, line))?;
            }
            batch.write_line(&format_column_header(&fields))?;
        }
        batch.header_written = true;

        batch.write_line(&format_row(state))?;
        batch.flush()?;
        self.completed += 1;
        Ok(())
    }

    /// Flush and close the active file. Safe to call more than once.
    pub fn close(&mut self) -> Result<(), RunError> {
        if let Some(mut batch) = self.current.take() {
            batch.flush()?;
        }
        Ok(())
    }

    /// Items written so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Report files opened so far, in batch order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}
