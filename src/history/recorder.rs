//! History writer.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{HISTORY_HEADER, HistoryError};
use crate::schema::GenerationRecord;

/// One CSV data row, without the trailing newline.
pub fn format_row(record: &GenerationRecord) -> String {
    format!(
        "{},{},{},{},{},{}",
        record.generation,
        record.fitness,
        record.avg_waiting_time,
        record.throughput,
        record.green_a,
        record.green_b
    )
}

/// Appends generation records to a CSV file.
///
/// The file is reopened in append mode for every record and flushed before
/// returning, so each completed generation is visible to readers at once.
///
/// Usage:
/// ```ignore
/// let mut recorder = HistoryRecorder::new("ga_history.csv");
/// engine.run_with_callback(&mut evaluator, |report| {
///     recorder.record(&report.record)?;
///     Ok(())
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    path: PathBuf,
    rows_written: usize,
}

impl HistoryRecorder {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            rows_written: 0,
        }
    }

    /// Rows appended by this recorder.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Append one record, writing the header first if the file is empty.
    pub fn record(&mut self, record: &GenerationRecord) -> Result<(), HistoryError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut buffer = String::new();
        if file.metadata()?.len() == 0 {
            buffer.push_str(HISTORY_HEADER);
            buffer.push('\n');
        }
        buffer.push_str(&format_row(record));
        buffer.push('\n');

        // Single write keeps partially written rows out of concurrent reads.
        file.write_all(buffer.as_bytes())?;
        file.flush()?;

        self.rows_written += 1;
        Ok(())
    }
}
