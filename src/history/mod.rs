//! Append-only generation history for external consumers.
//!
//! Each completed generation appends one CSV row describing its best
//! candidate. The file is never truncated, so a dashboard may read it while a
//! search is running and successive runs accumulate in the same file.
//!
//! # File Format
//!
//! ```text
//! generation,fitness,avg_waiting_time,throughput,green_north,green_east
//! 1,183.42,12.5,190,37,52
//! 2,191.07,11.8,196,41,49
//! ```
//!
//! The header is written only when the file is absent or empty. Floating
//! point fields use the shortest representation that parses back exactly.

mod reader;
mod recorder;

pub use reader::{parse_row, read_history};
pub use recorder::{HistoryRecorder, format_row};

use std::io;

/// Column header of the history file.
pub const HISTORY_HEADER: &str =
    "generation,fitness,avg_waiting_time,throughput,green_north,green_east";

/// History file errors.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Unexpected history header: {0:?}")]
    Header(String),
    #[error("Malformed history row {line}: {message}")]
    Row { line: usize, message: String },
}
