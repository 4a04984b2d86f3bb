//! History parser.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use super::{HISTORY_HEADER, HistoryError};
use crate::schema::GenerationRecord;

/// Parse one data row. `line` is used for error messages only.
pub fn parse_row(row: &str, line: usize) -> Result<GenerationRecord, HistoryError> {
    let fields: Vec<&str> = row.trim_end_matches('\r').split(',').collect();
    if fields.len() != 6 {
        return Err(HistoryError::Row {
            line,
            message: format!("expected 6 fields, found {}", fields.len()),
        });
    }

    Ok(GenerationRecord {
        generation: field(&fields, 0, "generation", line)?,
        fitness: field(&fields, 1, "fitness", line)?,
        avg_waiting_time: field(&fields, 2, "avg_waiting_time", line)?,
        throughput: field(&fields, 3, "throughput", line)?,
        green_a: field(&fields, 4, "green_north", line)?,
        green_b: field(&fields, 5, "green_east", line)?,
    })
}

fn field<T: FromStr>(
    fields: &[&str],
    index: usize,
    name: &str,
    line: usize,
) -> Result<T, HistoryError> {
    fields[index].parse().map_err(|_| HistoryError::Row {
        line,
        message: format!("invalid {} {:?}", name, fields[index]),
    })
}

/// Read every record of a history file. An empty file holds no records.
pub fn read_history<P: AsRef<Path>>(path: P) -> Result<Vec<GenerationRecord>, HistoryError> {
    let contents = fs::read_to_string(path)?;
    let mut lines = contents.lines().enumerate();

    match lines.next() {
        None => return Ok(Vec::new()),
        Some((_, header)) if header.trim_end_matches('\r') == HISTORY_HEADER => {}
        Some((_, header)) => return Err(HistoryError::Header(header.to_string())),
    }

    lines
        .filter(|(_, row)| !row.trim().is_empty())
        .map(|(index, row)| parse_row(row, index + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryRecorder, format_row};
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let records = vec![
            GenerationRecord {
                generation: 1,
                fitness: 120.0 - 0.01 * 3321.45,
                avg_waiting_time: 3321.45 / 120.0,
                throughput: 120,
                green_a: 22,
                green_b: 61,
            },
            GenerationRecord {
                generation: 2,
                fitness: 0.0,
                avg_waiting_time: 0.0,
                throughput: 0,
                green_a: 10,
                green_b: 80,
            },
        ];

        let mut recorder = HistoryRecorder::new(&path);
        for record in &records {
            recorder.record(record).unwrap();
        }

        assert_eq!(read_history(&path).unwrap(), records);
    }

    #[test]
    fn test_bad_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        fs::write(&path, "a,b,c\n1,2,3\n").unwrap();

        assert!(matches!(read_history(&path), Err(HistoryError::Header(_))));
    }

    #[test]
    fn test_bad_row() {
        let err = parse_row("1,abc,0,0,10,10", 2).unwrap_err();
        assert!(matches!(err, HistoryError::Row { line: 2, .. }));
        assert!(parse_row("1,2,3", 3).is_err());
    }

    #[test]
    fn test_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        fs::write(&path, "").unwrap();

        assert!(read_history(&path).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_row_round_trip(
            generation in 1usize..1000,
            fitness in -1e6f64..1e6,
            avg_waiting_time in 0.0f64..1e5,
            throughput in 0u64..100_000,
            green_a in 10i32..=80,
            green_b in 10i32..=80,
        ) {
            let record = GenerationRecord {
                generation,
                fitness,
                avg_waiting_time,
                throughput,
                green_a,
                green_b,
            };
            prop_assert_eq!(parse_row(&format_row(&record), 1).unwrap(), record);
        }
    }
}
