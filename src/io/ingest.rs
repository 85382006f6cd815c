//! CSV ingest of the raw case table.
//!
//! This module only splits the file into header and cells; interpreting them
//! (region column, dates, counts) is the reshaper's job. Rows the CSV parser
//! rejects are reported with their line number and skipped.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::domain::{RawCaseTable, RawRow, RowError};
use crate::error::AppError;

/// Raw table plus rows the CSV parser could not read.
#[derive(Debug, Clone)]
pub struct IngestedTable {
    pub table: RawCaseTable,
    pub parse_errors: Vec<RowError>,
}

/// Read a raw case table from `path`.
pub fn read_raw_table(path: &Path, delimiter: u8) -> Result<IngestedTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_raw_table_from(file, delimiter)
}

/// Read a raw case table from any reader.
pub fn read_raw_table_from<R: Read>(reader: R, delimiter: u8) -> Result<IngestedTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(AppError::new(2, "CSV has no header row."));
    }

    let mut rows = Vec::new();
    let mut parse_errors = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        match result {
            Ok(record) => rows.push(RawRow {
                line: record.position().map(|p| p.line() as usize).unwrap_or(line),
                cells: record.iter().map(str::to_string).collect(),
            }),
            Err(e) => parse_errors.push(RowError {
                line,
                region: None,
                message: format!("CSV parse error: {e}"),
            }),
        }
    }

    tracing::info!(columns = headers.len(), rows = rows.len(), "read raw table");

    Ok(IngestedTable {
        table: RawCaseTable { headers, rows },
        parse_errors,
    })
}
