//! Export the reshaped series and the fitted output table to CSV.
//!
//! Raw case tables (synthetic input) are written back in their own layout.
//! The other tables are keyed by an ISO `Date` column, one row per axis entry:
//! - intermediate: `Date;<region>...`
//! - output: `Date;<region>;<region>_fitted...`

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{OutputTable, RawCaseTable};
use crate::error::AppError;
use crate::series::ReshapedSeries;

/// Header of the date column in the series and output tables.
pub const DATE_HEADER: &str = "Date";

/// Suffix of a region's fitted column in the output table.
pub const FITTED_SUFFIX: &str = "_fitted";

fn csv_writer<W: Write>(out: W, delimiter: u8) -> csv::Writer<W> {
    csv::WriterBuilder::new().delimiter(delimiter).from_writer(out)
}

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path).map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

fn write_err(what: &str) -> impl Fn(csv::Error) -> AppError + '_ {
    move |e| AppError::new(2, format!("Failed to write {what}: {e}"))
}

/// Write the per-region series (rows = dates, one column per region).
pub fn write_series_csv<W: Write>(out: W, reshaped: &ReshapedSeries, delimiter: u8) -> Result<(), AppError> {
    let mut w = csv_writer(out, delimiter);
    let map = write_err("series CSV");

    let mut header = vec![DATE_HEADER.to_string()];
    header.extend(reshaped.series.iter().map(|s| s.region.clone()));
    w.write_record(&header).map_err(&map)?;

    for (i, date) in reshaped.dates.iter().enumerate() {
        let mut row = Vec::with_capacity(header.len());
        row.push(date.to_string());
        row.extend(reshaped.series.iter().map(|s| s.counts[i].to_string()));
        w.write_record(&row).map_err(&map)?;
    }

    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush series CSV: {e}")))
}

pub fn write_series_file(path: &Path, reshaped: &ReshapedSeries, delimiter: u8) -> Result<(), AppError> {
    write_series_csv(create(path, "series CSV")?, reshaped, delimiter)
}

/// Write the observed and fitted columns of every region.
pub fn write_output_csv<W: Write>(out: W, table: &OutputTable, delimiter: u8) -> Result<(), AppError> {
    let mut w = csv_writer(out, delimiter);
    let map = write_err("output CSV");

    let mut header = vec![DATE_HEADER.to_string()];
    for r in &table.regions {
        header.push(r.region.clone());
        header.push(format!("{}{FITTED_SUFFIX}", r.region));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = header.iter().map(String::as_str).find(|h| !seen.insert(*h)) {
        return Err(AppError::new(4, format!("Duplicate output column '{dup}'.")));
    }
    w.write_record(&header).map_err(&map)?;

    for (i, date) in table.dates.iter().enumerate() {
        let mut row = Vec::with_capacity(header.len());
        row.push(date.to_string());
        for r in &table.regions {
            row.push(r.observed[i].to_string());
            row.push(r.fitted[i].to_string());
        }
        w.write_record(&row).map_err(&map)?;
    }

    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush output CSV: {e}")))
}

pub fn write_output_file(path: &Path, table: &OutputTable, delimiter: u8) -> Result<(), AppError> {
    write_output_csv(create(path, "output CSV")?, table, delimiter)
}

/// Write a raw case table in the input layout.
pub fn write_raw_file(path: &Path, table: &RawCaseTable, delimiter: u8) -> Result<(), AppError> {
    let mut w = csv_writer(create(path, "raw CSV")?, delimiter);
    let map = write_err("raw CSV");
    w.write_record(&table.headers).map_err(&map)?;
    for row in &table.rows {
        w.write_record(&row.cells).map_err(&map)?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush raw CSV: {e}")))
}
