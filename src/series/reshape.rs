//! Wide region/date table -> one aligned series per region.
//!
//! Input layout: a region identifier column, three metadata columns that are
//! ignored (e.g. sub-region, latitude, longitude), then one column per date.
//! The region column is located by header name; dates are every header from
//! the fifth column on, in file order.
//!
//! Rows sharing a region name are summed column-wise. Regions appear in the
//! order of their first row.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::{RawCaseTable, RawRow, RegionSeries, RowError};
use crate::error::{AppError, MalformedInputError};
use crate::io::export::{DATE_HEADER, FITTED_SUFFIX};

/// Index of the first date column.
pub const FIRST_DATE_COLUMN: usize = 4;

/// Accepted date header formats, tried in order.
const DATE_FORMATS: [&str; 3] = ["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d"];

/// Header names recognized as the region identifier (after normalization).
const REGION_HEADERS: [&str; 4] = ["country/region", "country_region", "region", "country"];

/// Output of the reshaper.
#[derive(Debug, Clone, PartialEq)]
pub struct ReshapedSeries {
    /// Shared ascending date axis.
    pub dates: Arc<[NaiveDate]>,
    pub series: Vec<RegionSeries>,
    /// Rows skipped because of unusable cells.
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl ReshapedSeries {
    pub fn axis_len(&self) -> usize {
        self.dates.len()
    }

    pub fn region_names(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.region.as_str()).collect()
    }

    /// Drop the first `days` entries of the axis (and of every series).
    pub fn skip_days(&self, days: usize) -> Result<ReshapedSeries, AppError> {
        if days == 0 {
            return Ok(self.clone());
        }
        if days >= self.dates.len() {
            return Err(AppError::new(
                2,
                format!(
                    "Cannot skip {days} day(s): the date axis only has {} column(s).",
                    self.dates.len()
                ),
            ));
        }
        let dates: Arc<[NaiveDate]> = Arc::from(&self.dates[days..]);
        let series = self
            .series
            .iter()
            .map(|s| RegionSeries {
                region: s.region.clone(),
                dates: Arc::clone(&dates),
                counts: s.counts[days..].to_vec(),
            })
            .collect();
        Ok(ReshapedSeries {
            dates,
            series,
            row_errors: self.row_errors.clone(),
            rows_read: self.rows_read,
        })
    }

    /// Keep only the named regions, in input order. An empty list keeps all.
    pub fn select_regions(&self, names: &[String]) -> Result<ReshapedSeries, AppError> {
        if names.is_empty() {
            return Ok(self.clone());
        }
        let unknown: Vec<&str> = names
            .iter()
            .filter(|n| !self.series.iter().any(|s| &s.region == *n))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(AppError::new(2, format!("Unknown region(s): {}", unknown.join(", "))));
        }
        Ok(ReshapedSeries {
            dates: Arc::clone(&self.dates),
            series: self
                .series
                .iter()
                .filter(|s| names.contains(&s.region))
                .cloned()
                .collect(),
            row_errors: self.row_errors.clone(),
            rows_read: self.rows_read,
        })
    }
}

/// Pivot a raw table into per-region series.
pub fn reshape(table: &RawCaseTable) -> Result<ReshapedSeries, MalformedInputError> {
    let width = table.headers.len();
    if width <= FIRST_DATE_COLUMN {
        return Err(MalformedInputError::new(format!(
            "expected at least {} columns (region, 3 metadata, dates...), found {width}",
            FIRST_DATE_COLUMN + 1
        )));
    }

    let region_col = find_region_column(&table.headers)?;
    let dates: Arc<[NaiveDate]> = Arc::from(parse_date_headers(&table.headers[FIRST_DATE_COLUMN..])?);
    let n_dates = dates.len();

    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, Vec<u64>> = HashMap::new();
    let mut row_errors = Vec::new();

    for row in &table.rows {
        let region = row.cells.get(region_col).map(|c| c.trim()).unwrap_or_default();
        if region.is_empty() {
            row_errors.push(RowError {
                line: row.line,
                region: None,
                message: "missing region name".to_string(),
            });
            continue;
        }

        let counts = match parse_counts(row, width) {
            Ok(c) => c,
            Err(message) => {
                row_errors.push(RowError {
                    line: row.line,
                    region: Some(region.to_string()),
                    message,
                });
                continue;
            }
        };

        let acc = totals.entry(region.to_string()).or_insert_with(|| {
            order.push(region.to_string());
            vec![0; n_dates]
        });
        for (total, c) in acc.iter_mut().zip(counts) {
            *total = total.saturating_add(c);
        }
    }

    for err in &row_errors {
        tracing::warn!(line = err.line, region = ?err.region, "skipped row: {}", err.message);
    }

    if order.is_empty() {
        return Err(MalformedInputError::new(format!(
            "no usable data rows ({} read, {} rejected)",
            table.rows.len(),
            row_errors.len()
        )));
    }

    // Output headers are `Date`, `<region>` and `<region>_fitted`; they must stay unique.
    if let Some(name) = order.iter().find(|name| {
        name.as_str() == DATE_HEADER
            || name
                .strip_suffix(FITTED_SUFFIX)
                .is_some_and(|base| totals.contains_key(base))
    }) {
        return Err(MalformedInputError::new(format!(
            "region name '{name}' collides with an output column header"
        )));
    }

    let series = order
        .into_iter()
        .map(|region| {
            let counts = totals.remove(&region).unwrap_or_default();
            RegionSeries {
                region,
                dates: Arc::clone(&dates),
                counts,
            }
        })
        .collect();

    Ok(ReshapedSeries {
        dates,
        series,
        row_errors,
        rows_read: table.rows.len(),
    })
}

fn normalize_header_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn find_region_column(headers: &[String]) -> Result<usize, MalformedInputError> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header_name(h)).collect();
    REGION_HEADERS
        .iter()
        .find_map(|want| normalized.iter().position(|h| h == want))
        .filter(|&idx| idx < FIRST_DATE_COLUMN)
        .ok_or_else(|| {
            MalformedInputError::new(format!(
                "no region identifier column among the first {FIRST_DATE_COLUMN} headers (expected one of: {})",
                REGION_HEADERS.join(", ")
            ))
        })
}

/// Parse a date header using the accepted formats.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim().trim_start_matches('\u{feff}');
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_date_headers(headers: &[String]) -> Result<Vec<NaiveDate>, MalformedInputError> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            parse_date(h).ok_or_else(|| {
                MalformedInputError::new(format!(
                    "column {} header '{h}' is not a date",
                    FIRST_DATE_COLUMN + i + 1
                ))
            })
        })
        .collect()
}

fn parse_counts(row: &RawRow, width: usize) -> Result<Vec<u64>, String> {
    if row.cells.len() != width {
        return Err(format!("expected {width} cells, found {}", row.cells.len()));
    }
    row.cells[FIRST_DATE_COLUMN..]
        .iter()
        .enumerate()
        .map(|(i, cell)| parse_count(cell).map_err(|e| format!("column {}: {e}", FIRST_DATE_COLUMN + i + 1)))
        .collect()
}

/// Parse one cumulative count. Empty cells are zero.
fn parse_count(cell: &str) -> Result<u64, String> {
    let s = cell.trim();
    if s.is_empty() {
        return Ok(0);
    }
    if let Ok(v) = s.parse::<u64>() {
        return Ok(v);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v < 0.0 => Err(format!("negative count '{s}'")),
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v <= u64::MAX as f64 => Ok(v as u64),
        _ => Err(format!("invalid count '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawCaseTable {
        RawCaseTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, cells)| RawRow {
                    line: i + 2,
                    cells: cells.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
        }
    }

    const HEADERS: [&str; 7] = ["Country/Region", "Province/State", "Lat", "Long", "1/22/20", "1/23/20", "1/24/20"];

    #[test]
    fn sums_sub_regions_in_first_appearance_order() {
        let t = table(
            &HEADERS,
            &[
                &["Spain", "", "40", "-4", "0", "1", "3"],
                &["Canada", "Ontario", "51", "-85", "1", "2", "4"],
                &["Canada", "Quebec", "52", "-72", "0", "5", "10"],
            ],
        );
        let out = reshape(&t).unwrap();

        assert_eq!(out.region_names(), vec!["Spain", "Canada"]);
        assert_eq!(out.series[0].counts, vec![0, 1, 3]);
        assert_eq!(out.series[1].counts, vec![1, 7, 14]);
        assert_eq!(out.dates[0], NaiveDate::from_ymd_opt(2020, 1, 22).unwrap());
        assert_eq!(out.axis_len(), 3);
        assert!(out.series.iter().all(|s| s.len() == out.axis_len()));
        assert_eq!(out.rows_read, 3);
        assert!(out.row_errors.is_empty());
    }

    #[test]
    fn region_column_may_follow_sub_region() {
        let t = table(
            &["Province/State", "Country/Region", "Lat", "Long", "2020-03-01", "2020-03-02"],
            &[&["", "Italy", "43", "12", "5", "9"]],
        );
        let out = reshape(&t).unwrap();
        assert_eq!(out.region_names(), vec!["Italy"]);
        assert_eq!(out.series[0].counts, vec![5, 9]);
    }

    #[test]
    fn too_few_columns_is_malformed() {
        let t = table(&["Country/Region", "Province/State", "Lat", "Long"], &[&["X", "", "0", "0"]]);
        let err = reshape(&t).unwrap_err();
        assert!(err.to_string().contains("at least 5 columns"));
    }

    #[test]
    fn missing_region_column_is_malformed() {
        let t = table(&["Name", "Province/State", "Lat", "Long", "1/22/20"], &[&["X", "", "0", "0", "1"]]);
        assert!(reshape(&t).is_err());
    }

    #[test]
    fn bom_and_case_are_ignored_in_region_header() {
        let t = table(&["\u{feff}COUNTRY", "State", "Lat", "Long", "1/22/20"], &[&["X", "", "0", "0", "1"]]);
        assert_eq!(reshape(&t).unwrap().region_names(), vec!["X"]);
    }

    #[test]
    fn bad_date_header_is_malformed() {
        let t = table(
            &["Country/Region", "Province/State", "Lat", "Long", "1/22/20", "notes"],
            &[&["X", "", "0", "0", "1", "2"]],
        );
        let err = reshape(&t).unwrap_err();
        assert!(err.to_string().contains("'notes'"));
    }

    #[test]
    fn empty_cells_count_as_zero() {
        let t = table(&HEADERS, &[&["X", "", "0", "0", "", "4", " "]]);
        assert_eq!(reshape(&t).unwrap().series[0].counts, vec![0, 4, 0]);
    }

    #[test]
    fn bad_rows_are_skipped_and_reported() {
        let t = table(
            &HEADERS,
            &[
                &["X", "", "0", "0", "1", "2", "3"],
                &["X", "a", "0", "0", "1", "-2", "3"],
                &["Y", "", "0", "0", "1", "two", "3"],
                &["Z", "", "0", "0", "1"],
                &["", "", "0", "0", "1", "2", "3"],
            ],
        );
        let out = reshape(&t).unwrap();

        assert_eq!(out.region_names(), vec!["X"]);
        assert_eq!(out.series[0].counts, vec![1, 2, 3]);
        let lines: Vec<usize> = out.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 4, 5, 6]);
        assert!(out.row_errors[0].message.contains("negative"));
        assert_eq!(out.row_errors[3].region, None);
    }

    #[test]
    fn no_usable_rows_is_malformed() {
        let t = table(&HEADERS, &[&["X", "", "0", "0", "x", "y", "z"]]);
        assert!(reshape(&t).is_err());
    }

    #[test]
    fn reshaping_is_idempotent() {
        let t = table(
            &HEADERS,
            &[
                &["A", "", "0", "0", "0", "1", "3"],
                &["B", "", "0", "0", "2", "2", "9"],
                &["A", "x", "0", "0", "1", "1", "1"],
            ],
        );
        assert_eq!(reshape(&t).unwrap(), reshape(&t).unwrap());
    }

    #[test]
    fn names_colliding_with_output_headers_are_malformed() {
        let t = table(
            &HEADERS,
            &[
                &["Italy", "", "0", "0", "1", "2", "3"],
                &["Italy_fitted", "", "0", "0", "4", "5", "6"],
            ],
        );
        let err = reshape(&t).unwrap_err();
        assert!(err.to_string().contains("'Italy_fitted'"), "{err}");

        let t = table(&HEADERS, &[&["Date", "", "0", "0", "1", "2", "3"]]);
        assert!(reshape(&t).is_err());

        let t = table(&HEADERS, &[&["Chad_fitted", "", "0", "0", "1", "2", "3"]]);
        assert_eq!(reshape(&t).unwrap().region_names(), vec!["Chad_fitted"]);
    }

    #[test]
    fn whole_number_decimals_are_accepted() {
        assert_eq!(parse_count("12.0"), Ok(12));
        assert!(parse_count("1.5").is_err());
        assert!(parse_count("NaN").is_err());
    }

    #[test]
    fn skip_days_shifts_axis_and_counts() {
        let t = table(&HEADERS, &[&["X", "", "0", "0", "1", "2", "3"]]);
        let out = reshape(&t).unwrap().skip_days(2).unwrap();
        assert_eq!(out.axis_len(), 1);
        assert_eq!(out.series[0].counts, vec![3]);
        assert_eq!(out.series[0].dates[0], NaiveDate::from_ymd_opt(2020, 1, 24).unwrap());

        let full = reshape(&t).unwrap();
        assert_eq!(full.skip_days(3).unwrap_err().exit_code(), 2);
        assert_eq!(full.skip_days(0).unwrap(), full);
    }

    #[test]
    fn region_filter_keeps_input_order() {
        let t = table(
            &HEADERS,
            &[
                &["A", "", "0", "0", "1", "2", "3"],
                &["B", "", "0", "0", "1", "2", "3"],
                &["C", "", "0", "0", "1", "2", "3"],
            ],
        );
        let out = reshape(&t).unwrap();
        let picked = out.select_regions(&["C".to_string(), "A".to_string()]).unwrap();
        assert_eq!(picked.region_names(), vec!["A", "C"]);

        let err = out.select_regions(&["Nowhere".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Nowhere"));
    }
}
