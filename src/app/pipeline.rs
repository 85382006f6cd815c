//! Shared "fit pipeline" logic.
//!
//! raw table -> reshape -> axis offset / region filter -> per-region fits ->
//! assembled output table. Writing files is left to the caller, except for the
//! intermediate series which is persisted as soon as it exists.

use tracing::info;

use crate::domain::{FitConfig, OutputTable, RegionOutcome};
use crate::error::AppError;
use crate::fit::fit_regions;
use crate::io::ingest::read_raw_table;
use crate::series::{ReshapedSeries, reshape};

/// All computed outputs of a single `sirfit fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Series actually fit (after offset and filter).
    pub reshaped: ReshapedSeries,
    pub outcomes: Vec<RegionOutcome>,
    pub table: OutputTable,
}

impl RunOutput {
    pub fn fitted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }
}

/// Read, reshape and prepare the series described by `config`.
pub fn load_series(config: &FitConfig) -> Result<ReshapedSeries, AppError> {
    let ingested = read_raw_table(&config.input_path, config.input_delimiter)?;
    let mut reshaped = reshape(&ingested.table)?;
    if !ingested.parse_errors.is_empty() {
        reshaped.rows_read += ingested.parse_errors.len();
        reshaped.row_errors.extend(ingested.parse_errors);
        reshaped.row_errors.sort_by_key(|e| e.line);
    }

    let reshaped = reshaped.skip_days(config.skip_days)?.select_regions(&config.regions)?;
    info!(
        regions = reshaped.series.len(),
        days = reshaped.axis_len(),
        skipped_rows = reshaped.row_errors.len(),
        "reshaped input"
    );
    Ok(reshaped)
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    config.estimator.validate()?;

    let reshaped = load_series(config)?;

    if let Some(path) = &config.intermediate_path {
        crate::io::export::write_series_file(path, &reshaped, config.output_delimiter)?;
        info!(path = %path.display(), "wrote intermediate series");
    }

    let outcomes = fit_regions(&reshaped.series, &config.estimator, config.threads)?;
    let table = crate::report::assemble(&reshaped.dates, &reshaped.series, &outcomes)?;

    Ok(RunOutput {
        reshaped,
        outcomes,
        table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::EstimatorConfig;

    const RAW: &str = "Province/State,Country/Region,Lat,Long,3/1/20,3/2/20,3/3/20,3/4/20,3/5/20,3/6/20\n\
                       ,Alpha,0,0,0,0,5,12,30,70\n\
                       North,Beta,0,0,1,2,4,8,15,29\n\
                       South,Beta,0,0,0,1,2,4,9,15\n\
                       ,Gamma,0,0,0,0,0,0,0,0\n\
                       ,Delta,0,0,0,0,x,1,1,1\n";

    fn config(dir: &std::path::Path) -> FitConfig {
        let input = dir.join("raw.csv");
        std::fs::write(&input, RAW).unwrap();
        FitConfig {
            input_path: input,
            output_path: dir.join("out.csv"),
            intermediate_path: None,
            params_path: None,
            input_delimiter: b',',
            output_delimiter: b';',
            skip_days: 0,
            regions: Vec::new(),
            threads: Some(2),
            estimator: EstimatorConfig::default(),
        }
    }

    #[test]
    fn end_to_end_run_keeps_failed_regions() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_fit(&config(dir.path())).unwrap();

        let names: Vec<&str> = run.table.regions.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
        assert_eq!(run.fitted_count(), 2);
        assert_eq!(run.reshaped.row_errors.len(), 1);
        assert_eq!(run.reshaped.row_errors[0].line, 6);

        let beta = &run.table.regions[1];
        assert_eq!(beta.observed, vec![1, 3, 6, 12, 24, 44]);
        let alpha = &run.table.regions[0];
        assert_eq!(&alpha.fitted[..2], &[0.0, 0.0]);
        assert_eq!(alpha.fitted[2], 5.0);
        assert!(run.table.regions.iter().all(|r| r.fitted.len() == 6));
        assert!(!run.table.regions[2].has_fit);
    }

    #[test]
    fn skip_days_and_region_filter_apply_before_fitting() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.skip_days = 3;
        cfg.regions = vec!["Beta".to_string()];
        cfg.intermediate_path = Some(dir.path().join("series.csv"));

        let run = run_fit(&cfg).unwrap();
        assert_eq!(run.table.dates.len(), 3);
        assert_eq!(run.table.regions.len(), 1);
        assert_eq!(run.table.regions[0].observed, vec![12, 24, 44]);

        let series = std::fs::read_to_string(dir.path().join("series.csv")).unwrap();
        assert_eq!(series.lines().next(), Some("Date;Beta"));
        assert_eq!(series.lines().count(), 4);
    }

    #[test]
    fn unknown_region_and_bad_input_fail_with_exit_code_two() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.regions = vec!["Nowhere".to_string()];
        assert_eq!(run_fit(&cfg).unwrap_err().exit_code(), 2);

        let mut cfg = config(dir.path());
        cfg.input_path = dir.path().join("missing.csv");
        assert_eq!(run_fit(&cfg).unwrap_err().exit_code(), 2);

        let cfg = config(dir.path());
        std::fs::write(&cfg.input_path, "Country/Region,a,b\nX,1,2\n").unwrap();
        assert_eq!(run_fit(&cfg).unwrap_err().exit_code(), 2);
    }
}
