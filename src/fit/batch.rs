//! Batch estimation over all regions.
//!
//! Regions are fit independently on a bounded rayon pool. `collect` on an
//! indexed parallel iterator keeps input order, so the merge is deterministic
//! regardless of which worker finishes first.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::{RegionOutcome, RegionSeries};
use crate::error::AppError;
use crate::fit::estimator::{EstimatorConfig, estimate_region};

/// Fit every region; per-region failures are kept in the returned outcomes.
///
/// `threads = None` uses one worker per logical core.
pub fn fit_regions(
    series: &[RegionSeries],
    config: &EstimatorConfig,
    threads: Option<usize>,
) -> Result<Vec<RegionOutcome>, AppError> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        if n == 0 {
            return Err(AppError::new(2, "Worker count must be >= 1."));
        }
        builder = builder.num_threads(n);
    }
    let pool = builder
        .thread_name(|i| format!("sirfit-worker-{i}"))
        .build()
        .map_err(|e| AppError::new(4, format!("Failed to start worker pool: {e}")))?;

    info!(regions = series.len(), workers = pool.current_num_threads(), "fitting regions");

    let outcomes: Vec<RegionOutcome> = pool.install(|| {
        series
            .par_iter()
            .map(|s| RegionOutcome {
                region: s.region.clone(),
                result: estimate_region(s, config),
            })
            .collect()
    });

    for outcome in &outcomes {
        match &outcome.result {
            Ok(fit) => info!(
                region = %outcome.region,
                beta = fit.parameters.beta,
                gamma = fit.parameters.gamma,
                r0 = fit.parameters.r0(),
                "fit ok"
            ),
            Err(err) => warn!(region = %outcome.region, kind = err.kind(), "fit failed: {err}"),
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::error::FitError;

    fn region(name: &str, counts: Vec<u64>) -> RegionSeries {
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..counts.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        RegionSeries {
            region: name.to_string(),
            dates: Arc::from(dates),
            counts,
        }
    }

    #[test]
    fn outcomes_follow_input_order() {
        let names = ["Zeta", "Alpha", "Mid", "Beta", "Omega", "Gamma"];
        let series: Vec<RegionSeries> = names
            .iter()
            .enumerate()
            .map(|(i, n)| region(n, vec![0, 1 + i as u64, 3 + 2 * i as u64, 9 + 3 * i as u64, 20 + 5 * i as u64]))
            .collect();

        let outcomes = fit_regions(&series, &EstimatorConfig::default(), Some(3)).unwrap();
        let got: Vec<&str> = outcomes.iter().map(|o| o.region.as_str()).collect();
        assert_eq!(got, names);
    }

    #[test]
    fn failing_region_does_not_affect_others() {
        let series = vec![
            region("Good", vec![0, 0, 5, 12, 30, 70]),
            region("Empty", vec![0; 6]),
            region("Late", vec![0, 0, 0, 0, 0, 4]),
        ];
        let outcomes = fit_regions(&series, &EstimatorConfig::default(), Some(2)).unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].fit().is_some());
        assert_eq!(outcomes[1].error(), Some(&FitError::InsufficientData { usable: 0 }));
        assert_eq!(outcomes[2].error(), Some(&FitError::InsufficientData { usable: 1 }));
    }

    #[test]
    fn pool_size_does_not_change_results() {
        let series = vec![
            region("A", vec![0, 2, 5, 11, 24, 50, 98]),
            region("B", vec![1, 2, 2, 4, 7, 13, 22]),
        ];
        let single = fit_regions(&series, &EstimatorConfig::default(), Some(1)).unwrap();
        let multi = fit_regions(&series, &EstimatorConfig::default(), Some(4)).unwrap();
        assert_eq!(single, multi);
    }

    #[test]
    fn zero_workers_is_a_configuration_error() {
        let err = fit_regions(&[], &EstimatorConfig::default(), Some(0)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
