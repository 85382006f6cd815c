//! Fitted-series assembly onto the shared date axis.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::{OutputTable, RegionColumns, RegionOutcome, RegionSeries};
use crate::error::AppError;

/// Left-pad a trimmed trajectory with zeros to `axis_len` entries.
///
/// Returns `None` when the trajectory is longer than the axis.
pub fn pad_fitted(axis_len: usize, fitted: &[f64]) -> Option<Vec<f64>> {
    let lead = axis_len.checked_sub(fitted.len())?;
    let mut out = vec![0.0; lead];
    out.extend_from_slice(fitted);
    Some(out)
}

/// Merge observed series and fit outcomes into the output table.
///
/// `series` and `outcomes` must describe the same regions in the same order.
pub fn assemble(
    dates: &Arc<[NaiveDate]>,
    series: &[RegionSeries],
    outcomes: &[RegionOutcome],
) -> Result<OutputTable, AppError> {
    if series.len() != outcomes.len() {
        return Err(AppError::new(
            4,
            format!("{} series but {} fit outcomes.", series.len(), outcomes.len()),
        ));
    }

    let n = dates.len();
    let mut regions = Vec::with_capacity(series.len());

    for (s, outcome) in series.iter().zip(outcomes) {
        if s.region != outcome.region || s.counts.len() != n {
            return Err(AppError::new(
                4,
                format!("Series '{}' does not line up with the date axis or its fit.", s.region),
            ));
        }

        let (fitted, has_fit) = match outcome.fit() {
            Some(fit) => {
                // The fit must end on the last axis day.
                if fit.onset + fit.fitted_infected.len() != n {
                    return Err(AppError::new(
                        4,
                        format!("Fitted trajectory of '{}' does not end on the last date.", s.region),
                    ));
                }
                let padded = pad_fitted(n, &fit.fitted_infected).ok_or_else(|| {
                    AppError::new(4, format!("Fitted trajectory of '{}' is longer than the axis.", s.region))
                })?;
                (padded, true)
            }
            None => (vec![0.0; n], false),
        };

        regions.push(RegionColumns {
            region: s.region.clone(),
            observed: s.counts.clone(),
            fitted,
            has_fit,
        });
    }

    Ok(OutputTable {
        dates: Arc::clone(dates),
        regions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitQuality, FitResult, ModelParameters, ParameterErrors};
    use crate::error::FitError;
    use crate::math::Termination;

    fn axis(n: usize) -> Arc<[NaiveDate]> {
        let start = NaiveDate::from_ymd_opt(2020, 2, 1).unwrap();
        let v: Vec<NaiveDate> = (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect();
        Arc::from(v)
    }

    fn fit(region: &str, onset: usize, fitted: Vec<f64>) -> FitResult {
        FitResult {
            region: region.to_string(),
            parameters: ModelParameters::SEED,
            parameter_std_errors: ParameterErrors { beta: 0.1, gamma: 0.1 },
            fitted_infected: fitted,
            onset,
            quality: FitQuality {
                seed_sse: 1.0,
                sse: 1.0,
                rmse: 1.0,
                evaluations: 1,
                iterations: 1,
                termination: Termination::Gradient,
            },
        }
    }

    #[test]
    fn padding_puts_zeros_before_onset() {
        let padded = pad_fitted(10, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(padded.len(), 10);
        assert!(padded[..6].iter().all(|&v| v == 0.0));
        assert_eq!(&padded[6..], &[1.0, 2.0, 3.0, 4.0]);
        assert!(pad_fitted(2, &[1.0, 2.0, 3.0]).is_none());
    }

    #[test]
    fn assembled_columns_cover_the_full_axis() {
        let dates = axis(10);
        let series = vec![
            RegionSeries {
                region: "Late".to_string(),
                dates: Arc::clone(&dates),
                counts: vec![0, 0, 0, 0, 0, 0, 3, 5, 9, 14],
            },
            RegionSeries {
                region: "None".to_string(),
                dates: Arc::clone(&dates),
                counts: vec![0; 10],
            },
        ];
        let trajectory = vec![3.0, 5.1, 8.7, 14.2];
        let outcomes = vec![
            RegionOutcome {
                region: "Late".to_string(),
                result: Ok(fit("Late", 6, trajectory.clone())),
            },
            RegionOutcome {
                region: "None".to_string(),
                result: Err(FitError::InsufficientData { usable: 0 }),
            },
        ];

        let table = assemble(&dates, &series, &outcomes).unwrap();

        assert_eq!(table.dates.len(), 10);
        for col in &table.regions {
            assert_eq!(col.fitted.len(), 10);
            assert_eq!(col.observed.len(), 10);
        }
        let late = &table.regions[0];
        assert!(late.has_fit);
        assert_eq!(&late.fitted[..6], &[0.0; 6]);
        assert_eq!(&late.fitted[6..], trajectory.as_slice());

        let none = &table.regions[1];
        assert!(!none.has_fit);
        assert!(none.fitted.iter().all(|&v| v == 0.0));
        assert_eq!(none.observed, vec![0; 10]);
    }

    #[test]
    fn mismatched_inputs_are_internal_errors() {
        let dates = axis(3);
        let series = vec![RegionSeries {
            region: "A".to_string(),
            dates: Arc::clone(&dates),
            counts: vec![1, 2, 3],
        }];
        let wrong_name = vec![RegionOutcome {
            region: "B".to_string(),
            result: Err(FitError::InsufficientData { usable: 0 }),
        }];
        assert_eq!(assemble(&dates, &series, &wrong_name).unwrap_err().exit_code(), 4);
        assert_eq!(assemble(&dates, &series, &[]).unwrap_err().exit_code(), 4);

        let short_fit = vec![RegionOutcome {
            region: "A".to_string(),
            result: Ok(fit("A", 0, vec![1.0, 2.0])),
        }];
        assert!(assemble(&dates, &series, &short_fit).is_err());
    }
}
