//! Deterministic synthetic case tables.
//!
//! Each region gets its own SIR parameters and onset day; the infected curve is
//! simulated with the same integrator the estimator uses, perturbed by
//! multiplicative log-normal noise and rounded to whole counts. The first
//! region is reported as two sub-region rows so the table exercises the
//! reshaper's aggregation.

use chrono::NaiveDate;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::LogNormal;

use crate::domain::{ModelParameters, ModelState, RawCaseTable, RawRow};
use crate::error::AppError;
use crate::math::IntegratorOptions;
use crate::models::infected_trajectory;

/// Generator settings.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub regions: usize,
    pub days: usize,
    pub seed: u64,
    /// Standard deviation of the log-normal noise factor (0 disables noise).
    pub noise: f64,
    pub population: f64,
    pub start: NaiveDate,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            regions: 5,
            days: 120,
            seed: 42,
            noise: 0.05,
            population: 1_000_000.0,
            start: NaiveDate::from_ymd_opt(2020, 1, 22).unwrap_or_default(),
        }
    }
}

/// Parameters a synthetic region was generated with.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticRegion {
    pub region: String,
    pub parameters: ModelParameters,
    pub onset: usize,
    pub initial_infected: u64,
}

#[derive(Debug, Clone)]
pub struct SyntheticData {
    pub table: RawCaseTable,
    pub regions: Vec<SyntheticRegion>,
}

/// Date header in the upstream `m/d/yy` convention.
fn date_header(date: NaiveDate) -> String {
    date.format("%-m/%-d/%y").to_string()
}

pub fn generate_synthetic(config: &SynthConfig) -> Result<SyntheticData, AppError> {
    if config.regions == 0 || config.days < 2 {
        return Err(AppError::new(2, "Synthetic data needs at least 1 region and 2 days."));
    }
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::new(2, format!("Invalid noise level {}.", config.noise)));
    }
    if !(config.population.is_finite() && config.population > 0.0) {
        return Err(AppError::new(2, format!("Invalid population {}.", config.population)));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = LogNormal::new(0.0, config.noise)
        .map_err(|e| AppError::new(4, format!("Invalid noise distribution: {e}")))?;
    let integrator = IntegratorOptions::default();

    let mut headers: Vec<String> = ["Country/Region", "Province/State", "Lat", "Long"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    headers.extend((0..config.days).map(|d| date_header(config.start + chrono::Duration::days(d as i64))));

    let mut rows = Vec::new();
    let mut regions = Vec::with_capacity(config.regions);

    for r in 0..config.regions {
        let region = format!("Region {:02}", r + 1);
        let parameters = ModelParameters::new(rng.gen_range(0.25..=0.5), rng.gen_range(0.05..=0.15));
        let onset = rng.gen_range(0..=config.days / 3);
        let initial_infected: u64 = rng.gen_range(1..=20);
        let lat: f64 = rng.gen_range(-60.0..=70.0);
        let long: f64 = rng.gen_range(-180.0..=180.0);

        let times: Vec<f64> = (0..config.days - onset).map(|d| d as f64).collect();
        let infected = infected_trajectory(
            ModelState::outbreak(config.population, initial_infected as f64),
            &parameters,
            config.population,
            &times,
            &integrator,
        )
        .map_err(|e| AppError::new(4, format!("Failed to simulate {region}: {e}")))?;

        let mut counts = vec![0u64; onset];
        counts.extend(infected.iter().enumerate().map(|(d, &i)| {
            if d == 0 {
                initial_infected
            } else {
                (i * noise.sample(&mut rng)).round().max(0.0) as u64
            }
        }));

        let meta = |province: &str| vec![region.clone(), province.to_string(), format!("{lat:.4}"), format!("{long:.4}")];
        if r == 0 {
            let north: Vec<u64> = counts.iter().map(|c| c * 3 / 5).collect();
            let south: Vec<u64> = counts.iter().zip(&north).map(|(c, n)| c - n).collect();
            for (province, part) in [("North", north), ("South", south)] {
                let mut cells = meta(province);
                cells.extend(part.iter().map(u64::to_string));
                rows.push(cells);
            }
        } else {
            let mut cells = meta("");
            cells.extend(counts.iter().map(u64::to_string));
            rows.push(cells);
        }

        regions.push(SyntheticRegion {
            region,
            parameters,
            onset,
            initial_infected,
        });
    }

    tracing::info!(regions = regions.len(), rows = rows.len(), days = config.days, "generated synthetic table");

    Ok(SyntheticData {
        table: RawCaseTable {
            headers,
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(i, cells)| RawRow { line: i + 2, cells })
                .collect(),
        },
        regions,
    })
}
