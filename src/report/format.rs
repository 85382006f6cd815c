//! Formatted terminal output.
//!
//! We keep formatting code in one place so the estimation code stays free of
//! presentation concerns.

use crate::domain::{FitConfig, RegionOutcome, RowError};
use crate::io::params::{ParamsFile, RegionEntry};
use crate::series::ReshapedSeries;

/// Format the run header: input, axis, settings and skipped rows.
pub fn format_run_summary(reshaped: &ReshapedSeries, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== sirfit - SIR parameter estimation ===\n");
    out.push_str(&format!("Input: {}\n", config.input_path.display()));
    match (reshaped.dates.first(), reshaped.dates.last()) {
        (Some(first), Some(last)) => out.push_str(&format!(
            "Axis: {first} .. {last} ({} days, {} skipped)\n",
            reshaped.axis_len(),
            config.skip_days
        )),
        _ => out.push_str("Axis: empty\n"),
    }
    out.push_str(&format!(
        "Rows: read={} skipped={} | regions={}\n",
        reshaped.rows_read,
        reshaped.row_errors.len(),
        reshaped.series.len()
    ));
    out.push_str(&format!(
        "Model: N0={} seed=(beta={}, gamma={}) max_evals={}\n",
        config.estimator.population,
        config.estimator.seed.beta,
        config.estimator.seed.gamma,
        config.estimator.max_evaluations
    ));

    if !reshaped.row_errors.is_empty() {
        out.push_str("\nSkipped rows:\n");
        out.push_str(&format_row_errors(&reshaped.row_errors, 10));
    }

    out
}

/// Format up to `limit` row errors.
pub fn format_row_errors(errors: &[RowError], limit: usize) -> String {
    let mut out = String::new();
    for e in errors.iter().take(limit) {
        let region = e.region.as_deref().unwrap_or("-");
        out.push_str(&format!("  line {:>5} {:<20} {}\n", e.line, truncate(region, 20), e.message));
    }
    if errors.len() > limit {
        out.push_str(&format!("  ... and {} more\n", errors.len() - limit));
    }
    out
}

/// Format the per-region result table.
pub fn format_fit_table(outcomes: &[RegionOutcome]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<24} {:>10} {:>10} {:>8} {:>6} {:>12} {:>6} {:<10}",
            "region", "beta", "gamma", "R0", "k", "rmse", "evals", "status"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<24} {:-<10} {:-<10} {:-<8} {:-<6} {:-<12} {:-<6} {:-<10}",
            "", "", "", "", "", "", "", ""
        ),
    );

    for o in outcomes {
        let line = match &o.result {
            Ok(fit) => format!(
                "{:<24} {:>10.5} {:>10.5} {:>8.3} {:>6} {:>12.3} {:>6} {:<10}",
                truncate(&o.region, 24),
                fit.parameters.beta,
                fit.parameters.gamma,
                fit.parameters.r0(),
                fit.fitted_infected.len(),
                fit.quality.rmse,
                fit.quality.evaluations,
                fit.quality.termination.label()
            ),
            Err(err) => format!(
                "{:<24} {:>10} {:>10} {:>8} {:>6} {:>12} {:>6} {:<10}",
                truncate(&o.region, 24),
                "-",
                "-",
                "-",
                "-",
                "-",
                "-",
                err.kind()
            ),
        };
        push_line(&mut out, line);
    }

    out
}

/// Format which regions failed and why. Empty when all regions were fit.
pub fn format_failures(outcomes: &[RegionOutcome]) -> String {
    let failed: Vec<&RegionOutcome> = outcomes.iter().filter(|o| o.result.is_err()).collect();
    if failed.is_empty() {
        return String::new();
    }

    let mut out = format!("Failed regions ({} of {}):\n", failed.len(), outcomes.len());
    for o in failed {
        if let Some(err) = o.error() {
            out.push_str(&format!("- {}: {err}\n", o.region));
        }
    }
    out
}

/// Format a saved parameter report.
pub fn format_params_file(params: &ParamsFile) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "=== {} parameter report ===\nN0={} seed=(beta={}, gamma={})\n\n",
        params.tool, params.population, params.seed.beta, params.seed.gamma
    ));
    push_line(
        &mut out,
        format!(
            "{:<24} {:>10} {:>10} {:>10} {:>10} {:>8} {:<12}",
            "region", "beta", "se", "gamma", "se", "R0", "onset"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<24} {:-<10} {:-<10} {:-<10} {:-<10} {:-<8} {:-<12}",
            "", "", "", "", "", "", ""
        ),
    );

    for entry in &params.regions {
        let line = match entry {
            RegionEntry::Fitted(f) => format!(
                "{:<24} {:>10.5} {:>10} {:>10.5} {:>10} {:>8} {:<12}",
                truncate(&f.region, 24),
                f.beta,
                fmt_opt(f.beta_std_error, 5),
                f.gamma,
                fmt_opt(f.gamma_std_error, 5),
                fmt_opt(f.r0, 3),
                f.onset_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
            ),
            RegionEntry::Failed(f) => format!("{:<24} failed ({}): {}", truncate(&f.region, 24), f.kind, f.reason),
        };
        push_line(&mut out, line);
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(x) => format!("{x:.decimals$}"),
        None => "inf".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
