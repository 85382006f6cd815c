//! Adaptive explicit Runge–Kutta integration (Dormand–Prince 5(4)).
//!
//! The solver advances the state between consecutive requested output times and
//! lands exactly on each of them, so no interpolation is involved. The step size
//! is controlled by the embedded 4th-order error estimate using the usual mixed
//! tolerance `atol + rtol * |y|`.
//!
//! Numerical notes:
//! - Every stage is a linear combination of right-hand-side evaluations, so any
//!   linear invariant of the system (e.g. a conserved total) is preserved up to
//!   rounding.
//! - The step budget applies per output interval; running out of it is reported
//!   as an error instead of returning a low-accuracy solution.
//! - For identical inputs the sequence of steps is identical, so results are
//!   bit-for-bit reproducible.

use crate::error::IntegrationError;

/// Step-size control settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegratorOptions {
    pub rtol: f64,
    pub atol: f64,
    /// Maximum number of attempted steps between two consecutive output times.
    pub max_steps: usize,
}

impl Default for IntegratorOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            atol: 1e-8,
            max_steps: 2000,
        }
    }
}

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const ERROR_EXPONENT: f64 = -1.0 / 5.0;

// Dormand–Prince tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (also the 7th stage row, FSAL).
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference between the 5th- and 4th-order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Solve `dy/dt = rhs(t, y)` from `y0` at `times[0]` and return the state at each
/// entry of `times`.
///
/// `times` must be finite and non-decreasing; repeated times yield repeated states.
/// An empty `times` yields an empty result.
pub fn solve<F, const N: usize>(
    rhs: F,
    y0: [f64; N],
    times: &[f64],
    opts: &IntegratorOptions,
) -> Result<Vec<[f64; N]>, IntegrationError>
where
    F: Fn(f64, &[f64; N]) -> [f64; N],
{
    let mut out = Vec::with_capacity(times.len());
    let Some(&t_start) = times.first() else {
        return Ok(out);
    };
    validate_times(times)?;

    if !all_finite(&y0) {
        return Err(IntegrationError::NonFinite { t: t_start });
    }

    let mut t = t_start;
    let mut y = y0;
    let mut f = rhs(t, &y);
    if !all_finite(&f) {
        return Err(IntegrationError::NonFinite { t });
    }
    out.push(y);

    let mut h: Option<f64> = None;

    for &t_next in &times[1..] {
        if t_next - t <= snap_tolerance(t_next) {
            out.push(y);
            continue;
        }

        let mut hh = match h {
            Some(v) => v,
            None => initial_step(&rhs, t, &y, &f, t_next - t, opts),
        };
        let t_from = t;
        let mut steps = 0usize;

        while t_next - t > snap_tolerance(t_next) {
            if steps >= opts.max_steps {
                return Err(IntegrationError::StepBudget {
                    from: t_from,
                    to: t_next,
                    max_steps: opts.max_steps,
                });
            }
            steps += 1;

            let remaining = t_next - t;
            let last = hh >= remaining;
            let step = if last { remaining } else { hh };

            let (y_new, f_new, err) = dormand_prince_step(&rhs, t, &y, &f, step, opts);

            if !(all_finite(&y_new) && all_finite(&f_new) && err.is_finite()) {
                // Treat as a rejected step; repeated failures end in underflow.
                hh = step * MIN_FACTOR;
            } else if err <= 1.0 {
                t = if last { t_next } else { t + step };
                y = y_new;
                f = f_new;

                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(ERROR_EXPONENT)).clamp(MIN_FACTOR, MAX_FACTOR)
                };
                // A step clipped to hit the output time says nothing about the
                // step size the solution tolerates; keep the previous proposal.
                if !(last && step < hh) {
                    hh = step * factor;
                }
                continue;
            } else {
                let factor = (SAFETY * err.powf(ERROR_EXPONENT)).max(MIN_FACTOR);
                hh = step * factor;
            }

            if hh <= f64::EPSILON * 16.0 * t.abs().max(1.0) {
                if all_finite(&y_new) {
                    return Err(IntegrationError::StepUnderflow { t });
                }
                return Err(IntegrationError::NonFinite { t });
            }
        }

        h = Some(hh);
        out.push(y);
    }

    Ok(out)
}

fn validate_times(times: &[f64]) -> Result<(), IntegrationError> {
    for (index, w) in times.windows(2).enumerate() {
        if !(w[0].is_finite() && w[1].is_finite()) || w[1] < w[0] {
            return Err(IntegrationError::UnorderedTimes { index: index + 1 });
        }
    }
    if !times[0].is_finite() {
        return Err(IntegrationError::UnorderedTimes { index: 0 });
    }
    Ok(())
}

/// Gaps below this are rounding noise and are not integrated.
fn snap_tolerance(t: f64) -> f64 {
    4.0 * f64::EPSILON * t.abs().max(1.0)
}

fn all_finite<const N: usize>(v: &[f64; N]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// One Dormand–Prince step of size `h`.
///
/// Returns the 5th-order solution, the derivative there (reused as the next
/// step's first stage) and the scaled RMS error estimate.
fn dormand_prince_step<F, const N: usize>(
    rhs: &F,
    t: f64,
    y: &[f64; N],
    k1: &[f64; N],
    h: f64,
    opts: &IntegratorOptions,
) -> ([f64; N], [f64; N], f64)
where
    F: Fn(f64, &[f64; N]) -> [f64; N],
{
    let mut tmp = [0.0; N];

    for i in 0..N {
        tmp[i] = y[i] + h * A21 * k1[i];
    }
    let k2 = rhs(t + C2 * h, &tmp);

    for i in 0..N {
        tmp[i] = y[i] + h * (A31 * k1[i] + A32 * k2[i]);
    }
    let k3 = rhs(t + C3 * h, &tmp);

    for i in 0..N {
        tmp[i] = y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
    }
    let k4 = rhs(t + C4 * h, &tmp);

    for i in 0..N {
        tmp[i] = y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
    }
    let k5 = rhs(t + C5 * h, &tmp);

    for i in 0..N {
        tmp[i] = y[i] + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
    }
    let k6 = rhs(t + h, &tmp);

    let mut y_new = [0.0; N];
    for i in 0..N {
        y_new[i] = y[i] + h * (B1 * k1[i] + B3 * k3[i] + B4 * k4[i] + B5 * k5[i] + B6 * k6[i]);
    }
    let k7 = rhs(t + h, &y_new);

    let mut sum_sq = 0.0;
    for i in 0..N {
        let e = h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
        let scale = opts.atol + opts.rtol * y[i].abs().max(y_new[i].abs());
        sum_sq += (e / scale) * (e / scale);
    }
    let err = if N == 0 { 0.0 } else { (sum_sq / N as f64).sqrt() };

    (y_new, k7, err)
}

/// Starting step size (Hairer, Nørsett & Wanner, algorithm II.4), capped at `span`.
fn initial_step<F, const N: usize>(
    rhs: &F,
    t: f64,
    y: &[f64; N],
    f0: &[f64; N],
    span: f64,
    opts: &IntegratorOptions,
) -> f64
where
    F: Fn(f64, &[f64; N]) -> [f64; N],
{
    if N == 0 {
        return span;
    }
    let scale: Vec<f64> = y.iter().map(|v| opts.atol + opts.rtol * v.abs()).collect();
    let rms = |v: &[f64]| -> f64 {
        let s: f64 = v.iter().zip(&scale).map(|(x, sc)| (x / sc) * (x / sc)).sum();
        (s / N as f64).sqrt()
    };

    let d0 = rms(y);
    let d1 = rms(f0);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
    let h0 = h0.min(span);

    let mut y1 = [0.0; N];
    for i in 0..N {
        y1[i] = y[i] + h0 * f0[i];
    }
    let f1 = rhs(t + h0, &y1);
    let diff: Vec<f64> = f1.iter().zip(f0.iter()).map(|(a, b)| a - b).collect();
    let d2 = rms(&diff) / h0;

    let h1 = if !d2.is_finite() {
        h0
    } else if d1.max(d2) <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / 5.0)
    };

    (100.0 * h0).min(h1).min(span).max(f64::MIN_POSITIVE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay(_t: f64, y: &[f64; 1]) -> [f64; 1] {
        [-y[0]]
    }

    #[test]
    fn exponential_decay_matches_closed_form() {
        let times: Vec<f64> = (0..=10).map(|i| i as f64 * 0.5).collect();
        let out = solve(decay, [1.0], &times, &IntegratorOptions::default()).unwrap();
        assert_eq!(out.len(), times.len());
        for (t, y) in times.iter().zip(&out) {
            let exact = (-t).exp();
            assert!((y[0] - exact).abs() < 1e-8, "t={t}: {} vs {exact}", y[0]);
        }
    }

    #[test]
    fn first_output_is_initial_state_and_repeats_are_kept() {
        let times = [0.0, 1.0, 1.0, 2.0];
        let out = solve(decay, [3.0], &times, &IntegratorOptions::default()).unwrap();
        assert_eq!(out[0], [3.0]);
        assert_eq!(out[1], out[2]);
    }

    #[test]
    fn harmonic_oscillator_keeps_phase() {
        let rhs = |_t: f64, y: &[f64; 2]| [y[1], -y[0]];
        let times = [0.0, std::f64::consts::PI, 2.0 * std::f64::consts::PI];
        let out = solve(rhs, [1.0, 0.0], &times, &IntegratorOptions::default()).unwrap();
        assert!((out[1][0] + 1.0).abs() < 1e-7);
        assert!((out[2][0] - 1.0).abs() < 1e-7);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let times: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let rhs = |t: f64, y: &[f64; 2]| [-0.3 * y[0] * y[1], 0.3 * y[0] * y[1] - 0.1 * y[1] + 0.0 * t];
        let a = solve(rhs, [0.99, 0.01], &times, &IntegratorOptions::default()).unwrap();
        let b = solve(rhs, [0.99, 0.01], &times, &IntegratorOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn decreasing_times_are_rejected() {
        let err = solve(decay, [1.0], &[0.0, 2.0, 1.0], &IntegratorOptions::default()).unwrap_err();
        assert_eq!(err, IntegrationError::UnorderedTimes { index: 2 });
    }

    #[test]
    fn exhausted_step_budget_is_an_error() {
        let opts = IntegratorOptions {
            max_steps: 2,
            ..IntegratorOptions::default()
        };
        let rhs = |_t: f64, y: &[f64; 2]| [y[1], -100.0 * y[0]];
        let err = solve(rhs, [1.0, 0.0], &[0.0, 50.0], &opts).unwrap_err();
        assert!(matches!(err, IntegrationError::StepBudget { max_steps: 2, .. }));
    }

    #[test]
    fn finite_time_blow_up_fails_instead_of_returning_garbage() {
        let rhs = |_t: f64, y: &[f64; 1]| [y[0] * y[0]];
        let result = solve(rhs, [1.0], &[0.0, 2.0], &IntegratorOptions::default());
        assert!(result.is_err());
    }
}
