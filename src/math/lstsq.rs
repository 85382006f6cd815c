//! Small dense least-squares kernels built on SVD.
//!
//! Two operations are needed by the optimizer:
//! - solving the damped Gauss–Newton system, written as an augmented
//!   least-squares problem `[J; sqrt(λ)·D] δ = [-r; 0]` so the normal equations
//!   are never formed explicitly
//! - the unscaled covariance `(JᵀJ)⁻¹` at the optimum
//!
//! Parameter dimensions are tiny (two for SIR), so SVD cost is irrelevant next to
//! the forward-model evaluations.

use nalgebra::{DMatrix, DVector};

/// Solve `min ||x β - y||²` using SVD.
///
/// Returns `None` if no finite solution is found even with relaxed tolerances.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-14, 1e-12, 1e-10] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the Levenberg–Marquardt step `(JᵀJ + λ·diag(d²)) δ = -Jᵀr`.
pub fn damped_step(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    scale: &DVector<f64>,
    lambda: f64,
) -> Option<DVector<f64>> {
    let (m, n) = jacobian.shape();
    let mut a = DMatrix::<f64>::zeros(m + n, n);
    let mut b = DVector::<f64>::zeros(m + n);

    a.view_mut((0, 0), (m, n)).copy_from(jacobian);
    for i in 0..m {
        b[i] = -residuals[i];
    }
    let sl = lambda.sqrt();
    for j in 0..n {
        a[(m + j, j)] = sl * scale[j];
    }

    solve_least_squares(&a, &b)
}

/// Unscaled covariance `(JᵀJ)⁻¹`.
///
/// Returns `None` when `J` is numerically rank deficient.
pub fn unscaled_covariance(jacobian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let (m, n) = jacobian.shape();
    if n == 0 || m < n {
        return None;
    }
    let svd = jacobian.clone().svd(false, true);
    let v_t = svd.v_t?;
    let s = &svd.singular_values;

    let s_max = s.max();
    let tol = f64::EPSILON * m.max(n) as f64 * s_max;
    if !(s_max.is_finite() && s_max > 0.0) || s.iter().any(|&sk| sk <= tol) {
        return None;
    }

    let mut cov = DMatrix::<f64>::zeros(n, n);
    for (k, &sk) in s.iter().enumerate() {
        let v = v_t.row(k).transpose();
        cov += (&v * v.transpose()) / (sk * sk);
    }
    Some(cov)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn zero_damping_is_gauss_newton() {
        let j = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let r = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        let d = DVector::from_element(1, 1.0);
        let step = damped_step(&j, &r, &d, 0.0).unwrap();
        assert!((step[0] + 1.0).abs() < 1e-12);

        // Damping shortens the step.
        let damped = damped_step(&j, &r, &d, 10.0).unwrap();
        assert!(damped[0] > -1.0 && damped[0] < 0.0);
    }

    #[test]
    fn covariance_inverts_normal_matrix() {
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let cov = unscaled_covariance(&j).unwrap();
        let jtj = j.transpose() * &j;
        let id = jtj * cov;
        assert!((id - DMatrix::<f64>::identity(2, 2)).abs().max() < 1e-10);
    }

    #[test]
    fn collinear_columns_have_no_covariance() {
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        assert!(unscaled_covariance(&j).is_none());
    }
}
