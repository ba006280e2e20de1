//! Linear regression with an intercept term.
//!
//! Both solvers work on centred data: the column means of the design matrix
//! and the mean of the targets are removed before solving, and the intercept
//! is recovered afterwards as `ȳ - x̄·β`. Ridge regression therefore never
//! penalizes the intercept.
//!
//! - [`fit_least_squares`]: minimum-norm least squares via SVD, which keeps
//!   rank-deficient design matrices (e.g. constant predictor columns) solvable
//! - [`fit_ridge`]: L2-regularized normal equations solved via Cholesky
//! - [`fit_slope`]: closed-form slope of a 1D linear fit

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::error::MathError;

/// Maximum number of SVD sweeps before a decomposition counts as failed
const SVD_MAX_ITERATIONS: usize = 1000;

/// A fitted linear model `y = X·coefficients + intercept`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    /// One coefficient per predictor column
    pub coefficients: Array1<f64>,
    /// Constant offset
    pub intercept: f64,
}

impl LinearFit {
    /// Evaluate the model on the rows of `x`
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, MathError> {
        if x.ncols() != self.coefficients.len() {
            return Err(MathError::DimensionMismatch {
                expected: self.coefficients.len(),
                got: x.ncols(),
            });
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }

    /// Number of predictor columns the model was fitted with
    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }
}

/// Column means of `x` and the centred design matrix as an nalgebra matrix
fn centred_design(x: ArrayView2<f64>) -> (Array1<f64>, DMatrix<f64>) {
    let (n, p) = x.dim();
    let means = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(p));
    let design = DMatrix::from_fn(n, p, |i, j| x[[i, j]] - means[j]);
    (means, design)
}

fn validate(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), MathError> {
    if x.nrows() != y.len() {
        return Err(MathError::DimensionMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    if y.is_empty() {
        return Err(MathError::InsufficientData { needed: 1, got: 0 });
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(MathError::NonFinite);
    }
    Ok(())
}

fn assemble(x_means: &Array1<f64>, y_mean: f64, beta: &DVector<f64>) -> LinearFit {
    let coefficients = Array1::from_iter(beta.iter().copied());
    let intercept = y_mean - x_means.dot(&coefficients);
    LinearFit {
        coefficients,
        intercept,
    }
}

/// Ordinary least squares with intercept.
///
/// Singular values below `ε·max(n, p)·σ_max` are treated as zero, which
/// yields the minimum-norm solution for rank-deficient problems.
///
/// # Errors
/// * `MathError::DimensionMismatch` - `x` and `y` have different row counts
/// * `MathError::InsufficientData` - no samples
/// * `MathError::NonFinite` - NaN or infinite inputs
/// * `MathError::SolveFailed` - the SVD did not converge
pub fn fit_least_squares(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<LinearFit, MathError> {
    validate(x, y)?;

    let (n, p) = x.dim();
    let y_mean = y.mean().unwrap_or(0.0);
    let (x_means, design) = centred_design(x);

    if p == 0 {
        return Ok(assemble(&x_means, y_mean, &DVector::zeros(0)));
    }

    let targets = DVector::from_iterator(n, y.iter().map(|v| v - y_mean));
    let svd = design
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(|| MathError::SolveFailed("SVD did not converge".to_string()))?;

    let sigma_max = svd.singular_values.max();
    let cutoff = f64::EPSILON * n.max(p) as f64 * sigma_max;
    let beta = svd
        .solve(&targets, cutoff)
        .map_err(|e| MathError::SolveFailed(e.to_string()))?;

    Ok(assemble(&x_means, y_mean, &beta))
}

/// Ridge regression with intercept and penalty `alpha` on the slopes.
///
/// # Errors
/// Same as [`fit_least_squares`]; `SolveFailed` if the regularized normal
/// matrix is not positive definite (only possible for `alpha <= 0`).
pub fn fit_ridge(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alpha: f64,
) -> Result<LinearFit, MathError> {
    validate(x, y)?;

    let (n, p) = x.dim();
    let y_mean = y.mean().unwrap_or(0.0);
    let (x_means, design) = centred_design(x);

    if p == 0 {
        return Ok(assemble(&x_means, y_mean, &DVector::zeros(0)));
    }

    let targets = DVector::from_iterator(n, y.iter().map(|v| v - y_mean));
    let gram = design.transpose() * &design + DMatrix::identity(p, p) * alpha;
    let rhs = design.transpose() * targets;

    let beta = gram
        .cholesky()
        .ok_or_else(|| {
            MathError::SolveFailed("regularized normal matrix is not positive definite".to_string())
        })?
        .solve(&rhs);

    Ok(assemble(&x_means, y_mean, &beta))
}

/// Slope of the least-squares line through `(xs[i], ys[i])`.
///
/// Returns NaN if any value is NaN or all `xs` coincide, so that comparisons
/// against the result fail rather than pass.
pub fn fit_slope(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() != ys.len() || xs.is_empty() {
        return f64::NAN;
    }

    let n = xs.len() as f64;
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }

    if sxx == 0.0 {
        return f64::NAN;
    }
    sxy / sxx
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_least_squares_recovers_exact_model() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let x = Array2::from_shape_fn((50, 3), |_| rng.random_range(-1.0..1.0));
        let y = x.column(0).mapv(|v| 2.0 * v) - x.column(2).mapv(|v| 0.5 * v) + 3.0;

        let fit = fit_least_squares(x.view(), y.view()).unwrap();

        assert_relative_eq!(fit.coefficients[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(fit.coefficients[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(fit.coefficients[2], -0.5, epsilon = 1e-9);
        assert_relative_eq!(fit.intercept, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_least_squares_handles_constant_column() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [4.0, 5.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];

        let fit = fit_least_squares(x.view(), y.view()).unwrap();
        let predictions = fit.predict(x.view()).unwrap();

        for (p, t) in predictions.iter().zip(y.iter()) {
            assert_relative_eq!(p, t, epsilon = 1e-9);
        }
        assert_relative_eq!(fit.coefficients[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ridge_shrinks_towards_zero() {
        let x = array![[-1.0], [0.0], [1.0], [2.0]];
        let y = array![-2.0, 0.0, 2.0, 4.0];

        let ols = fit_least_squares(x.view(), y.view()).unwrap();
        let ridge = fit_ridge(x.view(), y.view(), 10.0).unwrap();

        assert_relative_eq!(ols.coefficients[0], 2.0, epsilon = 1e-9);
        assert!(ridge.coefficients[0] > 0.0);
        assert!(ridge.coefficients[0] < ols.coefficients[0]);
    }

    #[test]
    fn test_ridge_without_penalty_matches_ols() {
        let x = array![[0.0, 1.0], [1.0, 0.5], [2.0, 3.0], [3.0, 1.5], [4.0, 0.0]];
        let y = array![1.0, 2.5, 2.0, 4.5, 6.0];

        let ols = fit_least_squares(x.view(), y.view()).unwrap();
        let ridge = fit_ridge(x.view(), y.view(), 0.0).unwrap();

        for (a, b) in ols.coefficients.iter().zip(ridge.coefficients.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-8);
        }
        assert_relative_eq!(ols.intercept, ridge.intercept, epsilon = 1e-8);
    }

    #[test]
    fn test_rejects_nan_and_mismatch() {
        let x = array![[1.0], [f64::NAN]];
        let y = array![1.0, 2.0];
        assert_eq!(
            fit_least_squares(x.view(), y.view()),
            Err(MathError::NonFinite)
        );

        let x = array![[1.0], [2.0], [3.0]];
        assert!(matches!(
            fit_ridge(x.view(), y.view(), 1.0),
            Err(MathError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_no_predictors_gives_mean() {
        let x = Array2::<f64>::zeros((4, 0));
        let y = array![1.0, 2.0, 3.0, 6.0];
        let fit = fit_least_squares(x.view(), y.view()).unwrap();
        assert_relative_eq!(fit.intercept, 3.0);
        assert_eq!(fit.n_features(), 0);
    }

    #[test]
    fn test_fit_slope() {
        assert_relative_eq!(fit_slope(&[0.0, 1.0, 2.0], &[1.0, 3.0, 5.0]), 2.0);
        assert_relative_eq!(fit_slope(&[3.0, 4.0, 5.0, 6.0], &[4.0, 3.0, 2.0, 1.0]), -1.0);
        assert!(fit_slope(&[1.0, 1.0], &[0.0, 1.0]).is_nan());
        assert!(fit_slope(&[0.0, 1.0], &[0.0, f64::NAN]).is_nan());
    }
}
