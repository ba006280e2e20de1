//! Standardization of predictors and targets.
//!
//! Scales use the population standard deviation. Columns without variance
//! get a scale of 1 so that transforming them yields zeros instead of NaN.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::MathError;

fn safe_scale(std: f64) -> f64 {
    if std > 0.0 && std.is_finite() {
        std
    } else {
        1.0
    }
}

/// Column-wise standard scaler for a design matrix
#[derive(Debug, Clone)]
pub struct ColumnScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl ColumnScaler {
    /// Learn per-column mean and standard deviation from the rows of `x`
    pub fn fit(x: ArrayView2<f64>) -> Result<Self, MathError> {
        if x.nrows() == 0 {
            return Err(MathError::InsufficientData { needed: 1, got: 0 });
        }
        let mean = x
            .mean_axis(Axis(0))
            .ok_or(MathError::InsufficientData { needed: 1, got: 0 })?;
        let scale = x.std_axis(Axis(0), 0.0).mapv(safe_scale);
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MathError> {
        if x.ncols() != self.mean.len() {
            return Err(MathError::DimensionMismatch {
                expected: self.mean.len(),
                got: x.ncols(),
            });
        }
        Ok((&x - &self.mean) / &self.scale)
    }

    pub fn mean(&self) -> ArrayView1<'_, f64> {
        self.mean.view()
    }

    pub fn scale(&self) -> ArrayView1<'_, f64> {
        self.scale.view()
    }
}

/// Standard scaler for a single series (regression targets)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesScaler {
    pub mean: f64,
    pub scale: f64,
}

impl SeriesScaler {
    pub fn fit(y: ArrayView1<f64>) -> Result<Self, MathError> {
        let mean = y
            .mean()
            .ok_or(MathError::InsufficientData { needed: 1, got: 0 })?;
        let scale = safe_scale(y.std(0.0));
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, y: ArrayView1<f64>) -> Array1<f64> {
        y.mapv(|v| (v - self.mean) / self.scale)
    }

    pub fn inverse_transform(&self, y: ArrayView1<f64>) -> Array1<f64> {
        y.mapv(|v| v * self.scale + self.mean)
    }
}
