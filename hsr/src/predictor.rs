//! Per-pixel regression model.
//!
//! A [`PixelPredictor`] standardizes its design matrix and target, fits a
//! [`ModelKind`] on the standardized data and undoes the scaling when
//! predicting. When trained with a forward-modelled signal regressor, that
//! regressor is the last design column and its coefficient is reported in
//! data units.

use hci_math::{fit_least_squares, fit_ridge, ColumnScaler, LinearFit, MathError, SeriesScaler};
use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::config::ModelKind;
use crate::error::FitError;

/// Fewest training rows a model is fitted on
const MIN_TRAINING_ROWS: usize = 2;

impl ModelKind {
    /// Fit a fresh model of this kind on `(x, y)`
    pub fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<LinearFit, MathError> {
        match *self {
            ModelKind::Linear => fit_least_squares(x, y),
            ModelKind::Ridge { alpha } => fit_ridge(x, y, alpha),
        }
    }
}

/// Trained noise model for a single pixel
#[derive(Debug, Clone)]
pub struct PixelPredictor {
    x_scaler: ColumnScaler,
    y_scaler: SeriesScaler,
    fit: LinearFit,
    augmented: bool,
}

impl PixelPredictor {
    /// Train on the rows of `x` and `y`
    ///
    /// # Arguments
    /// * `model` - Regression model to fit
    /// * `x` - Design matrix `(n_rows, k)`
    /// * `y` - Targets `(n_rows,)`
    /// * `augmented` - Whether the last column of `x` is the signal regressor
    pub fn fit(
        model: ModelKind,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        augmented: bool,
    ) -> Result<Self, FitError> {
        if x.nrows() < MIN_TRAINING_ROWS {
            return Err(FitError::TooFewSamples {
                needed: MIN_TRAINING_ROWS,
                got: x.nrows(),
            });
        }
        if augmented && x.ncols() == 0 {
            return Err(FitError::Math(MathError::DimensionMismatch {
                expected: 1,
                got: 0,
            }));
        }

        let x_scaler = ColumnScaler::fit(x)?;
        let y_scaler = SeriesScaler::fit(y)?;
        let x_std = x_scaler.transform(x)?;
        let y_std = y_scaler.transform(y);

        let fit = model.fit(x_std.view(), y_std.view())?;

        Ok(Self {
            x_scaler,
            y_scaler,
            fit,
            augmented,
        })
    }

    /// Predict the pixel's brightness for every row of `x`
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, FitError> {
        let x_std = self.x_scaler.transform(x)?;
        let y_std = self.fit.predict(x_std.view())?;
        Ok(self.y_scaler.inverse_transform(y_std.view()))
    }

    /// Predict without the contribution of the signal regressor
    ///
    /// The regressor's mean over the training rows stays in the intercept.
    /// Identical to [`predict`](Self::predict) for models trained without one.
    pub fn predict_noise(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, FitError> {
        if !self.augmented {
            return self.predict(x);
        }
        let mut noise_fit = self.fit.clone();
        let last = noise_fit.coefficients.len() - 1;
        noise_fit.coefficients[last] = 0.0;

        let x_std = self.x_scaler.transform(x)?;
        let y_std = noise_fit.predict(x_std.view())?;
        Ok(self.y_scaler.inverse_transform(y_std.view()))
    }

    /// Coefficient of the signal regressor in data units
    pub fn signal_coefficient(&self) -> Option<f64> {
        if !self.augmented {
            return None;
        }
        let beta = *self.fit.coefficients.last()?;
        let signal_scale = *self.x_scaler.scale().last()?;
        Some(beta * self.y_scaler.scale / signal_scale)
    }
}
