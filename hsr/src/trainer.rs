//! Cross-validated training of per-pixel noise models under signal masking.
//!
//! For one pixel the trainer fits a baseline model on all frames and one
//! model per [`Hypothesis`], each with the hypothesis' signal window removed
//! from the training rows. Every model is cross-validated: a fold's
//! predictions come from a model that never saw the fold's frames.

use hci_math::std_dev;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::config::{HsrConfig, ModelKind};
use crate::error::FitError;
use crate::hypothesis::{generate_hypotheses, Hypothesis};
use crate::predictor::PixelPredictor;
use crate::selection::select_best;
use crate::signal_window::SignalWindowEstimator;
use crate::splitting::TrainTestSplitter;
use crate::types::Position;

/// Training residuals this many times tighter than held-out ones flag overfitting
const OVERFIT_RATIO: f64 = 3.0;

/// Cross-validated predictions of one model configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedFit {
    pub predictions: Array1<f64>,
    /// Observed minus predicted
    pub residuals: Array1<f64>,
    /// Signal coefficient averaged over the folds, for augmented models
    pub signal_coefficient: Option<f64>,
}

impl TrainedFit {
    /// Placeholder for a fit that failed
    pub fn nan(n_frames: usize) -> Self {
        Self {
            predictions: Array1::from_elem(n_frames, f64::NAN),
            residuals: Array1::from_elem(n_frames, f64::NAN),
            signal_coefficient: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.residuals.iter().all(|r| r.is_finite())
    }
}

/// A hypothesis together with the model trained under it
#[derive(Debug, Clone, PartialEq)]
pub struct HypothesisFit {
    pub hypothesis: Hypothesis,
    pub fit: TrainedFit,
}

/// Everything trained for one pixel
#[derive(Debug, Clone, PartialEq)]
pub struct PixelResult {
    pub position: Position,
    /// Fit without any signal masking
    pub baseline: TrainedFit,
    /// One fit per retained hypothesis, in increasing signal time
    pub hypotheses: Vec<HypothesisFit>,
    /// Index into `hypotheses` of the most plausible signal, if any
    pub best: Option<usize>,
}

impl PixelResult {
    /// Result for a pixel whose training failed entirely
    pub fn failed(position: Position, n_frames: usize) -> Self {
        Self {
            position,
            baseline: TrainedFit::nan(n_frames),
            hypotheses: Vec::new(),
            best: None,
        }
    }

    pub fn best_hypothesis(&self) -> Option<&HypothesisFit> {
        self.best.and_then(|i| self.hypotheses.get(i))
    }

    /// Fit of the hypothesis with exactly this signal time
    pub fn fit_for_signal_time(&self, signal_time: usize) -> Option<&HypothesisFit> {
        self.hypotheses
            .iter()
            .find(|h| h.hypothesis.signal_time == signal_time)
    }
}

/// Trains baseline and signal-masked models for individual pixels
#[derive(Debug, Clone)]
pub struct MaskedTrainer {
    model: ModelKind,
    splitter: TrainTestSplitter,
    estimator: SignalWindowEstimator,
    signal_times: Vec<usize>,
    max_signal_length: f64,
}

impl MaskedTrainer {
    pub fn new(
        model: ModelKind,
        splitter: TrainTestSplitter,
        estimator: SignalWindowEstimator,
        signal_times: Vec<usize>,
        max_signal_length: f64,
    ) -> Self {
        Self {
            model,
            splitter,
            estimator,
            signal_times,
            max_signal_length,
        }
    }

    pub fn from_config(
        config: &HsrConfig,
        estimator: SignalWindowEstimator,
        signal_times: Vec<usize>,
    ) -> Self {
        Self::new(
            config.model,
            TrainTestSplitter::from_config(&config.signal_masking),
            estimator,
            signal_times,
            config.signal_masking.max_signal_length,
        )
    }

    pub fn signal_times(&self) -> &[usize] {
        &self.signal_times
    }

    pub fn estimator(&self) -> &SignalWindowEstimator {
        &self.estimator
    }

    /// Cross-validated fit, optionally excluding `signal_mask` from training
    ///
    /// # Arguments
    /// * `targets` - Pixel time series `(n_frames,)`
    /// * `predictors` - Design matrix `(n_frames, k)`
    /// * `signal_mask` - Frames never used for training
    /// * `augmented` - Whether the last predictor column is a signal regressor
    pub fn fit(
        &self,
        targets: ArrayView1<f64>,
        predictors: ArrayView2<f64>,
        signal_mask: Option<&[bool]>,
        augmented: bool,
    ) -> Result<TrainedFit, FitError> {
        let n_frames = targets.len();
        if predictors.nrows() != n_frames {
            return Err(FitError::Math(hci_math::MathError::DimensionMismatch {
                expected: n_frames,
                got: predictors.nrows(),
            }));
        }
        let masked = |row: usize| signal_mask.is_some_and(|mask| mask[row]);

        let mut predictions = Array1::from_elem(n_frames, f64::NAN);
        let mut coefficients = Vec::new();

        for split in self.splitter.split(n_frames) {
            let train_rows: Vec<usize> = split.train.iter().copied().filter(|&r| !masked(r)).collect();

            let x_train = predictors.select(Axis(0), &train_rows);
            let y_train = targets.select(Axis(0), &train_rows);
            let predictor = PixelPredictor::fit(self.model, x_train.view(), y_train.view(), augmented)?;
            let all_predictions = predictor.predict(predictors)?;

            for &row in &split.apply {
                predictions[row] = all_predictions[row];
            }
            if let Some(coefficient) = predictor.signal_coefficient() {
                coefficients.push(coefficient);
            }

            if signal_mask.is_some() {
                check_overfitting(targets, all_predictions.view(), &train_rows, &split.apply, &masked);
            }
        }

        let residuals = &targets - &predictions;
        let signal_coefficient =
            (!coefficients.is_empty()).then(|| coefficients.iter().sum::<f64>() / coefficients.len() as f64);

        Ok(TrainedFit {
            predictions,
            residuals,
            signal_coefficient,
        })
    }

    /// Fit without signal masking
    pub fn train_baseline(
        &self,
        targets: ArrayView1<f64>,
        predictors: ArrayView2<f64>,
    ) -> Result<TrainedFit, FitError> {
        self.fit(targets, predictors, None, false)
    }

    /// Fit with the hypothesis' signal window excluded from training
    pub fn train_hypothesis(
        &self,
        targets: ArrayView1<f64>,
        predictors: ArrayView2<f64>,
        hypothesis: &Hypothesis,
    ) -> Result<TrainedFit, FitError> {
        self.fit(targets, predictors, Some(&hypothesis.signal_mask), false)
    }

    /// Train baseline and every hypothesis for one pixel and pick the best
    ///
    /// Never fails: geometry errors leave the pixel without hypotheses and
    /// fit errors are replaced by NaN fits.
    pub fn train_pixel(
        &self,
        position: Position,
        targets: ArrayView1<f64>,
        predictors: ArrayView2<f64>,
    ) -> PixelResult {
        let n_frames = targets.len();

        let baseline = self.train_baseline(targets, predictors).unwrap_or_else(|err| {
            log::warn!("Baseline fit failed at {position}: {err}");
            TrainedFit::nan(n_frames)
        });

        let hypotheses = match generate_hypotheses(
            &self.estimator,
            position,
            &self.signal_times,
            self.max_signal_length,
        ) {
            Ok(hypotheses) => hypotheses,
            Err(err) => {
                log::warn!("Skipping signal masking at {position}: {err}");
                return PixelResult {
                    position,
                    baseline,
                    hypotheses: Vec::new(),
                    best: None,
                };
            }
        };

        let hypotheses: Vec<HypothesisFit> = hypotheses
            .into_iter()
            .map(|hypothesis| {
                let fit = self
                    .train_hypothesis(targets, predictors, &hypothesis)
                    .unwrap_or_else(|err| {
                        log::debug!(
                            "Fit for signal time {} failed at {position}: {err}",
                            hypothesis.signal_time
                        );
                        TrainedFit::nan(n_frames)
                    });
                HypothesisFit { hypothesis, fit }
            })
            .collect();

        let best = select_best(&hypotheses);
        log::debug!(
            "{position}: {} hypotheses, best signal time {:?}",
            hypotheses.len(),
            best.map(|i| hypotheses[i].hypothesis.signal_time)
        );

        PixelResult {
            position,
            baseline,
            hypotheses,
            best,
        }
    }
}

/// Warn when training residuals are much tighter than held-out ones
fn check_overfitting(
    targets: ArrayView1<f64>,
    predictions: ArrayView1<f64>,
    train_rows: &[usize],
    apply_rows: &[usize],
    masked: &dyn Fn(usize) -> bool,
) {
    let residual = |row: &usize| targets[*row] - predictions[*row];
    let train: Vec<f64> = train_rows.iter().map(residual).collect();
    let held_out: Vec<f64> = apply_rows
        .iter()
        .filter(|&&row| !masked(row))
        .map(residual)
        .collect();

    let (train_std, held_out_std) = (std_dev(&train), std_dev(&held_out));
    if OVERFIT_RATIO * train_std < held_out_std {
        log::warn!(
            "Possible overfitting: training residual std {train_std:.3e} vs held-out {held_out_std:.3e}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitKind;
    use crate::hypothesis::candidate_signal_times;
    use crate::types::SignalWindow;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn trainer(model: ModelKind, n_splits: usize) -> MaskedTrainer {
        let parang: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let estimator = SignalWindowEstimator::new(&parang, (31, 31), 3.0).unwrap();
        MaskedTrainer::new(
            model,
            TrainTestSplitter::new(n_splits, SplitKind::EvenOdd),
            estimator,
            candidate_signal_times(100, 21),
            0.7,
        )
    }

    fn bump(n: usize, peak: usize, width: f64, amplitude: f64) -> Array1<f64> {
        Array1::from_shape_fn(n, |t| amplitude * (-((t as f64 - peak as f64) / width).powi(2)).exp())
    }

    #[test]
    fn test_baseline_on_linear_data_is_exact() {
        let trainer = trainer(ModelKind::Linear, 2);
        let source = Array1::from_shape_fn(100, |t| (t as f64 * 0.2).sin());
        let predictors = source.clone().insert_axis(Axis(1));
        let targets = &source * 3.0 - 1.0;

        let fit = trainer.train_baseline(targets.view(), predictors.view()).unwrap();
        assert!(fit.is_valid());
        for r in fit.residuals.iter() {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_masking_keeps_signal_in_residuals() {
        let trainer = trainer(ModelKind::Linear, 2);
        let targets = bump(100, 50, 6.0, 5.0);
        let predictors = Array2::<f64>::zeros((100, 1));

        let hypothesis = Hypothesis::new(50, SignalWindow { before: 21, after: 22 }, 100);
        let masked = trainer
            .train_hypothesis(targets.view(), predictors.view(), &hypothesis)
            .unwrap();
        let baseline = trainer.train_baseline(targets.view(), predictors.view()).unwrap();

        // The masked model only learns the flat background
        assert!(masked.residuals[50] > 4.9);
        assert!(masked.residuals[50] > baseline.residuals[50]);
        assert_relative_eq!(masked.residuals[0], 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_train_pixel_picks_planet_time() {
        let trainer = trainer(ModelKind::Linear, 2);
        let targets = bump(100, 50, 8.0, 10.0);
        let predictors = Array2::<f64>::zeros((100, 1));

        let result = trainer.train_pixel(Position::new(10, 10), targets.view(), predictors.view());
        assert_eq!(result.hypotheses.len(), 21);
        let best = result.best_hypothesis().unwrap();
        assert_eq!(best.hypothesis.signal_time, 49);
        assert!(result.fit_for_signal_time(49).is_some());
        assert!(result.fit_for_signal_time(50).is_none());
    }

    #[test]
    fn test_failures_become_nan() {
        let trainer = trainer(ModelKind::Linear, 2);
        let mut targets = bump(100, 50, 8.0, 10.0);
        targets[3] = f64::NAN;
        let predictors = Array2::<f64>::zeros((100, 1));

        let result = trainer.train_pixel(Position::new(10, 10), targets.view(), predictors.view());
        assert!(!result.baseline.is_valid());
        assert!(result.baseline.predictions.iter().all(|p| p.is_nan()));
        assert!(result.best.is_none());

        let outside = trainer.train_pixel(Position::new(40, 40), bump(100, 50, 8.0, 1.0).view(), predictors.view());
        assert!(outside.hypotheses.is_empty());
        assert!(outside.baseline.is_valid());
    }

    #[test]
    fn test_augmented_fit_reports_coefficient() {
        let trainer = trainer(ModelKind::Linear, 1);
        let noise = Array1::from_shape_fn(100, |t| (t as f64 * 0.31).cos());
        let signal = bump(100, 40, 10.0, 1.0);
        let predictors = ndarray::stack(Axis(1), &[noise.view(), signal.view()]).unwrap();
        let targets = &noise + &signal * 2.5;

        let fit = trainer
            .fit(targets.view(), predictors.view(), None, true)
            .unwrap();
        assert_relative_eq!(fit.signal_coefficient.unwrap(), 2.5, epsilon = 1e-8);
    }
}
