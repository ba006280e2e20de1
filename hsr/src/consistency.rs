//! Spatio-temporal consistency of a pixel's best hypothesis.
//!
//! A real planet that passes pixel `p` at frame `t` also passes the pixels
//! along its circular trajectory at other frames. The checker rotates `p`
//! back to the first frame, follows the trajectory to a few evenly spaced
//! test frames and asks whether the residuals trained for the nearest
//! candidate signal time show a bump there too. The match fraction is the
//! share of tests that agree.

use hci_math::{bilinear_series, linspace_indices, rotate_position};
use ndarray::{Array2, Array3, ArrayView1, ArrayView3};
use rayon::prelude::*;

use crate::config::{ConsistencyConfig, UnresolvedPolicy};
use crate::selection::{has_bump, masked_mean};
use crate::signal_window::SignalWindowEstimator;
use crate::trainer::PixelResult;

/// Residual stacks, one per candidate signal time
///
/// Field `k` holds at every ROI pixel the residuals of that pixel's
/// hypothesis for `signal_times[k]`; pixels that skipped the time or lie
/// outside the ROI are NaN.
#[derive(Debug, Clone)]
pub struct ResidualFields {
    signal_times: Vec<usize>,
    fields: Vec<Array3<f64>>,
}

impl ResidualFields {
    /// Collect residual fields of shape `(n_frames, width, height)`
    pub fn from_results<'a>(
        results: impl IntoIterator<Item = &'a PixelResult>,
        signal_times: &[usize],
        shape: (usize, usize, usize),
    ) -> Self {
        let mut fields: Vec<Array3<f64>> = signal_times
            .iter()
            .map(|_| Array3::from_elem(shape, f64::NAN))
            .collect();

        for result in results {
            let (x, y) = (result.position.x, result.position.y);
            if x >= shape.1 || y >= shape.2 {
                continue;
            }
            for candidate in &result.hypotheses {
                let Some(k) = signal_times
                    .iter()
                    .position(|&t| t == candidate.hypothesis.signal_time)
                else {
                    continue;
                };
                if candidate.fit.residuals.len() == shape.0 {
                    fields[k]
                        .slice_mut(ndarray::s![.., x, y])
                        .assign(&candidate.fit.residuals);
                }
            }
        }

        Self {
            signal_times: signal_times.to_vec(),
            fields,
        }
    }

    pub fn signal_times(&self) -> &[usize] {
        &self.signal_times
    }

    pub fn field(&self, index: usize) -> Option<ArrayView3<'_, f64>> {
        self.fields.get(index).map(|f| f.view())
    }

    /// Field for the candidate signal time closest to `time`
    ///
    /// Ties go to the earlier candidate.
    pub fn closest(&self, time: usize) -> Option<(usize, ArrayView3<'_, f64>)> {
        let index = self
            .signal_times
            .iter()
            .enumerate()
            .min_by_key(|(_, &t)| t.abs_diff(time))
            .map(|(i, _)| i)?;
        Some((self.signal_times[index], self.fields[index].view()))
    }
}

/// A point on a hypothetical planet trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestPoint {
    /// Real-valued pixel coordinates
    pub position: (f64, f64),
    pub time: usize,
}

/// Result of a single consistency test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Match,
    Mismatch,
    /// Residuals or window could not be evaluated at the test point
    Unresolved,
}

/// Compares a pixel's best hypothesis with the residuals along its trajectory
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyChecker<'a> {
    estimator: &'a SignalWindowEstimator,
    fields: &'a ResidualFields,
    n_test_positions: usize,
    unresolved: UnresolvedPolicy,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new(
        estimator: &'a SignalWindowEstimator,
        fields: &'a ResidualFields,
        config: &ConsistencyConfig,
    ) -> Self {
        Self {
            estimator,
            fields,
            n_test_positions: config.n_test_positions,
            unresolved: config.unresolved,
        }
    }

    /// Trajectory points of a planet seen at `position` at frame `signal_time`
    pub fn test_points(&self, position: (f64, f64), signal_time: usize) -> Vec<TestPoint> {
        let parang = self.estimator.parang();
        let (Some(&first), Some(&at_signal)) = (parang.first(), parang.get(signal_time)) else {
            return Vec::new();
        };
        let center = self.estimator.center();
        let start = rotate_position(position, center, -(at_signal - first));

        linspace_indices(0, parang.len() - 1, self.n_test_positions)
            .into_iter()
            .map(|time| TestPoint {
                position: rotate_position(start, center, parang[time] - first),
                time,
            })
            .collect()
    }

    /// Evaluate a single test point
    pub fn run_test(&self, point: TestPoint) -> TestOutcome {
        let Ok(window) = self.estimator.window(point.position, point.time) else {
            return TestOutcome::Unresolved;
        };
        let Some((_, field)) = self.fields.closest(point.time) else {
            return TestOutcome::Unresolved;
        };
        let Some(series) = bilinear_series(field, point.position.0, point.position.1) else {
            return TestOutcome::Unresolved;
        };
        if series.iter().any(|v| v.is_nan()) {
            return TestOutcome::Unresolved;
        }

        let mask = window.mask(point.time, self.estimator.n_frames());
        if is_signal_like(series.view(), &mask, point.time) {
            TestOutcome::Match
        } else {
            TestOutcome::Mismatch
        }
    }

    /// Share of consistency tests passed by the pixel's best hypothesis
    ///
    /// Zero for pixels without a best hypothesis or without any resolved
    /// test.
    pub fn match_fraction(&self, result: &PixelResult) -> f64 {
        let Some(best) = result.best_hypothesis() else {
            return 0.0;
        };

        let outcomes: Vec<TestOutcome> = self
            .test_points(result.position.as_f64(), best.hypothesis.signal_time)
            .into_iter()
            .map(|point| self.run_test(point))
            .collect();

        let matches = outcomes.iter().filter(|o| **o == TestOutcome::Match).count();
        let counted = match self.unresolved {
            UnresolvedPolicy::Skip => outcomes
                .iter()
                .filter(|o| **o != TestOutcome::Unresolved)
                .count(),
            UnresolvedPolicy::Fail => outcomes.len(),
        };

        if counted == 0 {
            0.0
        } else {
            matches as f64 / counted as f64
        }
    }

    /// Match fraction of every pixel in `results`, zero elsewhere
    pub fn match_fraction_map(&self, results: &[PixelResult], frame_size: (usize, usize)) -> Array2<f64> {
        let fractions: Vec<(usize, usize, f64)> = results
            .par_iter()
            .map(|result| (result.position.x, result.position.y, self.match_fraction(result)))
            .collect();

        let mut map = Array2::zeros(frame_size);
        for (x, y, fraction) in fractions {
            if let Some(entry) = map.get_mut((x, y)) {
                *entry = fraction;
            }
        }
        map
    }
}

/// Bump inside the window and a higher mean inside it than outside
fn is_signal_like(series: ArrayView1<f64>, mask: &[bool], time: usize) -> bool {
    has_bump(series, mask, time) && masked_mean(series, mask, true) > masked_mean(series, mask, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::Hypothesis;
    use crate::trainer::{HypothesisFit, TrainedFit};
    use crate::types::{Position, SignalWindow};
    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn estimator() -> SignalWindowEstimator {
        let parang: Vec<f64> = (0..100).map(|i| i as f64).collect();
        SignalWindowEstimator::new(&parang, (31, 31), 3.0).unwrap()
    }

    fn pixel(position: Position, hypotheses: Vec<(usize, Array1<f64>)>, best: Option<usize>) -> PixelResult {
        let hypotheses = hypotheses
            .into_iter()
            .map(|(signal_time, residuals)| HypothesisFit {
                hypothesis: Hypothesis::new(signal_time, SignalWindow { before: 10, after: 10 }, 100),
                fit: TrainedFit {
                    predictions: Array1::zeros(100),
                    residuals,
                    signal_coefficient: None,
                },
            })
            .collect();
        PixelResult {
            position,
            baseline: TrainedFit::nan(100),
            hypotheses,
            best,
        }
    }

    #[test]
    fn test_closest_signal_time() {
        let results = vec![pixel(Position::new(3, 4), vec![(0, Array1::ones(100))], None)];
        let fields = ResidualFields::from_results(&results, &[0, 10, 20], (100, 31, 31));

        assert_eq!(fields.closest(4).map(|(t, _)| t), Some(0));
        assert_eq!(fields.closest(5).map(|(t, _)| t), Some(0));
        assert_eq!(fields.closest(16).map(|(t, _)| t), Some(20));
        assert_eq!(fields.closest(99).map(|(t, _)| t), Some(20));

        let field = fields.field(0).unwrap();
        assert_relative_eq!(field[[7, 3, 4]], 1.0);
        assert!(field[[7, 4, 4]].is_nan());
        assert!(fields.field(1).unwrap()[[7, 3, 4]].is_nan());
    }

    #[test]
    fn test_points_follow_rotation() {
        let estimator = estimator();
        let fields = ResidualFields::from_results(&Vec::<PixelResult>::new(), &[0], (100, 31, 31));
        let checker = ConsistencyChecker::new(&estimator, &fields, &ConsistencyConfig::default());

        let points = checker.test_points((10.0, 10.0), 49);
        let times: Vec<usize> = points.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0, 24, 49, 74, 99]);

        // The test at the signal time is the pixel itself
        assert_relative_eq!(points[2].position.0, 10.0, epsilon = 1e-9);
        assert_relative_eq!(points[2].position.1, 10.0, epsilon = 1e-9);

        // All points share the separation of the pixel
        let center = estimator.center();
        for point in &points {
            let r = hci_math::separation(point.position, center);
            assert_relative_eq!(r, 50f64.sqrt(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_no_best_hypothesis_means_zero() {
        let estimator = estimator();
        let fields = ResidualFields::from_results(&Vec::<PixelResult>::new(), &[0], (100, 31, 31));
        let checker = ConsistencyChecker::new(&estimator, &fields, &ConsistencyConfig::default());

        let result = pixel(Position::new(10, 10), vec![], None);
        assert_eq!(checker.match_fraction(&result), 0.0);
    }

    #[test]
    fn test_unresolved_policy() {
        let estimator = estimator();
        let bump = Array1::from_shape_fn(100, |t| (-((t as f64 - 49.0) / 5.0).powi(2)).exp());
        let result = pixel(Position::new(10, 10), vec![(49, bump)], Some(0));

        // Only the pixel itself has residuals; every other test is NaN
        let fields = ResidualFields::from_results(std::slice::from_ref(&result), &[0, 24, 49, 74, 99], (100, 31, 31));

        let skip = ConsistencyChecker::new(&estimator, &fields, &ConsistencyConfig::default());
        assert_eq!(
            skip.run_test(TestPoint { position: (10.0, 10.0), time: 49 }),
            TestOutcome::Match
        );
        assert_relative_eq!(skip.match_fraction(&result), 1.0);

        let fail_config = ConsistencyConfig {
            unresolved: UnresolvedPolicy::Fail,
            ..Default::default()
        };
        let fail = ConsistencyChecker::new(&estimator, &fields, &fail_config);
        assert_relative_eq!(fail.match_fraction(&result), 0.2);

        assert_eq!(
            skip.run_test(TestPoint { position: (40.0, 2.0), time: 49 }),
            TestOutcome::Unresolved
        );
    }

    #[test]
    fn test_flat_residuals_do_not_match() {
        let estimator = estimator();
        let flat = pixel(Position::new(10, 10), vec![(49, Array1::zeros(100))], Some(0));
        let fields = ResidualFields::from_results(std::slice::from_ref(&flat), &[49], (100, 31, 31));
        let checker = ConsistencyChecker::new(&estimator, &fields, &ConsistencyConfig::default());

        assert_eq!(
            checker.run_test(TestPoint { position: (10.0, 10.0), time: 49 }),
            TestOutcome::Mismatch
        );

        let map = checker.match_fraction_map(std::slice::from_ref(&flat), (31, 31));
        assert_eq!(map.dim(), (31, 31));
        assert_eq!(map[[10, 10]], 0.0);
    }
}
