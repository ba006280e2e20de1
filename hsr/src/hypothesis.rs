//! Signal-masking hypotheses.
//!
//! A hypothesis claims that a planet passes a pixel at a given frame. Frames
//! inside its signal window are excluded when the noise model is trained.

use hci_math::linspace_indices;

use crate::error::GeometryError;
use crate::signal_window::SignalWindowEstimator;
use crate::types::{Position, SignalWindow};

/// Planet-passage hypothesis for one pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Frame index at which the signal peaks
    pub signal_time: usize,
    pub window: SignalWindow,
    /// Frames that may contain planet signal, one entry per frame
    pub signal_mask: Vec<bool>,
}

impl Hypothesis {
    pub fn new(signal_time: usize, window: SignalWindow, n_frames: usize) -> Self {
        Self {
            signal_time,
            window,
            signal_mask: window.mask(signal_time, n_frames),
        }
    }

    /// Complement of the signal mask
    pub fn noise_mask(&self) -> Vec<bool> {
        self.signal_mask.iter().map(|m| !m).collect()
    }

    pub fn n_frames(&self) -> usize {
        self.signal_mask.len()
    }

    /// Unclipped window length relative to the observation length
    pub fn masked_fraction(&self) -> f64 {
        self.window.length() as f64 / self.n_frames().max(1) as f64
    }
}

/// Candidate signal times spread evenly over `n_frames`
pub fn candidate_signal_times(n_frames: usize, n_signal_times: usize) -> Vec<usize> {
    if n_frames == 0 {
        return Vec::new();
    }
    let mut times = linspace_indices(0, n_frames - 1, n_signal_times);
    times.dedup();
    times
}

/// Hypotheses for `position`, one per signal time, in increasing time order
///
/// Hypotheses whose window covers more than `max_signal_length` of the
/// observation are left out: too few clean frames would remain to train on.
///
/// # Errors
/// Any [`GeometryError`] from the window estimate; the pixel is then skipped.
pub fn generate_hypotheses(
    estimator: &SignalWindowEstimator,
    position: Position,
    signal_times: &[usize],
    max_signal_length: f64,
) -> Result<Vec<Hypothesis>, GeometryError> {
    let n_frames = estimator.n_frames();
    let mut hypotheses = Vec::with_capacity(signal_times.len());

    for &signal_time in signal_times {
        let window = estimator.window(position.as_f64(), signal_time)?;
        let hypothesis = Hypothesis::new(signal_time, window, n_frames);
        if hypothesis.masked_fraction() > max_signal_length {
            log::trace!(
                "Skipping signal time {} at {}: window covers {:.2} of the observation",
                signal_time,
                position,
                hypothesis.masked_fraction()
            );
            continue;
        }
        hypotheses.push(hypothesis);
    }

    Ok(hypotheses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> SignalWindowEstimator {
        let parang: Vec<f64> = (0..100).map(|i| i as f64).collect();
        SignalWindowEstimator::new(&parang, (31, 31), 3.0).unwrap()
    }

    #[test]
    fn test_candidate_times_cover_observation() {
        let times = candidate_signal_times(100, 21);
        assert_eq!(times.len(), 21);
        assert_eq!(times[0], 0);
        assert_eq!(times[10], 49);
        assert_eq!(*times.last().unwrap(), 99);

        // More candidates than frames collapses duplicates
        assert_eq!(candidate_signal_times(3, 10), vec![0, 1, 2]);
        assert!(candidate_signal_times(0, 5).is_empty());
    }

    #[test]
    fn test_masks_are_complementary() {
        let estimator = estimator();
        let times = candidate_signal_times(100, 21);
        let hypotheses = generate_hypotheses(&estimator, Position::new(10, 10), &times, 0.7).unwrap();

        assert!(!hypotheses.is_empty());
        for hypothesis in &hypotheses {
            assert_eq!(hypothesis.signal_mask.len(), 100);
            let noise = hypothesis.noise_mask();
            assert!(hypothesis
                .signal_mask
                .iter()
                .zip(&noise)
                .all(|(s, n)| *s != *n));
            assert!(hypothesis.signal_mask[hypothesis.signal_time]);
        }
        assert!(hypotheses.windows(2).all(|w| w[0].signal_time < w[1].signal_time));
    }

    #[test]
    fn test_long_windows_are_skipped() {
        let estimator = estimator();
        let times = candidate_signal_times(100, 5);

        // Close to the star every window covers the whole observation
        let near = generate_hypotheses(&estimator, Position::new(15, 16), &times, 0.7).unwrap();
        assert!(near.is_empty());

        let far = generate_hypotheses(&estimator, Position::new(10, 10), &times, 0.7).unwrap();
        assert_eq!(far.len(), 5);
    }

    #[test]
    fn test_geometry_errors_propagate() {
        let estimator = estimator();
        let result = generate_hypotheses(&estimator, Position::new(40, 10), &[10], 0.7);
        assert!(matches!(result, Err(GeometryError::OutsideFrame { .. })));
    }
}
