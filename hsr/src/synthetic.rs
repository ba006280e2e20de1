//! Synthetic observations for tests, demos and benchmarks.
//!
//! All generators are deterministic for a given seed.

use hci_math::{frame_center, rotate_position};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::forward_model::{planet_trajectory, stamp_psf};
use crate::types::Position;

/// `n` parallactic angles evenly spaced from `start` to `end` degrees
pub fn linear_parang(n: usize, start: f64, end: f64) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Peak-normalized circular Gaussian with the given FWHM, centred in the frame
pub fn gaussian_psf_template(size: (usize, usize), fwhm: f64) -> Array2<f64> {
    let sigma = fwhm / (2.0 * (2.0 * std::f64::consts::LN_2).sqrt());
    let center = frame_center(size);
    Array2::from_shape_fn(size, |(x, y)| {
        let r2 = (x as f64 - center.0).powi(2) + (y as f64 - center.1).powi(2);
        (-r2 / (2.0 * sigma * sigma)).exp()
    })
}

/// Stack containing only a planet that is at `position` at frame `peak_time`
///
/// The planet follows the same rotation convention as the forward model
/// and the consistency checks.
pub fn planet_stack(
    frame_size: (usize, usize),
    parang: &[f64],
    position: (f64, f64),
    peak_time: usize,
    psf: ArrayView2<f64>,
    amplitude: f64,
) -> Array3<f64> {
    let center = frame_center(frame_size);
    let mut stack = Array3::zeros((parang.len(), frame_size.0, frame_size.1));
    let (Some(&first), Some(&at_peak)) = (parang.first(), parang.get(peak_time)) else {
        return stack;
    };

    let start = rotate_position(position, center, -(at_peak - first));
    let trajectory = planet_trajectory(start, center, parang);
    for (frame, &planet) in stack.axis_iter_mut(Axis(0)).zip(&trajectory) {
        stamp_psf(frame, psf, planet, amplitude);
    }
    stack
}

/// Gaussian white noise of shape `(n_frames, width, height)`
pub fn noise_stack(shape: (usize, usize, usize), sigma: f64, seed: u64) -> Array3<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    match Normal::new(0.0, sigma) {
        Ok(normal) => Array3::from_shape_fn(shape, |_| normal.sample(&mut rng)),
        Err(_) => Array3::zeros(shape),
    }
}

/// Random predictor matrices, reproducible per position
///
/// Stands in for a real source provider when the stack is pure noise.
#[derive(Debug, Clone, Copy)]
pub struct RandomSources {
    pub n_components: usize,
    pub seed: u64,
}

impl RandomSources {
    pub fn sources_for(&self, n_frames: usize, position: Position) -> Array2<f64> {
        let seed = self
            .seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(((position.x as u64) << 32) | position.y as u64);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((n_frames, self.n_components), |_| {
            let value: f64 = StandardNormal.sample(&mut rng);
            value
        })
    }
}

impl crate::sources::SourceProvider for RandomSources {
    fn sources(
        &self,
        stack: ArrayView3<f64>,
        position: Position,
    ) -> Result<Array2<f64>, crate::error::FitError> {
        Ok(self.sources_for(stack.dim().0, position))
    }
}
