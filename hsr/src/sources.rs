//! Predictor ("source") time series for per-pixel noise models.
//!
//! Half-sibling regression predicts a pixel from pixels that share its
//! systematic noise but cannot contain the same planet signal. The default
//! [`PcaSourceProvider`] takes a ring of pixels around the target, together
//! with the ring mirrored through the star, and compresses their time
//! series into a few principal components.

use std::borrow::Cow;
use std::collections::HashMap;

use hci_math::{frame_center, separation};
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView3};
use once_cell::sync::OnceCell;

use crate::config::SourcesConfig;
use crate::error::FitError;
use crate::types::Position;

/// Maximum number of SVD sweeps
const SVD_MAX_ITERATIONS: usize = 1000;

/// Provides the predictor matrix `(n_frames, k)` for a pixel
pub trait SourceProvider: Sync {
    fn sources(&self, stack: ArrayView3<f64>, position: Position) -> Result<Array2<f64>, FitError>;
}

impl<F> SourceProvider for F
where
    F: Fn(ArrayView3<f64>, Position) -> Array2<f64> + Sync,
{
    fn sources(&self, stack: ArrayView3<f64>, position: Position) -> Result<Array2<f64>, FitError> {
        Ok(self(stack, position))
    }
}

/// Principal components of the pixels around and opposite a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcaSourceProvider {
    config: SourcesConfig,
}

impl PcaSourceProvider {
    pub fn new(config: SourcesConfig) -> Self {
        Self { config }
    }

    /// Predictor pixels for `position` in a frame of `frame_size`
    ///
    /// Pixels at a distance in `[exclusion_radius, exclusion_radius +
    /// annulus_width]` from the target or from its mirror image through the
    /// star, excluding anything within `exclusion_radius` of the target.
    pub fn predictor_pixels(&self, position: Position, frame_size: (usize, usize)) -> Vec<Position> {
        let center = frame_center(frame_size);
        let target = position.as_f64();
        let mirrored = (2.0 * center.0 - target.0, 2.0 * center.1 - target.1);
        let inner = self.config.exclusion_radius;
        let outer = inner + self.config.annulus_width;

        let in_ring = |p: (f64, f64), around: (f64, f64)| {
            let d = separation(p, around);
            d >= inner && d <= outer
        };

        let mut pixels = Vec::new();
        for x in 0..frame_size.0 {
            for y in 0..frame_size.1 {
                let p = (x as f64, y as f64);
                if separation(p, target) < inner {
                    continue;
                }
                if in_ring(p, target) || in_ring(p, mirrored) {
                    pixels.push(Position::new(x, y));
                }
            }
        }
        pixels
    }
}

impl SourceProvider for PcaSourceProvider {
    fn sources(&self, stack: ArrayView3<f64>, position: Position) -> Result<Array2<f64>, FitError> {
        let (n_frames, width, height) = stack.dim();
        let pixels = self.predictor_pixels(position, (width, height));
        if pixels.is_empty() || n_frames == 0 {
            return Err(FitError::TooFewSamples {
                needed: 1,
                got: pixels.len().min(n_frames),
            });
        }

        let mut data = DMatrix::from_fn(n_frames, pixels.len(), |t, j| {
            stack[[t, pixels[j].x, pixels[j].y]]
        });
        if data.iter().any(|v| !v.is_finite()) {
            return Err(FitError::Math(hci_math::MathError::NonFinite));
        }
        for mut column in data.column_iter_mut() {
            let mean = column.mean();
            column.add_scalar_mut(-mean);
        }

        let svd = data
            .try_svd(true, false, f64::EPSILON, SVD_MAX_ITERATIONS)
            .ok_or_else(|| hci_math::MathError::SolveFailed("SVD did not converge".to_string()))?;
        let u = svd
            .u
            .ok_or_else(|| hci_math::MathError::SolveFailed("SVD without U".to_string()))?;

        // nalgebra does not sort singular values
        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));
        let k = self.config.n_components.min(order.len());

        Ok(Array2::from_shape_fn((n_frames, k), |(t, c)| {
            let index = order[c];
            u[(t, index)] * svd.singular_values[index].powf(self.config.sv_power)
        }))
    }
}

/// Sources memoized per position
///
/// The key set is fixed at construction, so entries can be filled from many
/// threads without a global lock. Each entry is computed at most once.
pub struct SourceCache {
    entries: HashMap<Position, OnceCell<Result<Array2<f64>, FitError>>>,
}

impl SourceCache {
    pub fn new(positions: impl IntoIterator<Item = Position>) -> Self {
        Self {
            entries: positions.into_iter().map(|p| (p, OnceCell::new())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sources for `position`, computed on first use
    ///
    /// Positions outside the key set are computed without caching.
    pub fn get<'c>(
        &'c self,
        stack: ArrayView3<f64>,
        position: Position,
        provider: &dyn SourceProvider,
    ) -> Result<Cow<'c, Array2<f64>>, FitError> {
        match self.entries.get(&position) {
            Some(cell) => cell
                .get_or_init(|| provider.sources(stack, position))
                .as_ref()
                .map(Cow::Borrowed)
                .map_err(Clone::clone),
            None => provider.sources(stack, position).map(Cow::Owned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::noise_stack;
    use approx::assert_relative_eq;
    use ndarray::{Array3, Axis};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_predictor_pixels_exclude_target_neighbourhood() {
        let provider = PcaSourceProvider::new(SourcesConfig {
            n_components: 4,
            sv_power: 1.0,
            exclusion_radius: 2.0,
            annulus_width: 1.0,
        });
        let target = Position::new(10, 15);
        let pixels = provider.predictor_pixels(target, (31, 31));

        assert!(!pixels.is_empty());
        assert!(!pixels.contains(&target));
        assert!(pixels
            .iter()
            .all(|p| separation(p.as_f64(), target.as_f64()) >= 2.0));
        // Mirror image of the target lies at (20, 15)
        assert!(pixels.contains(&Position::new(22, 15)));
        assert!(!pixels.contains(&Position::new(20, 15)));
    }

    #[test]
    fn test_pca_components_are_ordered_and_uncorrelated() {
        let stack = noise_stack((60, 21, 21), 1.0, 3);
        let provider = PcaSourceProvider::new(SourcesConfig::default());
        let sources = provider.sources(stack.view(), Position::new(5, 10)).unwrap();

        assert_eq!(sources.dim(), (60, 16));
        let norms: Vec<f64> = sources
            .axis_iter(Axis(1))
            .map(|c| c.dot(&c).sqrt())
            .collect();
        assert!(norms.windows(2).all(|w| w[0] >= w[1] - 1e-9));

        let c0 = sources.column(0);
        let c1 = sources.column(1);
        assert_relative_eq!(c0.dot(&c1), 0.0, epsilon = 1e-8);
        assert_relative_eq!(c0.sum(), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_pca_rejects_nan() {
        let mut stack = Array3::zeros((10, 11, 11));
        stack.fill(f64::NAN);
        let provider = PcaSourceProvider::new(SourcesConfig::default());
        assert!(provider.sources(stack.view(), Position::new(2, 5)).is_err());
    }

    #[test]
    fn test_closures_are_providers_and_cache_computes_once() {
        let calls = AtomicUsize::new(0);
        let provider = |stack: ArrayView3<f64>, _position: Position| {
            calls.fetch_add(1, Ordering::SeqCst);
            Array2::zeros((stack.dim().0, 1))
        };

        let stack = Array3::<f64>::zeros((5, 4, 4));
        let cache = SourceCache::new([Position::new(1, 1)]);
        assert_eq!(cache.len(), 1);

        for _ in 0..3 {
            let sources = cache.get(stack.view(), Position::new(1, 1), &provider).unwrap();
            assert_eq!(sources.dim(), (5, 1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.get(stack.view(), Position::new(2, 2), &provider).unwrap();
        cache.get(stack.view(), Position::new(2, 2), &provider).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
