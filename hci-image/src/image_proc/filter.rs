//! Separable Gaussian filtering
//!
//! This module provides Gaussian smoothing and the scale-normalizable
//! Laplacian of Gaussian used by blob detection. Both are implemented as
//! separable 1D correlations along each axis, with kernels truncated at
//! four standard deviations.

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::ImageError;

/// Kernels are truncated at this many standard deviations
const TRUNCATE: f64 = 4.0;

/// How samples beyond the image border are synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMode {
    /// Repeat the edge pixel (`a a | a b c | c c`)
    Nearest,
    /// Mirror about the pixel edge (`b a | a b c | c b`)
    Reflect,
}

impl BoundaryMode {
    /// Map a possibly out-of-range index onto `0..len`
    fn resolve(self, index: isize, len: usize) -> usize {
        let n = len as isize;
        match self {
            BoundaryMode::Nearest => index.clamp(0, n - 1) as usize,
            BoundaryMode::Reflect => {
                let period = 2 * n;
                let m = index.rem_euclid(period);
                if m >= n {
                    (period - m - 1) as usize
                } else {
                    m as usize
                }
            }
        }
    }
}

fn kernel_radius(sigma: f64) -> usize {
    (TRUNCATE * sigma + 0.5) as usize
}

/// Normalized 1D Gaussian kernel of radius `⌊4σ + 0.5⌋`
pub fn gaussian_kernel_1d(sigma: f64) -> Vec<f64> {
    let radius = kernel_radius(sigma) as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Second derivative of the normalized 1D Gaussian kernel
fn gaussian_second_derivative_1d(sigma: f64) -> Vec<f64> {
    let radius = kernel_radius(sigma) as isize;
    let var = sigma * sigma;
    let base = gaussian_kernel_1d(sigma);
    (-radius..=radius)
        .zip(base)
        .map(|(x, phi)| phi * ((x * x) as f64 - var) / (var * var))
        .collect()
}

/// Correlate every lane of `image` along `axis` with a symmetric `kernel`
fn correlate_axis(
    image: ArrayView2<f64>,
    kernel: &[f64],
    axis: Axis,
    mode: BoundaryMode,
) -> Array2<f64> {
    let radius = (kernel.len() / 2) as isize;
    let mut output = Array2::zeros(image.dim());

    for (lane_in, mut lane_out) in image
        .lanes(axis)
        .into_iter()
        .zip(output.lanes_mut(axis))
    {
        let len = lane_in.len();
        for i in 0..len {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let idx = mode.resolve(i as isize + k as isize - radius, len);
                acc += w * lane_in[idx];
            }
            lane_out[i] = acc;
        }
    }

    output
}

fn check_sigma(image: ArrayView2<f64>, sigma: f64) -> Result<(), ImageError> {
    if image.is_empty() {
        return Err(ImageError::Empty);
    }
    if !(sigma > 0.0 && sigma.is_finite()) {
        return Err(ImageError::InvalidParameter(format!(
            "sigma must be positive, got {sigma}"
        )));
    }
    Ok(())
}

/// Gaussian blur with standard deviation `sigma` (pixels)
///
/// # Arguments
/// * `image` - Input image
/// * `sigma` - Standard deviation of the Gaussian in pixels
/// * `mode` - Boundary handling
///
/// # Returns
/// * Smoothed image of the same shape
pub fn gaussian_blur(
    image: ArrayView2<f64>,
    sigma: f64,
    mode: BoundaryMode,
) -> Result<Array2<f64>, ImageError> {
    check_sigma(image, sigma)?;
    let kernel = gaussian_kernel_1d(sigma);
    let rows = correlate_axis(image, &kernel, Axis(0), mode);
    Ok(correlate_axis(rows.view(), &kernel, Axis(1), mode))
}

/// Laplacian of the Gaussian-smoothed image
///
/// Computed as `∂²G/∂x² * I + ∂²G/∂y² * I` with separable kernels. Bright
/// blobs produce negative responses; multiply by `-σ²` for a
/// scale-normalized detector.
pub fn gaussian_laplace(
    image: ArrayView2<f64>,
    sigma: f64,
    mode: BoundaryMode,
) -> Result<Array2<f64>, ImageError> {
    check_sigma(image, sigma)?;
    let smooth = gaussian_kernel_1d(sigma);
    let second = gaussian_second_derivative_1d(sigma);

    let d_xx = correlate_axis(
        correlate_axis(image, &second, Axis(0), mode).view(),
        &smooth,
        Axis(1),
        mode,
    );
    let d_yy = correlate_axis(
        correlate_axis(image, &smooth, Axis(0), mode).view(),
        &second,
        Axis(1),
        mode,
    );

    Ok(d_xx + d_yy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_gaussian_kernel_normalized() {
        let kernel = gaussian_kernel_1d(1.0);
        assert_eq!(kernel.len(), 9);
        assert_relative_eq!(kernel.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(kernel[4] > kernel[3]);
        assert_relative_eq!(kernel[3], kernel[5]);
    }

    #[test]
    fn test_boundary_resolve() {
        assert_eq!(BoundaryMode::Nearest.resolve(-3, 4), 0);
        assert_eq!(BoundaryMode::Nearest.resolve(7, 4), 3);
        assert_eq!(BoundaryMode::Reflect.resolve(-1, 4), 0);
        assert_eq!(BoundaryMode::Reflect.resolve(-2, 4), 1);
        assert_eq!(BoundaryMode::Reflect.resolve(4, 4), 3);
        assert_eq!(BoundaryMode::Reflect.resolve(9, 4), 1);
    }

    #[test]
    fn test_blur_preserves_constant_and_flux() {
        let flat = Array2::from_elem((8, 6), 3.0);
        let blurred = gaussian_blur(flat.view(), 1.5, BoundaryMode::Nearest).unwrap();
        for v in blurred.iter() {
            assert_relative_eq!(*v, 3.0, epsilon = 1e-12);
        }

        let mut point = Array2::zeros((21, 21));
        point[[10, 10]] = 1.0;
        let blurred = gaussian_blur(point.view(), 1.0, BoundaryMode::Reflect).unwrap();
        assert_relative_eq!(blurred.sum(), 1.0, epsilon = 1e-12);
        assert!(blurred[[10, 10]] > blurred[[10, 11]]);
        assert_relative_eq!(blurred[[9, 10]], blurred[[10, 11]], epsilon = 1e-15);
    }

    #[test]
    fn test_laplace_negative_at_bright_spot() {
        let mut point = Array2::zeros((31, 31));
        point[[15, 15]] = 1.0;
        let log = gaussian_laplace(point.view(), 2.0, BoundaryMode::Reflect).unwrap();
        assert!(log[[15, 15]] < 0.0);
        // Flat images have (almost) no curvature; truncation leaves a small bias
        let flat = Array2::from_elem((10, 10), 5.0);
        let log = gaussian_laplace(flat.view(), 1.0, BoundaryMode::Reflect).unwrap();
        assert!(log.iter().all(|v| v.abs() < 0.05));
    }

    #[test]
    fn test_rejects_bad_sigma() {
        let image = Array2::<f64>::zeros((4, 4));
        assert!(matches!(
            gaussian_blur(image.view(), 0.0, BoundaryMode::Nearest),
            Err(ImageError::InvalidParameter(_))
        ));
        let empty = Array2::<f64>::zeros((0, 4));
        assert_eq!(
            gaussian_blur(empty.view(), 1.0, BoundaryMode::Nearest),
            Err(ImageError::Empty)
        );
    }
}
