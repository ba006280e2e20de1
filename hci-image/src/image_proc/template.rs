//! Normalized cross-correlation with wrap-around boundaries.
//!
//! Computes the same response as a padded ("pad input") template match
//! where the image is periodically extended: output pixel `(i, j)` holds
//! the Pearson correlation between the template and the image window whose
//! top-left corner lies at `(i − th/2, j − tw/2)` modulo the image size.
//!
//! The three window sums involved (cross term, window sum and window sum of
//! squares) are circular correlations and are evaluated with 2D FFTs.

use ndarray::{Array2, ArrayView2};
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::ImageError;

/// In-place 2D FFT over both axes of `data`
fn fft2(data: &mut Array2<Complex<f64>>, planner: &mut FftPlanner<f64>, inverse: bool) {
    let (rows, cols) = data.dim();
    let (row_fft, col_fft) = if inverse {
        (planner.plan_fft_inverse(cols), planner.plan_fft_inverse(rows))
    } else {
        (planner.plan_fft_forward(cols), planner.plan_fft_forward(rows))
    };

    let mut buffer = vec![Complex::new(0.0, 0.0); cols];
    for mut row in data.rows_mut() {
        buffer.iter_mut().zip(row.iter()).for_each(|(b, v)| *b = *v);
        row_fft.process(&mut buffer);
        row.iter_mut().zip(buffer.iter()).for_each(|(v, b)| *v = *b);
    }

    let mut buffer = vec![Complex::new(0.0, 0.0); rows];
    for mut col in data.columns_mut() {
        buffer.iter_mut().zip(col.iter()).for_each(|(b, v)| *b = *v);
        col_fft.process(&mut buffer);
        col.iter_mut().zip(buffer.iter()).for_each(|(v, b)| *v = *b);
    }
}

fn to_complex(values: ArrayView2<f64>) -> Array2<Complex<f64>> {
    values.mapv(|v| Complex::new(v, 0.0))
}

/// Circular cross-correlation `out[s] = Σ_r a[s + r]·k[r]` with precomputed spectrum of `a`
fn circular_correlate(
    a_spectrum: &Array2<Complex<f64>>,
    kernel: ArrayView2<f64>,
    planner: &mut FftPlanner<f64>,
) -> Array2<f64> {
    let mut k = to_complex(kernel);
    fft2(&mut k, planner, false);

    let mut product = Array2::from_shape_fn(a_spectrum.dim(), |idx| a_spectrum[idx] * k[idx].conj());
    fft2(&mut product, planner, true);

    let norm = product.len() as f64;
    product.mapv(|c| c.re / norm)
}

/// Normalized cross-correlation of `template` over `image` with wrap-around
///
/// # Arguments
/// * `image` - Image to search
/// * `template` - Template, no larger than the image along either axis
///
/// # Returns
/// * Correlation surface with the shape of `image`, values in `[-1, 1]`.
///   Windows with zero variance yield 0.
pub fn match_template_wrap(
    image: ArrayView2<f64>,
    template: ArrayView2<f64>,
) -> Result<Array2<f64>, ImageError> {
    if image.is_empty() || template.is_empty() {
        return Err(ImageError::Empty);
    }
    let (h, w) = image.dim();
    let (th, tw) = template.dim();
    if th > h || tw > w {
        return Err(ImageError::TemplateTooLarge {
            template: (th, tw),
            image: (h, w),
        });
    }

    let n = (th * tw) as f64;
    let t_mean = template.sum() / n;
    let t_ssd: f64 = template.iter().map(|v| (v - t_mean).powi(2)).sum();

    // Template and box kernel embedded in image-sized arrays
    let mut kernel = Array2::zeros((h, w));
    let mut ones = Array2::zeros((h, w));
    for ((i, j), &v) in template.indexed_iter() {
        kernel[[i, j]] = v;
        ones[[i, j]] = 1.0;
    }

    let mut planner = FftPlanner::new();
    let mut spectrum = to_complex(image);
    fft2(&mut spectrum, &mut planner, false);
    let mut spectrum_sq = to_complex(image.mapv(|v| v * v).view());
    fft2(&mut spectrum_sq, &mut planner, false);

    let xcorr = circular_correlate(&spectrum, kernel.view(), &mut planner);
    let window_sum = circular_correlate(&spectrum, ones.view(), &mut planner);
    let window_sum2 = circular_correlate(&spectrum_sq, ones.view(), &mut planner);

    let (oi, oj) = (th / 2, tw / 2);
    Ok(Array2::from_shape_fn((h, w), |(i, j)| {
        let s = ((i + h - oi) % h, (j + w - oj) % w);
        let numerator = xcorr[s] - window_sum[s] * t_mean;
        let variance = (window_sum2[s] - window_sum[s] * window_sum[s] / n).max(0.0);
        let denominator = (variance * t_ssd).sqrt();
        if denominator > f64::EPSILON {
            numerator / denominator
        } else {
            0.0
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn argmax(a: &Array2<f64>) -> (usize, usize) {
        let mut best = ((0, 0), f64::NEG_INFINITY);
        for (idx, &v) in a.indexed_iter() {
            if v > best.1 {
                best = (idx, v);
            }
        }
        best.0
    }

    /// Direct evaluation for comparison
    fn brute_force(image: &Array2<f64>, template: &Array2<f64>) -> Array2<f64> {
        let (h, w) = image.dim();
        let (th, tw) = template.dim();
        let n = (th * tw) as f64;
        let t_mean = template.sum() / n;
        Array2::from_shape_fn((h, w), |(i, j)| {
            let mut window = Vec::new();
            for u in 0..th {
                for v in 0..tw {
                    let r = (i + h - th / 2 + u) % h;
                    let c = (j + w - tw / 2 + v) % w;
                    window.push(image[[r, c]]);
                }
            }
            let w_mean = window.iter().sum::<f64>() / n;
            let mut num = 0.0;
            let mut da = 0.0;
            let mut db = 0.0;
            for (k, x) in window.iter().enumerate() {
                let t = template[[k / tw, k % tw]] - t_mean;
                num += (x - w_mean) * t;
                da += (x - w_mean).powi(2);
                db += t * t;
            }
            if (da * db).sqrt() > f64::EPSILON {
                num / (da * db).sqrt()
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_peak_at_template_center() {
        let template = array![[0.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 0.0]];
        let mut image = Array2::zeros((12, 10));
        for ((i, j), v) in template.indexed_iter() {
            image[[4 + i, 6 + j]] = *v;
        }
        let response = match_template_wrap(image.view(), template.view()).unwrap();
        assert_eq!(argmax(&response), (5, 7));
        assert_relative_eq!(response[[5, 7]], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_matches_brute_force_across_wrap() {
        let image = Array2::from_shape_fn((9, 8), |(i, j)| ((i * 7 + j * 3) % 5) as f64 + 0.1 * i as f64);
        let template = array![[1.0, 0.0, 2.0, 0.5], [0.0, 3.0, 1.0, 0.0]];
        let fast = match_template_wrap(image.view(), template.view()).unwrap();
        let slow = brute_force(&image, &template);
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rejects_large_template() {
        let image = Array2::<f64>::zeros((4, 4));
        let template = Array2::<f64>::zeros((5, 2));
        assert!(matches!(
            match_template_wrap(image.view(), template.view()),
            Err(ImageError::TemplateTooLarge { .. })
        ));
    }
}
