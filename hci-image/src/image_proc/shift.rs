//! Sub-pixel shifts, centred crop/pad and centroids.
//!
//! All functions index images as `image[[x, y]]`. Shifts use bilinear
//! interpolation with zero fill outside the input.

use ndarray::{s, Array2, ArrayView2};

/// Bilinear sample of `image` at `(x, y)` treating everything outside as zero
fn sample_zero_padded(image: ArrayView2<f64>, x: f64, y: f64) -> f64 {
    let (width, height) = image.dim();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let pixel = |i: f64, j: f64| -> f64 {
        if i < 0.0 || j < 0.0 || i >= width as f64 || j >= height as f64 {
            0.0
        } else {
            image[[i as usize, j as usize]]
        }
    };

    let mut value = 0.0;
    for (dx, wx) in [(0.0, 1.0 - fx), (1.0, fx)] {
        for (dy, wy) in [(0.0, 1.0 - fy), (1.0, fy)] {
            let w = wx * wy;
            if w > 0.0 {
                value += w * pixel(x0 + dx, y0 + dy);
            }
        }
    }
    value
}

/// Shift `image` by `offset = (dx, dy)` pixels
///
/// The output satisfies `out[[x, y]] = image(x - dx, y - dy)`, so content
/// moves towards larger indices for positive offsets.
pub fn shift_image(image: ArrayView2<f64>, offset: (f64, f64)) -> Array2<f64> {
    Array2::from_shape_fn(image.dim(), |(x, y)| {
        sample_zero_padded(image, x as f64 - offset.0, y as f64 - offset.1)
    })
}

/// Offsets for centring an axis of length `from` inside one of length `to`
///
/// Returns `(source_start, target_start, count)`.
fn axis_window(from: usize, to: usize) -> (usize, usize, usize) {
    if from >= to {
        ((from - to) / 2, 0, to)
    } else {
        (0, (to - from) / 2, from)
    }
}

/// Crop or zero-pad `image` symmetrically to `size`, keeping it centred
pub fn crop_or_pad(image: ArrayView2<f64>, size: (usize, usize)) -> Array2<f64> {
    let (sx, tx, nx) = axis_window(image.dim().0, size.0);
    let (sy, ty, ny) = axis_window(image.dim().1, size.1);

    let mut output = Array2::zeros(size);
    output
        .slice_mut(s![tx..tx + nx, ty..ty + ny])
        .assign(&image.slice(s![sx..sx + nx, sy..sy + ny]));
    output
}

/// Center of mass of `image`, `None` if the total flux is not positive
pub fn centroid(image: ArrayView2<f64>) -> Option<(f64, f64)> {
    let mut total = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;

    for ((x, y), &v) in image.indexed_iter() {
        total += v;
        sum_x += v * x as f64;
        sum_y += v * y as f64;
    }

    if total > 0.0 && total.is_finite() {
        Some((sum_x / total, sum_y / total))
    } else {
        None
    }
}
