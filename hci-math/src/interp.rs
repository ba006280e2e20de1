//! Bilinear interpolation on regular pixel grids.
//!
//! Corners that receive zero weight are never read, so sampling exactly on
//! a pixel next to a NaN pixel still returns the pixel value. Any NaN among
//! the contributing corners makes the sample NaN.

use ndarray::{Array1, ArrayView2, ArrayView3, Axis};

/// Lower grid index and fractional offset for `coord` on an axis of length `len`.
///
/// Returns `None` outside `[0, len - 1]`.
fn locate(coord: f64, len: usize) -> Option<(usize, f64)> {
    if len == 0 || !coord.is_finite() || coord < 0.0 || coord > (len - 1) as f64 {
        return None;
    }
    let lower = (coord.floor() as usize).min(len.saturating_sub(2));
    Some((lower, coord - lower as f64))
}

/// Corner indices and weights for a bilinear sample at `(x, y)`
fn corners(x: f64, y: f64, dim: (usize, usize)) -> Option<Vec<((usize, usize), f64)>> {
    let (x0, fx) = locate(x, dim.0)?;
    let (y0, fy) = locate(y, dim.1)?;

    let weights = [
        ((x0, y0), (1.0 - fx) * (1.0 - fy)),
        ((x0 + 1, y0), fx * (1.0 - fy)),
        ((x0, y0 + 1), (1.0 - fx) * fy),
        ((x0 + 1, y0 + 1), fx * fy),
    ];

    Some(
        weights
            .into_iter()
            .filter(|&(_, w)| w > 0.0)
            .collect(),
    )
}

/// Bilinearly interpolate `frame` at `(x, y)`; `None` outside the frame
pub fn bilinear(frame: ArrayView2<f64>, x: f64, y: f64) -> Option<f64> {
    let contributions = corners(x, y, frame.dim())?;
    if contributions.is_empty() {
        // Only possible for single-pixel axes hit exactly
        return frame.get((x as usize, y as usize)).copied();
    }
    Some(
        contributions
            .iter()
            .map(|&((i, j), w)| w * frame[[i, j]])
            .sum(),
    )
}

/// Sample a `(time, x, y)` stack at spatial position `(x, y)` for every frame.
///
/// The interpolation is bilinear in space and exact in time. Returns `None`
/// if the position lies outside the frame.
pub fn bilinear_series(stack: ArrayView3<f64>, x: f64, y: f64) -> Option<Array1<f64>> {
    let (n_frames, width, height) = stack.dim();
    let contributions = corners(x, y, (width, height))?;

    let mut series = Array1::zeros(n_frames);
    for ((i, j), w) in contributions {
        let pixel = stack.index_axis(Axis(1), i);
        series.scaled_add(w, &pixel.index_axis(Axis(1), j));
    }
    Some(series)
}
