//! Assembly of per-pixel time series into `(time, x, y)` stacks.

use ndarray::{Array3, ArrayView1, ArrayView2};

use crate::trainer::PixelResult;

/// Stack with the series chosen by `pick` at every pixel, NaN elsewhere
///
/// Pixels for which `pick` returns `None`, or a series of the wrong length,
/// stay NaN.
pub fn assemble_stack<'a, F>(results: &'a [PixelResult], shape: (usize, usize, usize), pick: F) -> Array3<f64>
where
    F: Fn(&'a PixelResult) -> Option<ArrayView1<'a, f64>>,
{
    let (n_frames, width, height) = shape;
    let mut stack = Array3::from_elem(shape, f64::NAN);

    for result in results {
        let (x, y) = (result.position.x, result.position.y);
        if x >= width || y >= height {
            continue;
        }
        if let Some(series) = pick(result).filter(|s| s.len() == n_frames) {
            stack.slice_mut(ndarray::s![.., x, y]).assign(&series);
        }
    }
    stack
}

/// Final residual stack
///
/// Every pixel starts from its baseline residuals; where `selection_mask` is
/// set and the pixel has a best hypothesis, that hypothesis' residuals are
/// used instead.
pub fn assemble_residual_stack(
    results: &[PixelResult],
    selection_mask: ArrayView2<bool>,
    n_frames: usize,
) -> Array3<f64> {
    let (width, height) = selection_mask.dim();
    assemble_stack(results, (n_frames, width, height), |result| {
        let selected = selection_mask
            .get((result.position.x, result.position.y))
            .copied()
            .unwrap_or(false);
        match result.best_hypothesis() {
            Some(best) if selected => Some(best.fit.residuals.view()),
            _ => Some(result.baseline.residuals.view()),
        }
    })
}
