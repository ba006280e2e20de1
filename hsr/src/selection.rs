//! Choice of the most plausible signal-masking hypothesis for a pixel.
//!
//! A planet passing a pixel leaves a rise-then-fall "bump" in the residuals
//! of a model that was not allowed to learn it. Among the hypotheses whose
//! residuals show a bump inside their signal window, the one with the
//! largest mean residual in that window wins.

use hci_math::{fit_slope, mean};
use ndarray::ArrayView1;

use crate::trainer::HypothesisFit;

/// Slope of a segment, or `default` if it is too short to fit
fn segment_slope(residuals: ArrayView1<f64>, range: std::ops::Range<usize>, default: f64) -> f64 {
    if range.len() <= 2 {
        return default;
    }
    let xs: Vec<f64> = range.clone().map(|i| i as f64).collect();
    let ys: Vec<f64> = range.map(|i| residuals[i]).collect();
    fit_slope(&xs, &ys)
}

/// Whether `residuals` rise before `signal_time` and fall after it
///
/// The signal window runs from the first to the last set entry of
/// `signal_mask`; the last entry itself is not part of the falling segment.
/// Segments with two or fewer points count as rising (before) or falling
/// (after).
pub fn has_bump(residuals: ArrayView1<f64>, signal_mask: &[bool], signal_time: usize) -> bool {
    let start = match signal_mask.iter().position(|&m| m) {
        Some(start) => start,
        None => return false,
    };
    let end = signal_mask.iter().rposition(|&m| m).unwrap_or(start);
    let end = end.min(residuals.len());

    let before = start..signal_time.max(start).min(end);
    let after = signal_time.min(end)..end;

    let slope_before = segment_slope(residuals, before, 1.0);
    let slope_after = segment_slope(residuals, after, -1.0);

    slope_before > 0.0 && slope_after < 0.0
}

/// Mean of `values` where `mask` is set (`want = true`) or unset (`want = false`)
pub fn masked_mean(values: ArrayView1<f64>, mask: &[bool], want: bool) -> f64 {
    let selected: Vec<f64> = values
        .iter()
        .zip(mask)
        .filter(|(_, &m)| m == want)
        .map(|(&v, _)| v)
        .collect();
    mean(&selected)
}

/// Index of the best hypothesis, `None` if no hypothesis shows a bump
///
/// Ties keep the earliest hypothesis; NaN means never win.
pub fn select_best(hypotheses: &[HypothesisFit]) -> Option<usize> {
    let mut best = None;
    let mut best_mean = f64::NEG_INFINITY;

    for (index, candidate) in hypotheses.iter().enumerate() {
        let residuals = candidate.fit.residuals.view();
        let mask = &candidate.hypothesis.signal_mask;
        let signal_mean = masked_mean(residuals, mask, true);

        if signal_mean > best_mean && has_bump(residuals, mask, candidate.hypothesis.signal_time) {
            best_mean = signal_mean;
            best = Some(index);
        }
    }

    best
}
