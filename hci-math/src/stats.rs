//! Basic statistics over slices of `f64`.
//!
//! `mean` and `std_dev` propagate NaN (the caller decides what a NaN window
//! means), while `median` skips NaN values.

/// Arithmetic mean, NaN for empty input
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation, NaN for empty input
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Median of the non-NaN values, `None` if there are none.
///
/// For even-length data the two middle values are averaged.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return None;
    }

    valid.sort_by(|a, b| a.total_cmp(b));

    let mid = valid.len() / 2;
    if valid.len() % 2 == 0 {
        Some(0.5 * (valid[mid - 1] + valid[mid]))
    } else {
        Some(valid[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values), 5.0);
        assert_relative_eq!(std_dev(&values), 2.0);
        assert!(mean(&[]).is_nan());
        assert!(std_dev(&[1.0, f64::NAN]).is_nan());
    }

    #[test]
    fn test_median_skips_nan() {
        assert_eq!(median(&[3.0, f64::NAN, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN]), None);
        assert_eq!(median(&[]), None);
    }
}
