//! Search helpers for monotonic sequences.
//!
//! Parallactic angles are sorted either ascending or descending; the window
//! estimator needs insertion-point search on both.

use crate::error::MathError;

/// Relative tolerance when comparing a sequence with its sorted copy
const MONOTONIC_RTOL: f64 = 1e-5;

/// Absolute tolerance when comparing a sequence with its sorted copy
const MONOTONIC_ATOL: f64 = 1e-8;

/// Sort direction of a monotonic sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Which insertion point `searchsorted` reports for ties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// First index `i` with `values[i] >= target`
    Left,
    /// First index `i` with `values[i] > target`
    Right,
}

/// `|a - b| <= atol + rtol * |b|`
fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= MONOTONIC_ATOL + MONOTONIC_RTOL * b.abs()
}

/// Determine the sort direction of `values`.
///
/// A sequence counts as sorted if every element is close to the element at
/// the same index of its sorted copy, within a relative tolerance of 1e-5
/// plus an absolute tolerance of 1e-8. Repeated values and jitter well
/// below the step size are allowed. Constant and single-element sequences
/// are reported as ascending.
///
/// # Errors
/// * `MathError::NotMonotonic` - neither ascending nor descending
/// * `MathError::NonFinite` - contains NaN or infinite values
pub fn monotonic_direction(values: &[f64]) -> Result<Direction, MathError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(MathError::NonFinite);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    if values.iter().zip(&sorted).all(|(&v, &s)| is_close(v, s)) {
        return Ok(Direction::Ascending);
    }
    if values.iter().zip(sorted.iter().rev()).all(|(&v, &s)| is_close(v, s)) {
        return Ok(Direction::Descending);
    }

    Err(MathError::NotMonotonic)
}

/// Insertion index of `target` into ascending `values`
pub fn searchsorted(values: &[f64], target: f64, side: Side) -> usize {
    match side {
        Side::Left => values.partition_point(|v| *v < target),
        Side::Right => values.partition_point(|v| *v <= target),
    }
}

/// `n` evenly spaced values from `start` to `end` (inclusive), truncated to integers
pub fn linspace_indices(start: usize, end: usize, n: usize) -> Vec<usize> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end as f64 - start as f64) / (n - 1) as f64;
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        end
                    } else {
                        (start as f64 + step * i as f64) as usize
                    }
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_direction() {
        assert_eq!(
            monotonic_direction(&[1.0, 2.0, 2.0, 3.0]),
            Ok(Direction::Ascending)
        );
        assert_eq!(
            monotonic_direction(&[3.0, 1.0, -4.0]),
            Ok(Direction::Descending)
        );
        assert_eq!(
            monotonic_direction(&[1.0, 3.0, 2.0]),
            Err(MathError::NotMonotonic)
        );
        assert_eq!(
            monotonic_direction(&[1.0, f64::NAN]),
            Err(MathError::NonFinite)
        );
    }

    #[test]
    fn test_monotonic_tolerance_scales_with_magnitude() {
        // Jitter of 5e-3 at 1000 is within the relative tolerance
        assert_eq!(
            monotonic_direction(&[1000.0, 999.995, 1001.0]),
            Ok(Direction::Ascending)
        );
        assert_eq!(
            monotonic_direction(&[270.0, 270.001, 269.0, 268.0]),
            Ok(Direction::Descending)
        );
        // Near zero only the absolute tolerance applies
        assert_eq!(
            monotonic_direction(&[0.0, -1e-7, 1.0]),
            Err(MathError::NotMonotonic)
        );
        assert_eq!(
            monotonic_direction(&[0.0, -1e-9, 1.0]),
            Ok(Direction::Ascending)
        );
    }

    #[test]
    fn test_searchsorted_sides() {
        let values = [0.0, 1.0, 1.0, 2.0, 5.0];
        assert_eq!(searchsorted(&values, 1.0, Side::Left), 1);
        assert_eq!(searchsorted(&values, 1.0, Side::Right), 3);
        assert_eq!(searchsorted(&values, -3.0, Side::Left), 0);
        assert_eq!(searchsorted(&values, 9.0, Side::Right), 5);
        assert_eq!(searchsorted(&values, 1.5, Side::Left), 3);
    }

    #[test]
    fn test_linspace_indices() {
        assert_eq!(linspace_indices(0, 99, 5), vec![0, 24, 49, 74, 99]);
        assert_eq!(linspace_indices(0, 99, 21)[10], 49);
        assert_eq!(linspace_indices(0, 10, 1), vec![0]);
        assert!(linspace_indices(0, 10, 0).is_empty());
    }
}
