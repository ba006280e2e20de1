//! Region of interest: the annulus of pixels for which models are trained.

use hci_math::{frame_center, separation};
use ndarray::{Array2, ArrayView2};

use crate::config::RoiConfig;
use crate::types::Position;

/// Pixels whose distance to the frame center lies in `[inner, outer]`
///
/// `outer = None` puts no upper limit on the distance.
pub fn roi_mask(frame_size: (usize, usize), inner: f64, outer: Option<f64>) -> Array2<bool> {
    let center = frame_center(frame_size);
    let outer = outer.unwrap_or(f64::INFINITY);
    Array2::from_shape_fn(frame_size, |(x, y)| {
        let r = separation((x as f64, y as f64), center);
        r >= inner && r <= outer
    })
}

/// ROI mask for a configuration
pub fn roi_mask_from_config(frame_size: (usize, usize), config: &RoiConfig) -> Array2<bool> {
    roi_mask(
        frame_size,
        config.inner_exclusion_radius,
        config.outer_exclusion_radius,
    )
}

/// Positions of the set entries of `mask`, in row-major order
pub fn positions_from_mask(mask: ArrayView2<bool>) -> Vec<Position> {
    mask.indexed_iter()
        .filter(|(_, &inside)| inside)
        .map(|((x, y), _)| Position::new(x, y))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annulus() {
        let mask = roi_mask((11, 11), 2.0, Some(4.0));
        assert!(!mask[[5, 5]]);
        assert!(mask[[5, 7]]);
        assert!(mask[[5, 9]]);
        assert!(!mask[[5, 10]]);
        assert!(!mask[[0, 0]]);

        let unbounded = roi_mask((11, 11), 0.0, None);
        assert!(unbounded.iter().all(|&m| m));
    }

    #[test]
    fn test_positions_are_row_major() {
        let mask = roi_mask((7, 7), 1.0, Some(1.0));
        let positions = positions_from_mask(mask.view());
        assert_eq!(
            positions,
            vec![
                Position::new(2, 3),
                Position::new(3, 2),
                Position::new(3, 4),
                Position::new(4, 3)
            ]
        );
    }
}
