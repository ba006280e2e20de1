//! Planar geometry relative to the frame center.
//!
//! Coordinates are `(x, y)` pairs that index arrays as `frame[[x, y]]`.
//! Angles passed to [`rotate_position`] are in degrees (parallactic angles),
//! angles returned by [`polar_angle`] are in radians.

/// Center of a frame with the given `(width, height)`, in pixel coordinates.
///
/// For odd sizes this is the central pixel; for even sizes it lies between
/// the four central pixels.
pub fn frame_center(frame_size: (usize, usize)) -> (f64, f64) {
    (
        (frame_size.0 as f64 - 1.0) / 2.0,
        (frame_size.1 as f64 - 1.0) / 2.0,
    )
}

/// Rotate `position` counter-clockwise about `center` by `angle_deg` degrees
pub fn rotate_position(position: (f64, f64), center: (f64, f64), angle_deg: f64) -> (f64, f64) {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let dx = position.0 - center.0;
    let dy = position.1 - center.1;
    (
        center.0 + dx * cos - dy * sin,
        center.1 + dx * sin + dy * cos,
    )
}

/// Separation of `position` from `center`
pub fn separation(position: (f64, f64), center: (f64, f64)) -> f64 {
    (position.0 - center.0).hypot(position.1 - center.1)
}

/// Polar angle of `position` about `center` in `(-π, π]`
pub fn polar_angle(position: (f64, f64), center: (f64, f64)) -> f64 {
    (position.1 - center.1).atan2(position.0 - center.0)
}
