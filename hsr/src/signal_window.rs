//! Analytic estimate of how long a planet contaminates a pixel.
//!
//! A planet at separation `r` moves along a circle as the field rotates. It
//! contaminates a pixel while the chord between its position and the pixel
//! is shorter than the pixel's effective width plus the PSF diameter. The
//! chord is converted to an angle with the law of cosines and the angle to
//! frame indices by searching the parallactic angles.

use std::f64::consts::FRAC_PI_2;

use hci_math::{frame_center, monotonic_direction, searchsorted, separation, Direction, Side};

use crate::error::GeometryError;
use crate::types::SignalWindow;

/// Empirical safety margin applied to both window halves
const WINDOW_MARGIN: f64 = 1.2;

/// Length of the path of a planet crossing the center of a pixel
///
/// Between 1 (axis-aligned traversal) and √2 (diagonal traversal),
/// depending on the polar angle of the pixel.
pub fn effective_pixel_width(position: (f64, f64), center: (f64, f64)) -> f64 {
    let phi = (position.0 - center.0)
        .atan2(position.1 - center.1)
        .rem_euclid(FRAC_PI_2);
    (1.0 / phi.cos()).min(1.0 / phi.sin())
}

/// Window lengths for parallactic angles with a known sort direction
fn window_for_direction(
    position: (f64, f64),
    signal_time: usize,
    center: (f64, f64),
    parang: &[f64],
    direction: Direction,
    psf_diameter: f64,
) -> Result<SignalWindow, GeometryError> {
    let n_frames = parang.len();
    if signal_time >= n_frames {
        return Err(GeometryError::OutsideObservation {
            time: signal_time,
            n_frames,
        });
    }

    let radius = separation(position, center);
    let chord = effective_pixel_width(position, center) + psf_diameter;

    // Close to the star the pixel never leaves the PSF
    if chord > 2.0 * radius {
        return Ok(SignalWindow::always(n_frames));
    }

    let gamma = (1.0 - chord * chord / (2.0 * radius * radius))
        .acos()
        .to_degrees();
    let lower = parang[signal_time] - gamma / 2.0;
    let upper = parang[signal_time] + gamma / 2.0;

    let (start, end) = match direction {
        Direction::Ascending => (
            searchsorted(parang, lower, Side::Left),
            searchsorted(parang, upper, Side::Right),
        ),
        Direction::Descending => {
            let negated: Vec<f64> = parang.iter().map(|p| -p).collect();
            (
                searchsorted(&negated, -upper, Side::Right),
                searchsorted(&negated, -lower, Side::Left),
            )
        }
    };

    let before = (WINDOW_MARGIN * signal_time.saturating_sub(start) as f64) as usize;
    let after = (WINDOW_MARGIN * end.saturating_sub(signal_time) as f64) as usize;
    Ok(SignalWindow { before, after })
}

/// Signal window for a planet peaking at `position` at frame `signal_time`
///
/// # Arguments
/// * `position` - Pixel coordinates, need not be integer
/// * `signal_time` - Frame index of the signal peak
/// * `center` - Frame center (position of the star)
/// * `parang` - Parallactic angles in degrees, monotonic
/// * `psf_diameter` - PSF core diameter in pixels
///
/// # Errors
/// * `GeometryError::NotMonotonic` - `parang` is neither ascending nor descending
/// * `GeometryError::OutsideObservation` - `signal_time` is not a frame index
pub fn signal_window(
    position: (f64, f64),
    signal_time: usize,
    center: (f64, f64),
    parang: &[f64],
    psf_diameter: f64,
) -> Result<SignalWindow, GeometryError> {
    let direction = monotonic_direction(parang)?;
    window_for_direction(position, signal_time, center, parang, direction, psf_diameter)
}

/// Signal-window estimator for one observation
///
/// Validates the parallactic angles once at construction so that per-pixel
/// queries only fail for positions or times outside the data.
#[derive(Debug, Clone)]
pub struct SignalWindowEstimator {
    parang: Vec<f64>,
    direction: Direction,
    frame_size: (usize, usize),
    center: (f64, f64),
    psf_diameter: f64,
}

impl SignalWindowEstimator {
    pub fn new(
        parang: &[f64],
        frame_size: (usize, usize),
        psf_diameter: f64,
    ) -> Result<Self, GeometryError> {
        let direction = monotonic_direction(parang)?;
        Ok(Self {
            parang: parang.to_vec(),
            direction,
            frame_size,
            center: frame_center(frame_size),
            psf_diameter,
        })
    }

    pub fn n_frames(&self) -> usize {
        self.parang.len()
    }

    pub fn parang(&self) -> &[f64] {
        &self.parang
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    pub fn frame_size(&self) -> (usize, usize) {
        self.frame_size
    }

    pub fn psf_diameter(&self) -> f64 {
        self.psf_diameter
    }

    /// Total field rotation over the observation in degrees
    pub fn field_rotation(&self) -> f64 {
        match (self.parang.first(), self.parang.last()) {
            (Some(first), Some(last)) => (last - first).abs(),
            _ => 0.0,
        }
    }

    /// Signal window at `position` for a peak at `signal_time`
    ///
    /// # Errors
    /// * `GeometryError::OutsideFrame` - `position` lies outside the frame
    /// * `GeometryError::OutsideObservation` - `signal_time` is not a frame index
    pub fn window(&self, position: (f64, f64), signal_time: usize) -> Result<SignalWindow, GeometryError> {
        let (x, y) = position;
        let inside = x >= 0.0
            && y >= 0.0
            && x <= (self.frame_size.0 as f64 - 1.0)
            && y <= (self.frame_size.1 as f64 - 1.0);
        if !inside {
            return Err(GeometryError::OutsideFrame { x, y });
        }

        window_for_direction(
            position,
            signal_time,
            self.center,
            &self.parang,
            self.direction,
            self.psf_diameter,
        )
    }
}
