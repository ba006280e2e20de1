//! Forward models of a planet moving through the field.
//!
//! A planet that sits at `position` in the first frame moves on a circle
//! around the star as the field rotates: in frame `t` it is at `position`
//! rotated by `parang[t] − parang[0]` degrees about the frame center.

use hci_math::{bilinear, frame_center, rotate_position};
use ndarray::{Array2, Array3, ArrayView2, ArrayViewMut2, Axis};

use crate::error::GeometryError;
use crate::psf::crop_psf_template;
use crate::types::Position;

/// Pixels whose peak trace value reaches this fraction of the global peak
/// belong to the collection region
const COLLECTION_THRESHOLD: f64 = 0.2;

/// Expected planet signal for one starting position
#[derive(Debug, Clone)]
pub struct SignalTrace {
    /// Planet flux per frame, `(n_frames, width, height)`
    pub stack: Array3<f64>,
    /// Pixels the planet sweeps over
    pub collection_region: Array2<bool>,
}

/// Source of forward-modelled planet traces
pub trait ForwardModel: Sync {
    /// Trace of a planet starting at `position` in the first frame
    fn signal_trace(
        &self,
        position: Position,
        frame_size: (usize, usize),
        parang: &[f64],
    ) -> Result<SignalTrace, GeometryError>;
}

/// Planet position in every frame for a planet at `start` in the first frame
pub fn planet_trajectory(start: (f64, f64), center: (f64, f64), parang: &[f64]) -> Vec<(f64, f64)> {
    let Some(&first) = parang.first() else {
        return Vec::new();
    };
    parang
        .iter()
        .map(|&angle| rotate_position(start, center, angle - first))
        .collect()
}

/// Add `amplitude × psf` centred on `position` to `frame`
///
/// The PSF is sampled bilinearly, so sub-pixel positions are supported.
pub fn stamp_psf(mut frame: ArrayViewMut2<f64>, psf: ArrayView2<f64>, position: (f64, f64), amplitude: f64) {
    let (pw, ph) = psf.dim();
    if pw == 0 || ph == 0 {
        return;
    }
    let psf_center = frame_center((pw, ph));
    let (w, h) = frame.dim();

    let x_lo = (position.0 - psf_center.0).floor() as isize;
    let x_hi = (position.0 + psf_center.0).ceil() as isize;
    let y_lo = (position.1 - psf_center.1).floor() as isize;
    let y_hi = (position.1 + psf_center.1).ceil() as isize;

    for x in x_lo.max(0)..=x_hi.min(w as isize - 1) {
        for y in y_lo.max(0)..=y_hi.min(h as isize - 1) {
            let (x, y) = (x as usize, y as usize);
            let u = psf_center.0 + x as f64 - position.0;
            let v = psf_center.1 + y as f64 - position.1;
            if let Some(value) = bilinear(psf, u, v) {
                frame[[x, y]] += amplitude * value;
            }
        }
    }
}

/// Forward model that moves a cropped PSF template along the trajectory
#[derive(Debug, Clone)]
pub struct PsfForwardModel {
    psf: Array2<f64>,
}

impl PsfForwardModel {
    /// Model using `template` cropped to `radius`
    pub fn new(template: ArrayView2<f64>, radius: f64) -> Self {
        Self {
            psf: crop_psf_template(template, radius),
        }
    }

    pub fn psf(&self) -> ArrayView2<'_, f64> {
        self.psf.view()
    }
}

impl ForwardModel for PsfForwardModel {
    fn signal_trace(
        &self,
        position: Position,
        frame_size: (usize, usize),
        parang: &[f64],
    ) -> Result<SignalTrace, GeometryError> {
        let (w, h) = frame_size;
        if position.x >= w || position.y >= h {
            return Err(GeometryError::OutsideFrame {
                x: position.x as f64,
                y: position.y as f64,
            });
        }

        let center = frame_center(frame_size);
        let trajectory = planet_trajectory(position.as_f64(), center, parang);

        let mut stack = Array3::zeros((parang.len(), w, h));
        for (mut frame, &planet) in stack.axis_iter_mut(Axis(0)).zip(&trajectory) {
            stamp_psf(frame.view_mut(), self.psf.view(), planet, 1.0);
        }

        let peak_per_pixel = stack.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &v| acc.max(v));
        let global_peak = peak_per_pixel.iter().copied().fold(0.0, f64::max);
        let collection_region = if global_peak > 0.0 {
            peak_per_pixel.mapv(|v| v >= COLLECTION_THRESHOLD * global_peak)
        } else {
            Array2::from_elem(frame_size, false)
        };

        Ok(SignalTrace {
            stack,
            collection_region,
        })
    }
}
