//! Selection mask: where to trust the signal-masked residuals.
//!
//! Thresholding the match fraction directly picks up many isolated false
//! positives. Instead the match fraction is projected to polar coordinates,
//! where a planet appears as a horizontal arc of known angular length, and
//! cross-correlated with the arc a planet would leave. Peaks of the
//! correlation are planet candidates; the mask covers the arcs of the
//! candidates, as far as the match fraction supports them.

use std::f64::consts::PI;

use hci_image::{
    blob_log, centroid, gaussian_blur, match_template_wrap, shift_image, to_polar, BlobLogParams,
    BoundaryMode,
};
use hci_math::{frame_center, median, separation, std_dev};
use ndarray::{Array2, ArrayView2, Axis};

use crate::config::SelectionConfig;
use crate::error::HsrError;
use crate::psf::normalized_psf;

/// Largest field rotation for which arcs in polar space are unambiguous
pub const MAX_FIELD_ROTATION: f64 = 180.0;

/// Number of scales searched by the blob detector
const BLOB_NUM_SIGMA: usize = 32;

/// Absolute response threshold of the blob detector
const BLOB_THRESHOLD: f64 = 0.05;

/// Blobs closer than this in separation (pixels) compete; the brighter one survives
const BLOB_PRUNE_DISTANCE: f64 = 3.0;

/// A planet candidate found in the polar correlation map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarBlob {
    /// Separation from the star in pixels
    pub rho: f64,
    /// Polar angle in `[0, 2π)`
    pub phi: f64,
    /// Correlation value at the blob center
    pub brightness: f64,
}

/// Intermediate and final products of the selection-mask construction
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub mask: Array2<bool>,
    /// Radially weighted, blurred match fraction
    pub weighted_match_fraction: Array2<f64>,
    /// Whitened polar projection of the weighted match fraction
    pub polar: Array2<f64>,
    /// Clipped correlation of `polar` with `expected_signal`
    pub matched: Array2<f64>,
    pub expected_signal: Array2<f64>,
    /// Candidates surviving pruning
    pub blobs: Vec<PolarBlob>,
}

/// `r^power`, with `r` the distance to the frame center
pub fn radial_gradient(frame_size: (usize, usize), power: f64) -> Array2<f64> {
    let center = frame_center(frame_size);
    Array2::from_shape_fn(frame_size, |(x, y)| {
        separation((x as f64, y as f64), center).powf(power)
    })
}

/// Radius of the polar grid: the largest circle inside the frame
fn polar_radius(frame_size: (usize, usize)) -> f64 {
    let center = frame_center(frame_size);
    center.0.min(center.1)
}

/// Angular offsets (radians) at which PSF copies are placed to draw an arc
fn arc_offsets(field_rotation: f64) -> Vec<f64> {
    let n = (2.0 * field_rotation.floor()).max(1.0) as usize;
    let half = (field_rotation / 2.0).to_radians();
    if n == 1 {
        return vec![0.0];
    }
    let step = 2.0 * half / (n - 1) as f64;
    (0..n).map(|i| -half + step * i as f64).collect()
}

/// Sum of PSF copies along the arc at `(rho, phi)` spanning `field_rotation` degrees
fn draw_arc(psf: ArrayView2<f64>, rho: f64, phi: f64, field_rotation: f64) -> Array2<f64> {
    let mut arc: Array2<f64> = Array2::zeros(psf.dim());
    for offset in arc_offsets(field_rotation) {
        let shift = (rho * (phi + offset).cos(), rho * (phi + offset).sin());
        arc += &shift_image(psf, shift);
    }
    arc
}

/// Polar template of the arc a planet leaves over the observation
///
/// The arc is drawn at a fixed reference position, projected to polar
/// coordinates, peak-normalized and shifted so that its centroid sits at
/// the center of the polar grid.
pub fn expected_signal(
    psf_template: ArrayView2<f64>,
    frame_size: (usize, usize),
    field_rotation: f64,
    config: &SelectionConfig,
) -> Array2<f64> {
    let center = frame_center(frame_size);
    let r_max = polar_radius(frame_size);
    let rho = r_max * config.relative_rho;
    let phi = PI * (1.0 + config.relative_phi);

    let psf = normalized_psf(psf_template, frame_size);
    let cartesian = draw_arc(psf.view(), rho, phi, field_rotation);

    let mut polar = to_polar(cartesian.view(), center, r_max, config.grid_size);
    let peak = polar.iter().copied().fold(0.0, f64::max);
    if peak > 0.0 {
        polar /= peak;
    }

    match centroid(polar.view()) {
        Some(com) => {
            let polar_center = frame_center(polar.dim());
            shift_image(polar.view(), (polar_center.0 - com.0, polar_center.1 - com.1))
        }
        None => polar,
    }
}

/// Suppress the radial background of a polar map
///
/// Each radius row is scaled by its standard deviation and its median is
/// subtracted; the whole map is then divided by its maximum.
pub fn whiten_polar(polar: &mut Array2<f64>) {
    for mut row in polar.axis_iter_mut(Axis(0)) {
        let values: Vec<f64> = row.iter().copied().collect();
        let scale = std_dev(&values);
        row.mapv_inplace(|v| v * scale);
        let scaled: Vec<f64> = row.iter().copied().collect();
        let offset = median(&scaled).unwrap_or(0.0);
        row.mapv_inplace(|v| v - offset);
    }

    let peak = polar.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if peak > 0.0 && peak.is_finite() {
        *polar /= peak;
    }
}

/// Blob candidates in a polar correlation map
///
/// The map is searched twice, the second time rolled by half a turn along
/// the angle axis, so that arcs crossing the angular seam are found too.
/// Blobs in the outer quarters of the angle axis are edge artifacts and
/// dropped.
pub fn find_polar_blobs(matched: ArrayView2<f64>, r_max: f64) -> Result<Vec<PolarBlob>, HsrError> {
    let (n_rho, n_phi) = matched.dim();
    let grid_size = n_phi as f64;
    let params = BlobLogParams {
        min_sigma: 1.0,
        max_sigma: (grid_size / 4.0).max(1.0),
        num_sigma: BLOB_NUM_SIGMA,
        threshold: BLOB_THRESHOLD,
        overlap: 0.0,
    };

    let mut blobs = Vec::new();
    for phase_offset in [0.0, PI] {
        let roll = (grid_size * phase_offset / (2.0 * PI)) as usize % n_phi.max(1);
        let rolled = Array2::from_shape_fn((n_rho, n_phi), |(i, j)| {
            matched[[i, (j + n_phi - roll) % n_phi]]
        });

        for blob in blob_log(rolled.view(), &params)? {
            let col = blob.col as f64;
            if col < grid_size / 4.0 || col > 3.0 * grid_size / 4.0 {
                continue;
            }
            blobs.push(PolarBlob {
                rho: blob.row as f64 * r_max / n_rho as f64,
                phi: (2.0 * PI * col / grid_size + phase_offset + PI).rem_euclid(2.0 * PI),
                brightness: rolled[[blob.row, blob.col]],
            });
        }
    }

    Ok(blobs)
}

/// Keep only the brightest of blobs at approximately the same separation
///
/// A blob is dropped if another blob within 3 pixels of separation is
/// strictly brighter.
pub fn prune_blobs(blobs: &[PolarBlob]) -> Vec<PolarBlob> {
    blobs
        .iter()
        .enumerate()
        .filter(|(i, candidate)| {
            !blobs.iter().enumerate().any(|(j, other)| {
                *i != j
                    && (candidate.rho - other.rho).abs() <= BLOB_PRUNE_DISTANCE
                    && other.brightness > candidate.brightness
            })
        })
        .map(|(_, blob)| *blob)
        .collect()
}

/// Binary mask of pixels whose signal-masked residuals should be used
///
/// # Arguments
/// * `match_fraction` - Match fraction per pixel, zero outside the ROI
/// * `parang` - Parallactic angles in degrees
/// * `psf_template` - Unsaturated PSF template
/// * `config` - Polar grid and thresholds
///
/// # Errors
/// * `HsrError::FieldRotationTooLarge` - arcs longer than half a turn
/// * `HsrError::Image` - invalid blur or template parameters
pub fn residual_selection_mask(
    match_fraction: ArrayView2<f64>,
    parang: &[f64],
    psf_template: ArrayView2<f64>,
    config: &SelectionConfig,
) -> Result<SelectionResult, HsrError> {
    let frame_size = match_fraction.dim();
    let field_rotation = match (parang.first(), parang.last()) {
        (Some(first), Some(last)) => (last - first).abs(),
        _ => 0.0,
    };
    if field_rotation > MAX_FIELD_ROTATION {
        return Err(HsrError::FieldRotationTooLarge(field_rotation));
    }

    let center = frame_center(frame_size);
    let r_max = polar_radius(frame_size);

    let weighted = match_fraction.mapv(|v| if v.is_finite() { v } else { 0.0 })
        * radial_gradient(frame_size, config.radial_power);
    let weighted = gaussian_blur(weighted.view(), config.blur_sigma, BoundaryMode::Nearest)?;

    let expected = expected_signal(psf_template, frame_size, field_rotation, config);

    let mut polar = to_polar(weighted.view(), center, r_max, config.grid_size);
    whiten_polar(&mut polar);

    let matched = match_template_wrap(polar.view(), expected.view())?.mapv(|v| v.max(0.0));

    let candidates = find_polar_blobs(matched.view(), r_max)?;
    let blobs = prune_blobs(&candidates);
    log::info!(
        "Selection mask: {} blob candidates, {} after pruning",
        candidates.len(),
        blobs.len()
    );

    let psf = normalized_psf(psf_template, frame_size);
    let mut accumulator: Array2<f64> = Array2::zeros(frame_size);
    for blob in &blobs {
        log::debug!(
            "Planet candidate at rho={:.2} px, phi={:.3} rad, brightness={:.3}",
            blob.rho,
            blob.phi,
            blob.brightness
        );
        accumulator += &draw_arc(psf.view(), blob.rho, blob.phi, field_rotation);
    }

    let mask = ndarray::Zip::from(&accumulator)
        .and(&weighted)
        .map_collect(|&a, &w| a * w > config.threshold);

    Ok(SelectionResult {
        mask,
        weighted_match_fraction: weighted,
        polar,
        matched,
        expected_signal: expected,
        blobs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::gaussian_psf_template;
    use approx::assert_relative_eq;

    fn small_config() -> SelectionConfig {
        SelectionConfig {
            grid_size: 64,
            ..Default::default()
        }
    }

    #[test]
    fn test_radial_gradient() {
        let gradient = radial_gradient((5, 5), 0.5);
        assert_eq!(gradient[[2, 2]], 0.0);
        assert_relative_eq!(gradient[[2, 4]], 2f64.sqrt());
    }

    #[test]
    fn test_arc_offsets_span_rotation() {
        let offsets = arc_offsets(90.0);
        assert_eq!(offsets.len(), 180);
        assert_relative_eq!(offsets[0], -PI / 4.0);
        assert_relative_eq!(*offsets.last().unwrap(), PI / 4.0, epsilon = 1e-12);
        assert_eq!(arc_offsets(0.3), vec![0.0]);
    }

    #[test]
    fn test_prune_keeps_brighter_blob() {
        let blobs = vec![
            PolarBlob { rho: 10.0, phi: 1.0, brightness: 0.4 },
            PolarBlob { rho: 11.5, phi: 4.0, brightness: 0.9 },
            PolarBlob { rho: 20.0, phi: 2.0, brightness: 0.1 },
        ];
        let pruned = prune_blobs(&blobs);
        assert_eq!(pruned, vec![blobs[1], blobs[2]]);
    }

    #[test]
    fn test_expected_signal_is_centred() {
        let psf = gaussian_psf_template((9, 9), 3.0);
        let expected = expected_signal(psf.view(), (41, 41), 60.0, &small_config());
        assert_eq!(expected.dim(), (64, 64));

        let com = centroid(expected.view()).unwrap();
        assert_relative_eq!(com.0, 31.5, epsilon = 0.5);
        assert_relative_eq!(com.1, 31.5, epsilon = 0.5);
    }

    #[test]
    fn test_whitening_removes_constant_rings() {
        let mut polar = Array2::from_shape_fn((4, 8), |(i, _)| i as f64);
        polar[[2, 3]] += 5.0;
        whiten_polar(&mut polar);
        assert_relative_eq!(polar[[2, 3]], 1.0);
        assert_relative_eq!(polar[[1, 0]], 0.0);
        assert_relative_eq!(polar[[2, 0]], 0.0);
    }

    #[test]
    fn test_large_field_rotation_is_rejected() {
        let parang: Vec<f64> = (0..10).map(|i| i as f64 * 25.0).collect();
        let psf = gaussian_psf_template((9, 9), 3.0);
        let mf = Array2::zeros((31, 31));
        assert!(matches!(
            residual_selection_mask(mf.view(), &parang, psf.view(), &small_config()),
            Err(HsrError::FieldRotationTooLarge(_))
        ));
    }

    #[test]
    fn test_empty_match_fraction_gives_empty_mask() {
        let parang: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let psf = gaussian_psf_template((9, 9), 3.0);
        let mf = Array2::zeros((31, 31));
        let result = residual_selection_mask(mf.view(), &parang, psf.view(), &small_config()).unwrap();
        assert!(result.mask.iter().all(|&m| !m));
        assert!(result.blobs.is_empty());
    }
}
