//! PSF template utilities.

use hci_image::crop_or_pad;
use hci_math::frame_center;
use ndarray::{Array2, ArrayView2};

use crate::error::ConfigError;

/// Side length to which templates are cropped before measuring the core
const CORE_CROP: usize = 33;

/// Core diameter in units of λ/D (first dark ring of an Airy pattern at FWHM level)
const AIRY_FWHM_FACTOR: f64 = 1.144;

/// Pedestal removed from normalized templates before they are stamped
const PSF_PEDESTAL: f64 = 0.2;

/// Diameter of the PSF core in pixels
///
/// Measured from `template` when it has at least 33×33 pixels: the
/// diameter of the disk whose area equals the number of pixels at or above
/// half maximum. Otherwise estimated from the diffraction limit.
///
/// # Errors
/// * `ConfigError::PsfDiameter` - no usable template and no `λ/D` and plate scale
pub fn psf_diameter(
    template: Option<ArrayView2<f64>>,
    pixscale: Option<f64>,
    lambda_over_d: Option<f64>,
) -> Result<f64, ConfigError> {
    if let Some(template) = template {
        let (w, h) = template.dim();
        if w >= CORE_CROP && h >= CORE_CROP {
            let core = crop_or_pad(template, (CORE_CROP, CORE_CROP));
            let peak = core.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if peak > 0.0 && peak.is_finite() {
                let area = core.iter().filter(|&&v| v >= peak / 2.0).count() as f64;
                return Ok(2.0 * (area / std::f64::consts::PI).sqrt());
            }
        }
    }

    match (lambda_over_d, pixscale) {
        (Some(lambda_over_d), Some(pixscale)) if pixscale > 0.0 => {
            Ok(AIRY_FWHM_FACTOR * lambda_over_d / pixscale)
        }
        _ => Err(ConfigError::PsfDiameter(
            "need a template of at least 33x33 pixels or both lambda_over_d and pixscale".to_string(),
        )),
    }
}

/// Crop `template` to the smallest odd square containing `radius`
///
/// Pixels farther than `radius` from the center are set to zero.
pub fn crop_psf_template(template: ArrayView2<f64>, radius: f64) -> Array2<f64> {
    let side = 2 * radius.max(0.0).ceil() as usize + 1;
    let mut cropped = crop_or_pad(template, (side, side));
    let center = frame_center((side, side));

    for ((x, y), value) in cropped.indexed_iter_mut() {
        let r = (x as f64 - center.0).hypot(y as f64 - center.1);
        if r > radius {
            *value = 0.0;
        }
    }
    cropped
}

/// Template padded to `frame_size`, peak-normalized with the pedestal removed
///
/// All-zero if the template has no positive peak.
pub fn normalized_psf(template: ArrayView2<f64>, frame_size: (usize, usize)) -> Array2<f64> {
    let mut psf = crop_or_pad(template, frame_size);
    let peak = psf.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(peak > 0.0 && peak.is_finite()) {
        return Array2::zeros(frame_size);
    }

    psf.mapv_inplace(|v| (v / peak - PSF_PEDESTAL).max(0.0));
    let peak = psf.iter().copied().fold(0.0, f64::max);
    if peak > 0.0 {
        psf /= peak;
    }
    psf
}
