//! Multi-scale Laplacian-of-Gaussian blob detection
//!
//! Blobs are local maxima of the scale-normalized response `−σ²·∇²G_σ * I`
//! in the 3D (row, column, scale) cube, above an absolute threshold.
//! Overlapping detections are pruned in favour of the larger scale.

use std::f64::consts::SQRT_2;

use ndarray::{Array3, ArrayView2, Axis};
use rayon::prelude::*;

use crate::error::ImageError;
use crate::image_proc::filter::{gaussian_laplace, BoundaryMode};

/// Parameters of the scale-space search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobLogParams {
    pub min_sigma: f64,
    pub max_sigma: f64,
    /// Number of scales, evenly spaced from `min_sigma` to `max_sigma`
    pub num_sigma: usize,
    /// Absolute threshold on the scale-normalized response
    pub threshold: f64,
    /// Blobs whose overlap area fraction exceeds this value are pruned
    pub overlap: f64,
}

impl Default for BlobLogParams {
    fn default() -> Self {
        Self {
            min_sigma: 1.0,
            max_sigma: 50.0,
            num_sigma: 10,
            threshold: 0.2,
            overlap: 0.5,
        }
    }
}

/// A detected blob in image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub row: usize,
    pub col: usize,
    /// Scale at which the response peaked; radius is about `σ·√2`
    pub sigma: f64,
}

impl Blob {
    fn radius(&self) -> f64 {
        self.sigma * SQRT_2
    }
}

fn sigma_list(params: &BlobLogParams) -> Vec<f64> {
    match params.num_sigma {
        0 => Vec::new(),
        1 => vec![params.min_sigma],
        n => {
            let step = (params.max_sigma - params.min_sigma) / (n - 1) as f64;
            (0..n).map(|k| params.min_sigma + step * k as f64).collect()
        }
    }
}

/// Area fraction of the smaller disk covered by the other
fn disk_overlap(a: &Blob, b: &Blob) -> f64 {
    let (r1, r2) = (a.radius(), b.radius());
    if r1 == 0.0 || r2 == 0.0 {
        return 0.0;
    }
    let d = (a.row as f64 - b.row as f64).hypot(a.col as f64 - b.col as f64);
    if d >= r1 + r2 {
        return 0.0;
    }
    if d <= (r1 - r2).abs() {
        return 1.0;
    }

    let ratio1 = ((d * d + r1 * r1 - r2 * r2) / (2.0 * d * r1)).clamp(-1.0, 1.0);
    let ratio2 = ((d * d + r2 * r2 - r1 * r1) / (2.0 * d * r2)).clamp(-1.0, 1.0);
    let a1 = r1 * r1 * ratio1.acos();
    let a2 = r2 * r2 * ratio2.acos();
    let a3 = 0.5 * ((-d + r2 + r1) * (d + r2 - r1) * (d - r2 + r1) * (d + r2 + r1)).max(0.0).sqrt();
    let area = a1 + a2 - a3;

    area / (std::f64::consts::PI * r1.min(r2).powi(2))
}

/// Drop the smaller of every pair of blobs that overlap by more than `overlap`
fn prune_overlapping(mut blobs: Vec<Blob>, overlap: f64) -> Vec<Blob> {
    for i in 0..blobs.len() {
        for j in (i + 1)..blobs.len() {
            if disk_overlap(&blobs[i], &blobs[j]) > overlap {
                if blobs[i].sigma > blobs[j].sigma {
                    blobs[j].sigma = 0.0;
                } else {
                    blobs[i].sigma = 0.0;
                }
            }
        }
    }
    blobs.retain(|b| b.sigma > 0.0);
    blobs
}

/// Whether `cube[[r, c, k]]` equals the maximum of its clamped 3×3×3 neighbourhood
fn is_local_max(cube: &Array3<f64>, r: usize, c: usize, k: usize) -> bool {
    let (nr, nc, nk) = cube.dim();
    let value = cube[[r, c, k]];
    let range = |i: usize, n: usize| i.saturating_sub(1)..=(i + 1).min(n - 1);

    for rr in range(r, nr) {
        for cc in range(c, nc) {
            for kk in range(k, nk) {
                if cube[[rr, cc, kk]] > value {
                    return false;
                }
            }
        }
    }
    true
}

/// Find blobs in `image` with a Laplacian-of-Gaussian scale space
///
/// # Arguments
/// * `image` - Input image; bright blobs on a dark background
/// * `params` - Scale range, threshold and overlap pruning
///
/// # Returns
/// * Detected blobs in row-major order of their peak positions
pub fn blob_log(image: ArrayView2<f64>, params: &BlobLogParams) -> Result<Vec<Blob>, ImageError> {
    if image.is_empty() {
        return Err(ImageError::Empty);
    }
    if !(params.min_sigma > 0.0 && params.max_sigma >= params.min_sigma) {
        return Err(ImageError::InvalidParameter(format!(
            "invalid sigma range [{}, {}]",
            params.min_sigma, params.max_sigma
        )));
    }

    let sigmas = sigma_list(params);
    if sigmas.is_empty() {
        return Ok(Vec::new());
    }

    let responses = sigmas
        .par_iter()
        .map(|&s| {
            gaussian_laplace(image, s, BoundaryMode::Reflect).map(|r| r.mapv(|v| -v * s * s))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (rows, cols) = image.dim();
    let mut cube = Array3::zeros((rows, cols, sigmas.len()));
    for (k, response) in responses.iter().enumerate() {
        cube.index_axis_mut(Axis(2), k).assign(response);
    }

    let mut blobs = Vec::new();
    for ((r, c, k), &v) in cube.indexed_iter() {
        if v > params.threshold && is_local_max(&cube, r, c, k) {
            blobs.push(Blob {
                row: r,
                col: c,
                sigma: sigmas[k],
            });
        }
    }
    log::debug!("blob_log: {} raw maxima over {} scales", blobs.len(), sigmas.len());

    Ok(prune_overlapping(blobs, params.overlap))
}
