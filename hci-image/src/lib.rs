//! Image processing on 2D `ndarray` frames.
//!
//! The selection-mask stage of half-sibling regression works on small maps
//! (match fractions, polar projections, correlation surfaces). This crate
//! provides the operations it needs:
//!
//! - Gaussian blurring and Laplacian-of-Gaussian filtering
//! - Sub-pixel shifting, centred crop/pad and centroids
//! - Cartesian to polar resampling
//! - FFT-based normalized cross-correlation with wrap-around boundaries
//! - Multi-scale Laplacian-of-Gaussian blob detection

pub mod error;
pub mod image_proc;

pub use error::ImageError;
pub use image_proc::blob::{blob_log, Blob, BlobLogParams};
pub use image_proc::filter::{gaussian_blur, gaussian_laplace, BoundaryMode};
pub use image_proc::polar::to_polar;
pub use image_proc::shift::{centroid, crop_or_pad, shift_image};
pub use image_proc::template::match_template_wrap;
