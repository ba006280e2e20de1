//! Error types for half-sibling regression.
//!
//! Per-pixel failures ([`GeometryError`], [`FitError`]) are caught at the
//! pixel boundary and turn into NaN results; everything else surfaces as an
//! [`HsrError`] from the pipeline.

use hci_image::ImageError;
use hci_math::MathError;
use thiserror::Error;

/// Errors from signal-window and trajectory geometry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Parallactic angles are not sorted monotonically")]
    NotMonotonic,

    #[error("Parallactic angles contain non-finite values")]
    NonFinite,

    #[error("Position ({x}, {y}) is outside the frame")]
    OutsideFrame { x: f64, y: f64 },

    #[error("Frame index {time} is outside the observation of {n_frames} frames")]
    OutsideObservation { time: usize, n_frames: usize },
}

impl From<MathError> for GeometryError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::NonFinite => GeometryError::NonFinite,
            _ => GeometryError::NotMonotonic,
        }
    }
}

/// Regression failure while fitting a noise model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("Regression failed: {0}")]
    Math(#[from] MathError),

    #[error("Not enough training samples: need {needed}, got {got}")]
    TooFewSamples { needed: usize, got: usize },
}

/// Invalid or inconsistent configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("use_forward_model is set but no forward model was provided")]
    MissingForwardModel,

    #[error("Could not determine PSF diameter: {0}")]
    PsfDiameter(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error of the half-sibling regression pipeline
#[derive(Error, Debug)]
pub enum HsrError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error("Field rotation of {0:.1} degrees exceeds 180 degrees")]
    FieldRotationTooLarge(f64),

    #[error("Shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}
