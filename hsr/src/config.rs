//! Experiment configuration.
//!
//! An [`HsrConfig`] is normally loaded from a JSON file. Every section has
//! defaults, so a file only needs to list what differs:
//!
//! ```json
//! {
//!   "frame_size": [51, 51],
//!   "model": { "type": "ridge", "alpha": 1.0 },
//!   "signal_masking": { "n_signal_times": 20 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Closed set of supported per-pixel regression models
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelKind {
    /// Ordinary least squares with intercept
    Linear,
    /// L2-regularized least squares with intercept
    Ridge { alpha: f64 },
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::Ridge { alpha: 1.0 }
    }
}

/// How frames are assigned to cross-validation folds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
    /// Fold `i` holds every frame with `index % n_splits == i`
    #[default]
    EvenOdd,
    /// Contiguous blocks of frames
    KFold,
}

/// What a consistency test counts as when its residuals cannot be sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Leave the test out of the match fraction
    #[default]
    Skip,
    /// Count the test as a mismatch
    Fail,
}

/// Annulus of pixels for which models are trained (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    pub inner_exclusion_radius: f64,
    /// No outer limit if unset
    pub outer_exclusion_radius: Option<f64>,
}

/// Predictor ("source") selection and PCA
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Number of principal components used as predictors
    pub n_components: usize,
    /// Components are scaled by `singular_value.powf(sv_power)`
    pub sv_power: f64,
    /// Pixels closer than this to the target are never predictors
    pub exclusion_radius: f64,
    /// Width of the annulus around the target's separation
    pub annulus_width: f64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            n_components: 16,
            sv_power: 1.0,
            exclusion_radius: 3.0,
            annulus_width: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalMaskingConfig {
    /// Number of candidate signal times, spread evenly over the observation
    pub n_signal_times: usize,
    pub n_splits: usize,
    pub split_kind: SplitKind,
    /// Hypotheses masking more than this fraction of frames are skipped
    pub max_signal_length: f64,
}

impl Default for SignalMaskingConfig {
    fn default() -> Self {
        Self {
            n_signal_times: 30,
            n_splits: 2,
            split_kind: SplitKind::EvenOdd,
            max_signal_length: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    pub n_test_positions: usize,
    pub unresolved: UnresolvedPolicy,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            n_test_positions: 5,
            unresolved: UnresolvedPolicy::Skip,
        }
    }
}

/// Polar template matching that turns the match fraction into a selection mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Side length of the square polar grid
    pub grid_size: usize,
    /// Exponent of the radial weighting applied to the match fraction
    pub radial_power: f64,
    pub blur_sigma: f64,
    /// Binarization threshold for `accumulator × weighted match fraction`
    pub threshold: f64,
    /// Separation of the expected-signal arc as a fraction of the polar radius
    pub relative_rho: f64,
    /// Polar angle of the expected-signal arc is `π·(1 + relative_phi)`
    pub relative_phi: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            grid_size: 256,
            radial_power: 0.5,
            blur_sigma: 1.0,
            threshold: 0.2,
            relative_rho: 0.5,
            relative_phi: 0.275,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsfConfig {
    /// Explicit PSF diameter in pixels; estimated from the template if unset
    pub diameter: Option<f64>,
    /// Radius to which the template is cropped for forward modelling
    pub radius: f64,
    pub lambda_over_d: Option<f64>,
    /// Plate scale in arcsec per pixel
    pub pixscale: Option<f64>,
}

impl Default for PsfConfig {
    fn default() -> Self {
        Self {
            diameter: None,
            radius: 3.0,
            lambda_over_d: None,
            pixscale: None,
        }
    }
}

/// Complete configuration of a half-sibling regression experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HsrConfig {
    /// Spatial `(width, height)` of the frames
    pub frame_size: (usize, usize),
    pub roi: RoiConfig,
    pub model: ModelKind,
    pub sources: SourcesConfig,
    pub signal_masking: SignalMaskingConfig,
    pub consistency: ConsistencyConfig,
    pub selection: SelectionConfig,
    pub psf: PsfConfig,
    /// Train collections with a forward-modelled planet regressor
    pub use_forward_model: bool,
}

impl Default for HsrConfig {
    fn default() -> Self {
        Self {
            frame_size: (51, 51),
            roi: RoiConfig::default(),
            model: ModelKind::default(),
            sources: SourcesConfig::default(),
            signal_masking: SignalMaskingConfig::default(),
            consistency: ConsistencyConfig::default(),
            selection: SelectionConfig::default(),
            psf: PsfConfig::default(),
            use_forward_model: false,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

impl HsrConfig {
    /// Parse and validate a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: HsrConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        log::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Check value ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_size.0 == 0 || self.frame_size.1 == 0 {
            return Err(invalid("frame_size", "must be non-empty"));
        }

        let roi = &self.roi;
        let outer = roi.outer_exclusion_radius.unwrap_or(f64::INFINITY);
        if !(roi.inner_exclusion_radius >= 0.0) || outer < roi.inner_exclusion_radius {
            return Err(invalid(
                "roi",
                format!(
                    "need 0 <= inner ({}) <= outer ({outer})",
                    roi.inner_exclusion_radius
                ),
            ));
        }

        if let ModelKind::Ridge { alpha } = self.model {
            if !(alpha > 0.0 && alpha.is_finite()) {
                return Err(invalid("model.alpha", format!("must be positive, got {alpha}")));
            }
        }

        if self.sources.n_components == 0 {
            return Err(invalid("sources.n_components", "must be at least 1"));
        }

        let masking = &self.signal_masking;
        if masking.n_signal_times == 0 {
            return Err(invalid("signal_masking.n_signal_times", "must be at least 1"));
        }
        if masking.n_splits == 0 {
            return Err(invalid("signal_masking.n_splits", "must be at least 1"));
        }
        if !(masking.max_signal_length > 0.0 && masking.max_signal_length <= 1.0) {
            return Err(invalid(
                "signal_masking.max_signal_length",
                format!("must be in (0, 1], got {}", masking.max_signal_length),
            ));
        }

        if self.consistency.n_test_positions == 0 {
            return Err(invalid("consistency.n_test_positions", "must be at least 1"));
        }

        let selection = &self.selection;
        if selection.grid_size < 8 {
            return Err(invalid(
                "selection.grid_size",
                format!("must be at least 8, got {}", selection.grid_size),
            ));
        }
        if !(selection.blur_sigma > 0.0) {
            return Err(invalid("selection.blur_sigma", "must be positive"));
        }
        if !(selection.relative_rho > 0.0 && selection.relative_rho < 1.0) {
            return Err(invalid("selection.relative_rho", "must be in (0, 1)"));
        }

        if let Some(diameter) = self.psf.diameter {
            if !(diameter > 0.0 && diameter.is_finite()) {
                return Err(invalid("psf.diameter", format!("must be positive, got {diameter}")));
            }
        }
        if !(self.psf.radius > 0.0) {
            return Err(invalid("psf.radius", "must be positive"));
        }

        Ok(())
    }
}
