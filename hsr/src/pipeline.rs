//! End-to-end half-sibling regression.
//!
//! The pipeline runs in stages separated by hard barriers:
//!
//! 1. Train baseline and signal-masked models for every ROI pixel
//!    (parallel over pixels)
//! 2. Collect the residual fields and compute the match fraction of every
//!    pixel's best hypothesis (parallel over pixels, needs all of stage 1)
//! 3. Build the selection mask and assemble the final residual stack
//!    (serial reduction)
//! 4. Optionally, train forward-model collections for the detection map
//!
//! Work inside a pixel is always sequential.

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};
use rayon::prelude::*;

use crate::assembler::{assemble_residual_stack, assemble_stack};
use crate::collection::{
    coefficient_cube, detection_map, noise_predictions, CollectionResult, CollectionTrainer,
};
use crate::config::HsrConfig;
use crate::consistency::{ConsistencyChecker, ResidualFields};
use crate::error::{ConfigError, HsrError};
use crate::forward_model::{ForwardModel, PsfForwardModel};
use crate::hypothesis::candidate_signal_times;
use crate::psf::psf_diameter;
use crate::roi::{positions_from_mask, roi_mask_from_config};
use crate::selection_mask::{residual_selection_mask, SelectionResult, MAX_FIELD_ROTATION};
use crate::signal_window::SignalWindowEstimator;
use crate::sources::{SourceCache, SourceProvider};
use crate::trainer::{MaskedTrainer, PixelResult};
use crate::types::Position;

fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
    }
    pb.set_message(message);
    pb
}

/// Configured half-sibling regression experiment
pub struct HalfSiblingRegression {
    config: HsrConfig,
    psf_template: Array2<f64>,
    psf_diameter: f64,
    forward_model: Option<Box<dyn ForwardModel>>,
}

impl HalfSiblingRegression {
    /// Set up an experiment
    ///
    /// # Arguments
    /// * `config` - Experiment configuration, validated here
    /// * `psf_template` - Unsaturated PSF, centred
    /// * `forward_model` - Required when `config.use_forward_model` is set
    ///
    /// # Errors
    /// * `HsrError::Config` - invalid configuration, missing forward model or
    ///   no way to determine the PSF diameter
    pub fn new(
        config: HsrConfig,
        psf_template: Array2<f64>,
        forward_model: Option<Box<dyn ForwardModel>>,
    ) -> Result<Self, HsrError> {
        config.validate()?;
        if config.use_forward_model && forward_model.is_none() {
            return Err(ConfigError::MissingForwardModel.into());
        }

        let psf_diameter = match config.psf.diameter {
            Some(diameter) => diameter,
            None => psf_diameter(
                Some(psf_template.view()),
                config.psf.pixscale,
                config.psf.lambda_over_d,
            )?,
        };
        log::info!("PSF diameter: {psf_diameter:.2} px");

        Ok(Self {
            config,
            psf_template,
            psf_diameter,
            forward_model,
        })
    }

    /// Experiment whose forward model moves the cropped `psf_template`
    pub fn with_psf_forward_model(config: HsrConfig, psf_template: Array2<f64>) -> Result<Self, HsrError> {
        let model = PsfForwardModel::new(psf_template.view(), config.psf.radius);
        Self::new(config, psf_template, Some(Box::new(model)))
    }

    pub fn config(&self) -> &HsrConfig {
        &self.config
    }

    pub fn psf_diameter(&self) -> f64 {
        self.psf_diameter
    }

    /// Run all stages on `stack`
    ///
    /// # Arguments
    /// * `stack` - Observation `(n_frames, width, height)`
    /// * `parang` - Parallactic angle of every frame in degrees
    /// * `sources` - Predictor provider for the per-pixel noise models
    ///
    /// # Errors
    /// * `HsrError::ShapeMismatch` - stack does not match frame size or angles
    /// * `HsrError::Geometry` - parallactic angles are not monotonic
    /// * `HsrError::FieldRotationTooLarge` - more than 180° of field rotation
    pub fn run(
        &self,
        stack: ArrayView3<f64>,
        parang: &[f64],
        sources: &dyn SourceProvider,
    ) -> Result<HsrResults, HsrError> {
        let (n_frames, width, height) = stack.dim();
        let frame_size = self.config.frame_size;
        if (width, height) != frame_size || n_frames != parang.len() {
            return Err(HsrError::ShapeMismatch {
                what: "stack",
                expected: vec![parang.len(), frame_size.0, frame_size.1],
                got: vec![n_frames, width, height],
            });
        }

        let estimator = SignalWindowEstimator::new(parang, frame_size, self.psf_diameter)?;
        let field_rotation = estimator.field_rotation();
        if field_rotation > MAX_FIELD_ROTATION {
            return Err(HsrError::FieldRotationTooLarge(field_rotation));
        }

        let roi = roi_mask_from_config(frame_size, &self.config.roi);
        let positions = positions_from_mask(roi.view());
        let signal_times = candidate_signal_times(n_frames, self.config.signal_masking.n_signal_times);
        log::info!(
            "Training {} pixels with {} candidate signal times over {:.1} degrees of field rotation",
            positions.len(),
            signal_times.len(),
            field_rotation
        );

        let cache = SourceCache::new(positions.iter().copied());
        let trainer = MaskedTrainer::from_config(&self.config, estimator, signal_times.clone());

        let pb = progress_bar(positions.len(), "Training pixels");
        let pixels: Vec<PixelResult> = positions
            .par_iter()
            .map(|&position| train_position(stack, position, &trainer, &cache, sources))
            .inspect(|_| pb.inc(1))
            .collect();
        pb.finish_with_message("Training complete");

        let fields = ResidualFields::from_results(&pixels, &signal_times, (n_frames, width, height));
        let checker = ConsistencyChecker::new(trainer.estimator(), &fields, &self.config.consistency);
        let match_fraction = checker.match_fraction_map(&pixels, frame_size);
        log::info!(
            "Consistency checks done, {} pixels with a best hypothesis",
            pixels.iter().filter(|p| p.best.is_some()).count()
        );

        let selection = residual_selection_mask(
            match_fraction.view(),
            parang,
            self.psf_template.view(),
            &self.config.selection,
        )?;
        let residuals = assemble_residual_stack(&pixels, selection.mask.view(), n_frames);
        log::info!(
            "Selection mask covers {} pixels",
            selection.mask.iter().filter(|&&m| m).count()
        );

        let collections = match &self.forward_model {
            Some(model) if self.config.use_forward_model => {
                let collection_trainer = CollectionTrainer::new(self.config.model, model.as_ref(), parang);
                let collections = collection_trainer.train_all(stack, &positions, roi.view(), &cache, sources);
                log::info!("Trained {} collections", collections.len());
                Some(collections)
            }
            _ => None,
        };

        Ok(HsrResults {
            frame_size,
            n_frames,
            roi,
            pixels,
            fields,
            match_fraction,
            selection,
            residuals,
            collections,
        })
    }
}

/// Train one pixel, falling back to a NaN result if it has no sources
fn train_position(
    stack: ArrayView3<f64>,
    position: Position,
    trainer: &MaskedTrainer,
    cache: &SourceCache,
    provider: &dyn SourceProvider,
) -> PixelResult {
    let n_frames = stack.dim().0;
    match cache.get(stack, position, provider) {
        Ok(predictors) => {
            let targets = stack.slice(s![.., position.x, position.y]);
            trainer.train_pixel(position, targets, predictors.view())
        }
        Err(err) => {
            log::warn!("No sources for {position}: {err}");
            PixelResult::failed(position, n_frames)
        }
    }
}

/// Products of a pipeline run
#[derive(Debug, Clone)]
pub struct HsrResults {
    frame_size: (usize, usize),
    n_frames: usize,
    roi: Array2<bool>,
    pixels: Vec<PixelResult>,
    fields: ResidualFields,
    match_fraction: Array2<f64>,
    selection: SelectionResult,
    residuals: Array3<f64>,
    collections: Option<Vec<CollectionResult>>,
}

impl HsrResults {
    pub fn frame_size(&self) -> (usize, usize) {
        self.frame_size
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn roi_mask(&self) -> ArrayView2<'_, bool> {
        self.roi.view()
    }

    /// Per-pixel results in row-major order
    pub fn pixel_results(&self) -> &[PixelResult] {
        &self.pixels
    }

    pub fn pixel(&self, position: Position) -> Option<&PixelResult> {
        self.pixels
            .binary_search_by_key(&position, |p| p.position)
            .ok()
            .map(|i| &self.pixels[i])
    }

    pub fn signal_times(&self) -> &[usize] {
        self.fields.signal_times()
    }

    /// Residuals of every pixel for the `index`-th candidate signal time
    pub fn residual_field(&self, index: usize) -> Option<ArrayView3<'_, f64>> {
        self.fields.field(index)
    }

    /// Baseline noise predictions `(time, x, y)`, NaN outside the ROI
    pub fn baseline_predictions(&self) -> Array3<f64> {
        let shape = (self.n_frames, self.frame_size.0, self.frame_size.1);
        assemble_stack(&self.pixels, shape, |p| Some(p.baseline.predictions.view()))
    }

    /// Baseline residuals `(time, x, y)`, NaN outside the ROI
    pub fn baseline_residuals(&self) -> Array3<f64> {
        let shape = (self.n_frames, self.frame_size.0, self.frame_size.1);
        assemble_stack(&self.pixels, shape, |p| Some(p.baseline.residuals.view()))
    }

    pub fn match_fraction(&self) -> ArrayView2<'_, f64> {
        self.match_fraction.view()
    }

    pub fn selection(&self) -> &SelectionResult {
        &self.selection
    }

    pub fn selection_mask(&self) -> ArrayView2<'_, bool> {
        self.selection.mask.view()
    }

    /// Final residual stack `(time, x, y)`, NaN outside the ROI
    pub fn residuals(&self) -> ArrayView3<'_, f64> {
        self.residuals.view()
    }

    /// Forward-model collections, if the experiment used a forward model
    pub fn collections(&self) -> Option<&[CollectionResult]> {
        self.collections.as_deref()
    }

    pub fn detection_map(&self) -> Option<Array2<f64>> {
        self.collections
            .as_deref()
            .map(|c| detection_map(c, self.frame_size))
    }

    pub fn coefficient_cube(&self) -> Option<Array3<f64>> {
        self.collections
            .as_deref()
            .map(|c| coefficient_cube(c, self.frame_size))
    }

    /// Forward-model noise predictions `(time, x, y)`, NaN outside the ROI
    pub fn noise_predictions(&self) -> Option<Array3<f64>> {
        let shape = (self.n_frames, self.frame_size.0, self.frame_size.1);
        self.collections
            .as_deref()
            .map(|c| noise_predictions(c, shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{gaussian_psf_template, linear_parang};

    fn config() -> HsrConfig {
        let mut config = HsrConfig {
            frame_size: (15, 15),
            ..Default::default()
        };
        config.psf.diameter = Some(3.0);
        config.roi.inner_exclusion_radius = 2.0;
        config.roi.outer_exclusion_radius = Some(6.0);
        config.signal_masking.n_signal_times = 5;
        config.selection.grid_size = 32;
        config
    }

    fn intercept_only(stack: ArrayView3<f64>, _position: Position) -> Array2<f64> {
        Array2::zeros((stack.dim().0, 1))
    }

    #[test]
    fn test_missing_forward_model_is_rejected() {
        let mut config = config();
        config.use_forward_model = true;
        let psf = gaussian_psf_template((9, 9), 3.0);
        let err = HalfSiblingRegression::new(config.clone(), psf.clone(), None)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            HsrError::Config(ConfigError::MissingForwardModel)
        ));
        assert!(HalfSiblingRegression::with_psf_forward_model(config, psf).is_ok());
    }

    #[test]
    fn test_psf_diameter_from_template_or_config() {
        let mut config = config();
        config.psf.diameter = None;
        let small = gaussian_psf_template((9, 9), 3.0);
        assert!(HalfSiblingRegression::new(config.clone(), small, None).is_err());

        let large = gaussian_psf_template((41, 41), 4.0);
        let hsr = HalfSiblingRegression::new(config, large, None).unwrap();
        assert!(hsr.psf_diameter() > 3.0 && hsr.psf_diameter() < 5.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let hsr = HalfSiblingRegression::new(config(), gaussian_psf_template((9, 9), 3.0), None).unwrap();
        let parang = linear_parang(20, 0.0, 19.0);
        let stack = Array3::<f64>::zeros((20, 16, 15));
        assert!(matches!(
            hsr.run(stack.view(), &parang, &intercept_only),
            Err(HsrError::ShapeMismatch { .. })
        ));
        let stack = Array3::<f64>::zeros((19, 15, 15));
        assert!(hsr.run(stack.view(), &parang, &intercept_only).is_err());
    }

    #[test]
    fn test_non_monotonic_angles_are_fatal() {
        let hsr = HalfSiblingRegression::new(config(), gaussian_psf_template((9, 9), 3.0), None).unwrap();
        let mut parang = linear_parang(20, 0.0, 19.0);
        parang.swap(3, 4);
        let stack = Array3::<f64>::zeros((20, 15, 15));
        assert!(matches!(
            hsr.run(stack.view(), &parang, &intercept_only),
            Err(HsrError::Geometry(_))
        ));
    }

    #[test]
    fn test_flat_stack_runs_end_to_end() {
        let hsr = HalfSiblingRegression::new(config(), gaussian_psf_template((9, 9), 3.0), None).unwrap();
        let parang = linear_parang(20, 0.0, 19.0);
        let stack = Array3::from_elem((20, 15, 15), 5.0);
        let results = hsr.run(stack.view(), &parang, &intercept_only).unwrap();

        assert_eq!(results.residuals().dim(), (20, 15, 15));
        assert!(results.residuals()[[0, 7, 7]].is_nan());
        assert!(results.residuals()[[0, 7, 10]].abs() < 1e-9);
        assert!((results.baseline_predictions()[[3, 7, 10]] - 5.0).abs() < 1e-9);
        assert!(results.selection_mask().iter().all(|&m| !m));
        assert!(results.detection_map().is_none());
        assert_eq!(results.signal_times().len(), 5);
        assert!(results.residual_field(4).is_some());
        assert!(results.residual_field(5).is_none());
        assert!(results.pixel(Position::new(7, 10)).is_some());
        assert!(results.pixel(Position::new(7, 7)).is_none());
    }
}
