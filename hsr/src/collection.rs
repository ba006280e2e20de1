//! Collections: planet detection with a forward-modelled regressor.
//!
//! A collection belongs to a hypothetical planet starting at one ROI
//! position. Every pixel the planet would sweep over is fitted once, with
//! the planet's trace at that pixel appended to the sources. If the planet
//! is real, all members agree on a positive signal coefficient; the median
//! over the members is the detection-map value of the starting position.
//! The model of the starting pixel itself, with the signal regressor
//! dropped, gives that pixel's noise prediction.

use hci_math::MathError;
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;

use crate::config::ModelKind;
use crate::error::{FitError, GeometryError};
use crate::forward_model::ForwardModel;
use crate::predictor::PixelPredictor;
use crate::sources::{SourceCache, SourceProvider};
use crate::types::Position;

/// Signal coefficients of all pixels in one collection region
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionResult {
    /// Starting position of the hypothetical planet
    pub position: Position,
    pub members: Vec<Position>,
    /// Signal coefficient per member, NaN where the fit failed
    pub coefficients: Vec<f64>,
    /// Prediction of the starting pixel's model without the signal regressor
    pub noise_prediction: Option<Array1<f64>>,
}

impl CollectionResult {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Median of the finite member coefficients, NaN if there are none
    pub fn median_coefficient(&self) -> f64 {
        hci_math::median(&self.coefficients).unwrap_or(f64::NAN)
    }
}

/// Trains collections for a fixed observation
pub struct CollectionTrainer<'a> {
    model: ModelKind,
    forward_model: &'a dyn ForwardModel,
    parang: &'a [f64],
}

impl<'a> CollectionTrainer<'a> {
    pub fn new(model: ModelKind, forward_model: &'a dyn ForwardModel, parang: &'a [f64]) -> Self {
        Self {
            model,
            forward_model,
            parang,
        }
    }

    /// Fit every member of the collection of a planet starting at `position`
    ///
    /// Members are the pixels of the collection region that lie inside
    /// `roi`. Member fits that fail are logged and recorded as NaN.
    ///
    /// # Errors
    /// * `GeometryError` - the forward model rejected `position`
    pub fn train(
        &self,
        stack: ArrayView3<f64>,
        position: Position,
        roi: ArrayView2<bool>,
        cache: &SourceCache,
        provider: &dyn SourceProvider,
    ) -> Result<CollectionResult, GeometryError> {
        let (_, width, height) = stack.dim();
        let trace = self
            .forward_model
            .signal_trace(position, (width, height), self.parang)?;

        let members: Vec<Position> = trace
            .collection_region
            .indexed_iter()
            .filter(|&((x, y), &inside)| inside && roi.get((x, y)).copied().unwrap_or(false))
            .map(|((x, y), _)| Position::new(x, y))
            .collect();

        let mut noise_prediction = None;
        let mut coefficients = Vec::with_capacity(members.len());
        for &member in &members {
            let signal = trace.stack.slice(s![.., member.x, member.y]);
            match self.fit_member(stack, member, signal, cache, provider) {
                Ok((predictor, design)) => {
                    if member == position {
                        noise_prediction = predictor.predict_noise(design.view()).ok();
                    }
                    coefficients.push(predictor.signal_coefficient().unwrap_or(f64::NAN));
                }
                Err(err) => {
                    log::debug!("Collection {position}: member {member} failed: {err}");
                    coefficients.push(f64::NAN);
                }
            }
        }

        Ok(CollectionResult {
            position,
            members,
            coefficients,
            noise_prediction,
        })
    }

    fn fit_member(
        &self,
        stack: ArrayView3<f64>,
        member: Position,
        signal: ArrayView1<f64>,
        cache: &SourceCache,
        provider: &dyn SourceProvider,
    ) -> Result<(PixelPredictor, Array2<f64>), FitError> {
        let sources = cache.get(stack, member, provider)?;
        let design = ndarray::concatenate(Axis(1), &[sources.view(), signal.view().insert_axis(Axis(1))])
            .map_err(|_| MathError::DimensionMismatch {
                expected: signal.len(),
                got: sources.nrows(),
            })?;
        let targets = stack.slice(s![.., member.x, member.y]);

        let predictor = PixelPredictor::fit(self.model, design.view(), targets, true)?;
        Ok((predictor, design))
    }

    /// Train the collections of all `positions` in parallel
    ///
    /// Positions rejected by the forward model are skipped with a warning.
    pub fn train_all(
        &self,
        stack: ArrayView3<f64>,
        positions: &[Position],
        roi: ArrayView2<bool>,
        cache: &SourceCache,
        provider: &dyn SourceProvider,
    ) -> Vec<CollectionResult> {
        positions
            .par_iter()
            .filter_map(|&position| match self.train(stack, position, roi, cache, provider) {
                Ok(collection) => Some(collection),
                Err(err) => {
                    log::warn!("Skipping collection at {position}: {err}");
                    None
                }
            })
            .collect()
    }
}

/// Median signal coefficient per starting position, NaN elsewhere
pub fn detection_map(collections: &[CollectionResult], frame_size: (usize, usize)) -> Array2<f64> {
    let mut map = Array2::from_elem(frame_size, f64::NAN);
    for collection in collections {
        if let Some(entry) = map.get_mut(collection.position.index()) {
            *entry = collection.median_coefficient();
        }
    }
    map
}

/// All member coefficients as `(max_members, width, height)`, NaN-padded
pub fn coefficient_cube(collections: &[CollectionResult], frame_size: (usize, usize)) -> Array3<f64> {
    let depth = collections.iter().map(CollectionResult::len).max().unwrap_or(0);
    let mut cube = Array3::from_elem((depth, frame_size.0, frame_size.1), f64::NAN);
    for collection in collections {
        let [x, y] = collection.position.index();
        if x >= frame_size.0 || y >= frame_size.1 {
            continue;
        }
        for (k, &coefficient) in collection.coefficients.iter().enumerate() {
            cube[[k, x, y]] = coefficient;
        }
    }
    cube
}

/// Noise predictions `(time, x, y)` of every collection's starting pixel
///
/// NaN where no collection was trained or its starting pixel failed.
pub fn noise_predictions(collections: &[CollectionResult], shape: (usize, usize, usize)) -> Array3<f64> {
    let (n_frames, width, height) = shape;
    let mut predictions = Array3::from_elem(shape, f64::NAN);
    for collection in collections {
        let [x, y] = collection.position.index();
        let Some(prediction) = &collection.noise_prediction else {
            continue;
        };
        if x >= width || y >= height || prediction.len() != n_frames {
            continue;
        }
        predictions.slice_mut(s![.., x, y]).assign(prediction);
    }
    predictions
}

/// Planet signal implied by the detection map
///
/// Sum of the forward-model traces of all positions with a positive
/// detection-map value, weighted by that value, normalized to a peak of one
/// and scaled to the largest detection-map value.
pub fn best_fit_planet_model(
    detection_map: ArrayView2<f64>,
    forward_model: &dyn ForwardModel,
    parang: &[f64],
) -> Result<Array3<f64>, GeometryError> {
    let frame_size = detection_map.dim();
    let mut model = Array3::zeros((parang.len(), frame_size.0, frame_size.1));

    for ((x, y), &factor) in detection_map.indexed_iter() {
        if !(factor > 0.0) {
            continue;
        }
        let trace = forward_model.signal_trace(Position::new(x, y), frame_size, parang)?;
        model.scaled_add(factor, &trace.stack);
    }

    let peak = model.iter().copied().fold(0.0, f64::max);
    let scale = detection_map
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    if peak > 0.0 {
        model.mapv_inplace(|v| v / peak * scale);
    }
    Ok(model)
}
