//! Half-sibling regression for high-contrast imaging.
//!
//! Quasi-static speckles dominate the time series of every pixel close to a
//! star. Half-sibling regression predicts each pixel from "sibling" pixels
//! that share its systematic noise but cannot contain the same planet, and
//! keeps the residuals. A planet moving through the pixel would be absorbed
//! by the noise model, so models are also trained with candidate signal
//! windows masked out; the most plausible window is picked per pixel and
//! cross-checked against the planet's trajectory through other pixels.
//!
//! - [`signal_window`]: how long a planet contaminates a pixel
//! - [`trainer`]: cross-validated baseline and signal-masked fits
//! - [`selection`]: bump test and best-hypothesis selection
//! - [`consistency`]: match fraction along the planet trajectory
//! - [`selection_mask`]: polar template matching on the match fraction
//! - [`assembler`]: final residual stack
//! - [`collection`]: forward-model detection map
//! - [`pipeline`]: all stages end to end
//!
//! ```no_run
//! use hsr::{synthetic, HalfSiblingRegression, HsrConfig, PcaSourceProvider};
//!
//! let config = HsrConfig::default();
//! let psf = synthetic::gaussian_psf_template((33, 33), 4.0);
//! let parang = synthetic::linear_parang(100, 0.0, 60.0);
//! let stack = synthetic::noise_stack((100, 51, 51), 1.0, 0);
//!
//! let sources = PcaSourceProvider::new(config.sources);
//! let hsr = HalfSiblingRegression::new(config, psf, None)?;
//! let results = hsr.run(stack.view(), &parang, &sources)?;
//! println!("{} pixels selected", results.selection_mask().iter().filter(|&&m| m).count());
//! # Ok::<(), hsr::HsrError>(())
//! ```

pub mod assembler;
pub mod collection;
pub mod config;
pub mod consistency;
pub mod error;
pub mod forward_model;
pub mod hypothesis;
pub mod pipeline;
pub mod predictor;
pub mod psf;
pub mod roi;
pub mod selection;
pub mod selection_mask;
pub mod signal_window;
pub mod sources;
pub mod splitting;
pub mod synthetic;
pub mod trainer;
pub mod types;

pub use config::{
    ConsistencyConfig, HsrConfig, ModelKind, PsfConfig, RoiConfig, SelectionConfig,
    SignalMaskingConfig, SourcesConfig, SplitKind, UnresolvedPolicy,
};
pub use error::{ConfigError, FitError, GeometryError, HsrError};
pub use forward_model::{ForwardModel, PsfForwardModel, SignalTrace};
pub use hypothesis::Hypothesis;
pub use pipeline::{HalfSiblingRegression, HsrResults};
pub use signal_window::{signal_window, SignalWindowEstimator};
pub use sources::{PcaSourceProvider, SourceProvider};
pub use trainer::{MaskedTrainer, PixelResult, TrainedFit};
pub use types::{Position, SignalWindow};
