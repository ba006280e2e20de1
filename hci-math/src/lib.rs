//! Numerical primitives shared by the half-sibling regression crates.
//!
//! This crate collects the small pieces of linear algebra and statistics
//! that the per-pixel noise models are built from:
//!
//! - **Regression**: ordinary least squares and ridge regression with an
//!   intercept, solved with nalgebra
//! - **Standardization**: column-wise and series-wise standard scalers
//! - **Statistics**: NaN-aware mean, standard deviation and median
//! - **Search**: monotonicity checks, `searchsorted` and `linspace`
//! - **Geometry**: rotations about the frame center and polar angles
//! - **Interpolation**: bilinear sampling of 2D frames and 3D stacks

pub mod error;
pub mod geometry;
pub mod interp;
pub mod regression;
pub mod scaler;
pub mod search;
pub mod stats;

pub use error::MathError;
pub use geometry::{frame_center, polar_angle, rotate_position, separation};
pub use interp::{bilinear, bilinear_series};
pub use regression::{fit_least_squares, fit_ridge, fit_slope, LinearFit};
pub use scaler::{ColumnScaler, SeriesScaler};
pub use search::{linspace_indices, monotonic_direction, searchsorted, Direction, Side};
pub use stats::{mean, median, std_dev};
