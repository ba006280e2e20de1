//! Image processing module for match-fraction maps
//!
//! Filtering, resampling, template matching and blob detection used to turn
//! a noisy per-pixel score map into clean, arc-shaped selections.

pub mod blob;
pub mod filter;
pub mod polar;
pub mod shift;
pub mod template;
