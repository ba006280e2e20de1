//! Core value types shared across the crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer pixel position, indexing frames as `frame[[x, y]]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Continuous pixel coordinates of the position
    pub fn as_f64(&self) -> (f64, f64) {
        (self.x as f64, self.y as f64)
    }

    /// Array index for `frame[[x, y]]` style access
    pub fn index(&self) -> [usize; 2] {
        [self.x, self.y]
    }
}

impl From<(usize, usize)> for Position {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Temporal extent of a planet signal around its peak, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalWindow {
    /// Frames contaminated before the peak
    pub before: usize,
    /// Frames contaminated from the peak onwards
    pub after: usize,
}

impl SignalWindow {
    /// Window that covers the whole observation
    pub fn always(n_frames: usize) -> Self {
        Self {
            before: 0,
            after: n_frames,
        }
    }

    /// Total number of frames covered, ignoring truncation at the edges
    pub fn length(&self) -> usize {
        self.before + self.after
    }

    /// Boolean mask over `n_frames` for a signal peaking at `signal_time`
    ///
    /// Covers `[max(0, t − before), min(n, t + after))`.
    pub fn mask(&self, signal_time: usize, n_frames: usize) -> Vec<bool> {
        let start = signal_time.saturating_sub(self.before);
        let end = (signal_time + self.after).min(n_frames);
        (0..n_frames).map(|i| i >= start && i < end).collect()
    }
}
