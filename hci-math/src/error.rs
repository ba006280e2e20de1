use thiserror::Error;

/// Errors produced by the numerical primitives in this crate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Insufficient data: need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Input contains non-finite values")]
    NonFinite,

    #[error("Linear system could not be solved: {0}")]
    SolveFailed(String),

    #[error("Values are not sorted monotonically")]
    NotMonotonic,
}
