use thiserror::Error;

/// Errors produced by the image processing routines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageError {
    #[error("Image is empty")]
    Empty,

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Template {template:?} is larger than image {image:?}")]
    TemplateTooLarge {
        template: (usize, usize),
        image: (usize, usize),
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
