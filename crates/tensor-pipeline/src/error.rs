//! Transform Error Types

use thiserror::Error;

use crate::DataType;

/// Errors raised while building or applying pipeline stages
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// Buffer rank does not match what the stage operates on
    #[error("{stage}: expected rank {expected}, got shape {actual:?}")]
    RankMismatch {
        stage: &'static str,
        expected: usize,
        actual: Vec<usize>,
    },

    /// Channel count incompatible with the stage parameters
    #[error("{stage}: {params} parameters cannot be applied to {channels} channels")]
    ChannelMismatch {
        stage: &'static str,
        params: usize,
        channels: usize,
    },

    /// Element count does not fit the requested shape
    #[error("Cannot reshape {elements} elements into {shape:?}")]
    ShapeMismatch { elements: usize, shape: Vec<usize> },

    /// Buffer element type differs from the one declared by the model
    #[error("Element type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: DataType, actual: DataType },

    /// Stage or spec constructed with unusable parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
