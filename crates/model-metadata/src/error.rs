//! Metadata Error Types

use tensor_pipeline::TransformError;
use thiserror::Error;

/// Errors while reading model metadata
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    /// Required record or field absent from the payload
    #[error("Missing metadata field: {0}")]
    MissingField(&'static str),

    /// Field present but unusable
    #[error("Malformed metadata field {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    /// Referenced associated file could not be loaded
    #[error("Associated file not found: {0}")]
    FileNotFound(String),

    /// Label list does not cover the output tensor
    #[error("Label count {labels} does not match output tensor {shape:?}")]
    LabelCountMismatch { labels: usize, shape: Vec<usize> },

    /// Engine could not describe a tensor
    #[error("Cannot describe {direction} tensor {index}: {reason}")]
    Tensor {
        direction: &'static str,
        index: usize,
        reason: String,
    },

    /// Tensor description is unusable
    #[error("Invalid tensor description: {0}")]
    InvalidTensor(#[from] TransformError),

    /// Payload bytes could not be decoded or encoded
    #[error("Metadata payload codec error: {0}")]
    Codec(String),
}
