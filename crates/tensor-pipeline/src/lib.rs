//! Tensor Transformation Pipeline
//!
//! Provides typed tensor buffers and an ordered chain of transformation stages
//! used to prepare model inputs and interpret model outputs:
//! - Resize (nearest neighbor or bilinear)
//! - Grayscale and RGB channel conversion
//! - Per-channel normalization
//! - Affine quantization / dequantization
//! - Element type casting

mod buffer;
mod dtype;
mod error;
mod pipeline;
mod spec;
mod stage;
mod tensor_image;

pub use buffer::{TensorBuffer, TensorData};
pub use dtype::{DataType, Element};
pub use error::TransformError;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use spec::{NormalizationParams, QuantizationParams, TensorSpec};
pub use stage::{PipelineStage, ResizeMethod};
pub use tensor_image::TensorImage;
