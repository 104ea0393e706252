//! Tensor descriptions and stage parameters

use serde::{Deserialize, Serialize};

use crate::{DataType, TransformError};

/// Affine quantization mapping `real = (q - zero_point) * scale`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantizationParams {
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }
}

/// Shape, element type and quantization of a model tensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorSpec {
    shape: Vec<usize>,
    dtype: DataType,
    quantization: Option<QuantizationParams>,
}

impl TensorSpec {
    /// Create a tensor spec
    ///
    /// A quantization record with a zero scale means the tensor is not
    /// quantized and is dropped.
    pub fn new(
        shape: Vec<usize>,
        dtype: DataType,
        quantization: Option<QuantizationParams>,
    ) -> Result<Self, TransformError> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(TransformError::InvalidParameter(format!(
                "tensor shape must be non-empty with positive dimensions, got {shape:?}"
            )));
        }

        let quantization = quantization.filter(|q| q.scale != 0.0);
        if let Some(q) = quantization {
            if !dtype.is_integer() {
                return Err(TransformError::InvalidParameter(format!(
                    "quantized tensor must have an integer type, got {dtype}"
                )));
            }
            if !q.scale.is_finite() {
                return Err(TransformError::InvalidParameter(format!(
                    "quantization scale must be finite, got {}",
                    q.scale
                )));
            }
        }

        Ok(Self {
            shape,
            dtype,
            quantization,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn quantization(&self) -> Option<QuantizationParams> {
        self.quantization
    }

    pub fn is_quantized(&self) -> bool {
        self.quantization.is_some()
    }

    /// Total number of elements
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Product of all dimensions after the leading batch dimension
    pub fn per_item_count(&self) -> usize {
        self.shape.iter().skip(1).product()
    }
}

/// Mean/standard-deviation pair used by the normalize stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizationParams {
    mean: Vec<f32>,
    stddev: Vec<f32>,
}

impl NormalizationParams {
    /// Create normalization parameters
    ///
    /// Both sequences must have the same non-zero length and no standard
    /// deviation may be zero. A length of one broadcasts over all channels.
    pub fn new(mean: Vec<f32>, stddev: Vec<f32>) -> Result<Self, TransformError> {
        if mean.is_empty() || mean.len() != stddev.len() {
            return Err(TransformError::InvalidParameter(format!(
                "mean ({}) and stddev ({}) must have the same non-zero length",
                mean.len(),
                stddev.len()
            )));
        }
        if let Some(index) = stddev.iter().position(|&s| s == 0.0) {
            return Err(TransformError::InvalidParameter(format!(
                "stddev[{index}] is zero"
            )));
        }
        Ok(Self { mean, stddev })
    }

    /// Scalar parameters broadcast to every channel
    pub fn scalar(mean: f32, stddev: f32) -> Result<Self, TransformError> {
        Self::new(vec![mean], vec![stddev])
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn stddev(&self) -> &[f32] {
        &self.stddev
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// True when applying the parameters would not change any value
    pub fn is_identity(&self) -> bool {
        self.mean.iter().all(|&m| m == 0.0) && self.stddev.iter().all(|&s| s == 1.0)
    }

    /// Whether the parameters apply to a tensor with `channels` channels
    pub fn fits_channels(&self, channels: usize) -> bool {
        self.len() == 1 || self.len() == channels
    }

    /// Mean and stddev for a channel, honoring scalar broadcast
    pub fn for_channel(&self, channel: usize) -> (f32, f32) {
        if self.len() == 1 {
            (self.mean[0], self.stddev[0])
        } else {
            (self.mean[channel], self.stddev[channel])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantized_spec_requires_integer_type() {
        let q = Some(QuantizationParams::new(0.5, 0));
        assert!(TensorSpec::new(vec![1, 4], DataType::Uint8, q).is_ok());
        assert!(TensorSpec::new(vec![1, 4], DataType::Float32, q).is_err());
    }

    #[test]
    fn test_zero_scale_means_not_quantized() {
        let spec = TensorSpec::new(
            vec![1, 10],
            DataType::Float32,
            Some(QuantizationParams::new(0.0, 0)),
        )
        .unwrap();
        assert!(!spec.is_quantized());
    }

    #[test]
    fn test_spec_rejects_empty_or_zero_shape() {
        assert!(TensorSpec::new(vec![], DataType::Uint8, None).is_err());
        assert!(TensorSpec::new(vec![1, 0, 3], DataType::Uint8, None).is_err());
    }

    #[test]
    fn test_element_counts() {
        let spec = TensorSpec::new(vec![2, 28, 28, 1], DataType::Uint8, None).unwrap();
        assert_eq!(spec.element_count(), 2 * 28 * 28);
        assert_eq!(spec.per_item_count(), 28 * 28);
    }

    #[test]
    fn test_normalization_validation() {
        assert!(NormalizationParams::new(vec![0.0], vec![0.0]).is_err());
        assert!(NormalizationParams::new(vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(NormalizationParams::new(vec![], vec![]).is_err());

        let params = NormalizationParams::new(vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]).unwrap();
        assert!(params.fits_channels(3));
        assert!(!params.fits_channels(1));
        assert_eq!(params.for_channel(2), (3.0, 6.0));
    }

    #[test]
    fn test_scalar_normalization_broadcasts() {
        let params = NormalizationParams::scalar(127.5, 127.5).unwrap();
        assert!(params.fits_channels(1));
        assert!(params.fits_channels(3));
        assert_eq!(params.for_channel(2), (127.5, 127.5));
        assert!(NormalizationParams::scalar(0.0, 1.0).unwrap().is_identity());
    }
}
