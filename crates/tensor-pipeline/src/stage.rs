//! Pipeline stages
//!
//! Each stage consumes the buffer produced by the previous one and returns a
//! new buffer whose shape and element type describe the evolving tensor.

use ndarray::{Array3, ArrayD, ArrayView3, Axis, Ix3};
use serde::{Deserialize, Serialize};

use crate::buffer::{with_array, TensorData};
use crate::{DataType, Element, NormalizationParams, QuantizationParams, TensorBuffer, TransformError};

/// Luminance weights for R, G, B
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Interpolation used by the resize stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeMethod {
    /// Copy the closest source pixel
    #[default]
    NearestNeighbor,
    /// Weighted average of the four surrounding pixels
    Bilinear,
}

/// One transformation step
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    /// Resize the spatial dimensions of a `[height, width, channels]` buffer
    Resize {
        height: usize,
        width: usize,
        method: ResizeMethod,
    },
    /// Collapse RGB(A) channels into a single luminance channel
    Grayscale,
    /// Replicate a luminance channel into RGB, dropping alpha
    Rgb,
    /// `(v - mean[c]) / stddev[c]`, producing float32
    Normalize(NormalizationParams),
    /// `round(v / scale) + zero_point`, clamped to the target integer type
    Quantize {
        params: QuantizationParams,
        target: DataType,
    },
    /// `(v - zero_point) * scale`, producing float32
    Dequantize(QuantizationParams),
    /// Convert the element type
    Cast(DataType),
}

impl PipelineStage {
    /// Resize stage with validated target size
    pub fn resize(height: usize, width: usize, method: ResizeMethod) -> Result<Self, TransformError> {
        check_resize_target(height, width)?;
        Ok(PipelineStage::Resize {
            height,
            width,
            method,
        })
    }

    pub fn normalize(params: NormalizationParams) -> Self {
        PipelineStage::Normalize(params)
    }

    /// Quantize stage into an integer type
    pub fn quantize(params: QuantizationParams, target: DataType) -> Result<Self, TransformError> {
        check_quantization("quantize", params)?;
        check_integer_target(target)?;
        Ok(PipelineStage::Quantize { params, target })
    }

    pub fn dequantize(params: QuantizationParams) -> Result<Self, TransformError> {
        check_quantization("dequantize", params)?;
        Ok(PipelineStage::Dequantize(params))
    }

    pub fn cast(dtype: DataType) -> Self {
        PipelineStage::Cast(dtype)
    }

    /// Stage name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Resize { .. } => "resize",
            PipelineStage::Grayscale => "grayscale",
            PipelineStage::Rgb => "rgb",
            PipelineStage::Normalize(_) => "normalize",
            PipelineStage::Quantize { .. } => "quantize",
            PipelineStage::Dequantize(_) => "dequantize",
            PipelineStage::Cast(_) => "cast",
        }
    }

    /// Apply the stage to a buffer
    pub fn apply(&self, input: TensorBuffer) -> Result<TensorBuffer, TransformError> {
        match self {
            PipelineStage::Resize {
                height,
                width,
                method,
            } => resize(input, *height, *width, *method),
            PipelineStage::Grayscale => grayscale(input),
            PipelineStage::Rgb => rgb(input),
            PipelineStage::Normalize(params) => normalize(input, params),
            PipelineStage::Quantize { params, target } => quantize(input, *params, *target),
            PipelineStage::Dequantize(params) => dequantize(input, *params),
            PipelineStage::Cast(dtype) => Ok(input.cast(*dtype)),
        }
    }
}

fn check_resize_target(height: usize, width: usize) -> Result<(), TransformError> {
    if height == 0 || width == 0 {
        return Err(TransformError::InvalidParameter(format!(
            "resize target must be positive, got {height}x{width}"
        )));
    }
    Ok(())
}

fn check_quantization(stage: &'static str, params: QuantizationParams) -> Result<(), TransformError> {
    if params.scale == 0.0 || !params.scale.is_finite() {
        return Err(TransformError::InvalidParameter(format!(
            "{stage}: scale must be finite and non-zero, got {}",
            params.scale
        )));
    }
    Ok(())
}

fn check_integer_target(target: DataType) -> Result<(), TransformError> {
    if !target.is_integer() {
        return Err(TransformError::InvalidParameter(format!(
            "quantize target must be an integer type, got {target}"
        )));
    }
    Ok(())
}

fn require_image(stage: &'static str, input: &TensorBuffer) -> Result<(), TransformError> {
    if input.rank() != 3 {
        return Err(TransformError::RankMismatch {
            stage,
            expected: 3,
            actual: input.shape().to_vec(),
        });
    }
    Ok(())
}

fn as_image<'a, T: Element>(
    stage: &'static str,
    array: &'a ArrayD<T>,
) -> Result<ArrayView3<'a, T>, TransformError> {
    array
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|_| TransformError::RankMismatch {
            stage,
            expected: 3,
            actual: array.shape().to_vec(),
        })
}

fn resize(
    input: TensorBuffer,
    height: usize,
    width: usize,
    method: ResizeMethod,
) -> Result<TensorBuffer, TransformError> {
    check_resize_target(height, width)?;
    require_image("resize", &input)?;
    if input.shape()[0] == 0 || input.shape()[1] == 0 {
        return Err(TransformError::InvalidParameter(format!(
            "resize: source image must not be empty, got shape {:?}",
            input.shape()
        )));
    }
    if input.shape()[0] == height && input.shape()[1] == width {
        return Ok(input);
    }

    with_array!(input.data(), a => {
        let src = as_image("resize", a)?;
        let resized = match method {
            ResizeMethod::NearestNeighbor => resize_nearest(src, height, width),
            ResizeMethod::Bilinear => resize_bilinear(src, height, width),
        };
        Ok(TensorBuffer::from_array(resized.into_dyn()))
    })
}

fn resize_nearest<T: Element>(src: ArrayView3<'_, T>, height: usize, width: usize) -> Array3<T> {
    let (src_h, src_w, channels) = src.dim();
    let y_ratio = src_h as f32 / height as f32;
    let x_ratio = src_w as f32 / width as f32;

    Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
        let sy = ((y as f32 * y_ratio) as usize).min(src_h - 1);
        let sx = ((x as f32 * x_ratio) as usize).min(src_w - 1);
        src[[sy, sx, c]]
    })
}

fn resize_bilinear<T: Element>(src: ArrayView3<'_, T>, height: usize, width: usize) -> Array3<T> {
    let (src_h, src_w, channels) = src.dim();
    let y_ratio = src_h as f32 / height as f32;
    let x_ratio = src_w as f32 / width as f32;

    // Half-pixel centers, clamped to the source edges
    let sample = |pos: usize, ratio: f32, limit: usize| -> (usize, usize, f32) {
        let s = ((pos as f32 + 0.5) * ratio - 0.5).max(0.0);
        let lo = (s.floor() as usize).min(limit - 1);
        let hi = (lo + 1).min(limit - 1);
        (lo, hi, s - lo as f32)
    };

    Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
        let (y0, y1, fy) = sample(y, y_ratio, src_h);
        let (x0, x1, fx) = sample(x, x_ratio, src_w);
        let top = src[[y0, x0, c]].to_f32() * (1.0 - fx) + src[[y0, x1, c]].to_f32() * fx;
        let bottom = src[[y1, x0, c]].to_f32() * (1.0 - fx) + src[[y1, x1, c]].to_f32() * fx;
        T::from_f32(top * (1.0 - fy) + bottom * fy)
    })
}

fn grayscale(input: TensorBuffer) -> Result<TensorBuffer, TransformError> {
    require_image("grayscale", &input)?;
    let channels = input.shape()[2];
    match channels {
        1 => Ok(input),
        // Alpha is ignored
        3 | 4 => with_array!(input.data(), a => {
            let src = as_image("grayscale", a)?;
            Ok(TensorBuffer::from_array(luminance(src).into_dyn()))
        }),
        _ => Err(TransformError::ChannelMismatch {
            stage: "grayscale",
            params: LUMA_WEIGHTS.len(),
            channels,
        }),
    }
}

fn luminance<T: Element>(src: ArrayView3<'_, T>) -> Array3<T> {
    let (height, width, _) = src.dim();
    Array3::from_shape_fn((height, width, 1), |(y, x, _)| {
        let luma: f32 = LUMA_WEIGHTS
            .iter()
            .enumerate()
            .map(|(c, weight)| src[[y, x, c]].to_f32() * weight)
            .sum();
        T::from_f32(luma)
    })
}

fn rgb(input: TensorBuffer) -> Result<TensorBuffer, TransformError> {
    require_image("rgb", &input)?;
    let channels = input.shape()[2];
    match channels {
        3 => Ok(input),
        1 | 4 => with_array!(input.data(), a => {
            let src = as_image("rgb", a)?;
            let (height, width, _) = src.dim();
            let expanded = Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
                src[[y, x, if channels == 1 { 0 } else { c }]]
            });
            Ok(TensorBuffer::from_array(expanded.into_dyn()))
        }),
        _ => Err(TransformError::ChannelMismatch {
            stage: "rgb",
            params: 3,
            channels,
        }),
    }
}

fn normalize(input: TensorBuffer, params: &NormalizationParams) -> Result<TensorBuffer, TransformError> {
    if params.is_identity() {
        return Ok(input);
    }
    let Some(&channels) = input.shape().last() else {
        return Err(TransformError::RankMismatch {
            stage: "normalize",
            expected: 1,
            actual: Vec::new(),
        });
    };
    if !params.fits_channels(channels) {
        return Err(TransformError::ChannelMismatch {
            stage: "normalize",
            params: params.len(),
            channels,
        });
    }

    let mut values = input.to_f32_array();
    let last = Axis(values.ndim() - 1);
    for mut lane in values.lanes_mut(last) {
        for (c, v) in lane.iter_mut().enumerate() {
            let (mean, stddev) = params.for_channel(c);
            *v = (*v - mean) / stddev;
        }
    }
    Ok(TensorBuffer::from_array(values))
}

fn quantize(
    input: TensorBuffer,
    params: QuantizationParams,
    target: DataType,
) -> Result<TensorBuffer, TransformError> {
    check_quantization("quantize", params)?;
    check_integer_target(target)?;
    let zero_point = params.zero_point as f32;
    let quantized = |v: f32| (v / params.scale).round() + zero_point;
    let values = input.to_f32_array();

    let buffer = match target {
        DataType::Uint8 => TensorBuffer::from_array(values.mapv(|v| u8::from_f32(quantized(v)))),
        DataType::Int8 => TensorBuffer::from_array(values.mapv(|v| i8::from_f32(quantized(v)))),
        DataType::Int32 => TensorBuffer::from_array(values.mapv(|v| i32::from_f32(quantized(v)))),
        DataType::Float32 => unreachable!("integer target checked above"),
    };
    Ok(buffer)
}

fn dequantize(input: TensorBuffer, params: QuantizationParams) -> Result<TensorBuffer, TransformError> {
    check_quantization("dequantize", params)?;
    let zero_point = params.zero_point as f32;
    let values = input
        .to_f32_array()
        .mapv(|v| (v - zero_point) * params.scale);
    Ok(TensorBuffer::from_array(values))
}
