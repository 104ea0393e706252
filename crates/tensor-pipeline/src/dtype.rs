//! Tensor element types

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TensorData;

/// Element type of a tensor as declared by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Unsigned 8-bit integer (quantized images and scores)
    Uint8,
    /// Signed 8-bit integer
    Int8,
    /// Signed 32-bit integer
    Int32,
    /// 32-bit IEEE 754 floating point
    Float32,
}

impl DataType {
    /// Size of a single element in bytes
    pub fn size_bytes(self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Int32 | DataType::Float32 => 4,
        }
    }

    /// Whether the type can carry quantized values
    pub fn is_integer(self) -> bool {
        !matches!(self, DataType::Float32)
    }

    /// Smallest and largest representable value, as f32
    pub fn range(self) -> (f32, f32) {
        match self {
            DataType::Uint8 => (u8::MIN as f32, u8::MAX as f32),
            DataType::Int8 => (i8::MIN as f32, i8::MAX as f32),
            DataType::Int32 => (i32::MIN as f32, i32::MAX as f32),
            DataType::Float32 => (f32::MIN, f32::MAX),
        }
    }

    /// Get string representation
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Uint8 => "uint8",
            DataType::Int8 => "int8",
            DataType::Int32 => "int32",
            DataType::Float32 => "float32",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rust scalar backing a [`DataType`]
///
/// Conversions from `f32` round half away from zero and saturate at the
/// bounds of the target type; NaN maps to zero.
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DataType;

    fn to_f32(self) -> f32;

    fn from_f32(value: f32) -> Self;

    fn wrap(array: ArrayD<Self>) -> TensorData;

    fn view(data: &TensorData) -> Option<&ArrayD<Self>>;
}

impl Element for u8 {
    const DTYPE: DataType = DataType::Uint8;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        // `as` saturates float -> int casts
        value.round() as u8
    }

    fn wrap(array: ArrayD<Self>) -> TensorData {
        TensorData::Uint8(array)
    }

    fn view(data: &TensorData) -> Option<&ArrayD<Self>> {
        match data {
            TensorData::Uint8(array) => Some(array),
            _ => None,
        }
    }
}

impl Element for i8 {
    const DTYPE: DataType = DataType::Int8;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.round() as i8
    }

    fn wrap(array: ArrayD<Self>) -> TensorData {
        TensorData::Int8(array)
    }

    fn view(data: &TensorData) -> Option<&ArrayD<Self>> {
        match data {
            TensorData::Int8(array) => Some(array),
            _ => None,
        }
    }
}

impl Element for i32 {
    const DTYPE: DataType = DataType::Int32;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.round() as i32
    }

    fn wrap(array: ArrayD<Self>) -> TensorData {
        TensorData::Int32(array)
    }

    fn view(data: &TensorData) -> Option<&ArrayD<Self>> {
        match data {
            TensorData::Int32(array) => Some(array),
            _ => None,
        }
    }
}

impl Element for f32 {
    const DTYPE: DataType = DataType::Float32;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }

    fn wrap(array: ArrayD<Self>) -> TensorData {
        TensorData::Float32(array)
    }

    fn view(data: &TensorData) -> Option<&ArrayD<Self>> {
        match data {
            TensorData::Float32(array) => Some(array),
            _ => None,
        }
    }
}
