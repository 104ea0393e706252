//! Typed tensor buffers

use ndarray::{ArrayD, IxDyn};

use crate::{DataType, Element, TensorSpec, TransformError};

/// Storage of a tensor, one variant per supported element type
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Uint8(ArrayD<u8>),
    Int8(ArrayD<i8>),
    Int32(ArrayD<i32>),
    Float32(ArrayD<f32>),
}

/// Runs `$body` with `$array` bound to the typed array of any variant.
macro_rules! with_array {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            TensorData::Uint8($array) => $body,
            TensorData::Int8($array) => $body,
            TensorData::Int32($array) => $body,
            TensorData::Float32($array) => $body,
        }
    };
}

pub(crate) use with_array;

/// Flat, typed, fixed-shape block of numeric data
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBuffer {
    data: TensorData,
}

impl TensorBuffer {
    /// Wrap an existing array
    pub fn from_array<T: Element>(array: ArrayD<T>) -> Self {
        Self {
            data: T::wrap(array),
        }
    }

    /// Build a buffer from row-major values
    pub fn from_vec<T: Element>(shape: &[usize], values: Vec<T>) -> Result<Self, TransformError> {
        let elements = values.len();
        let array = ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| {
            TransformError::ShapeMismatch {
                elements,
                shape: shape.to_vec(),
            }
        })?;
        Ok(Self::from_array(array))
    }

    /// Zero-filled buffer matching a tensor spec
    pub fn zeros(spec: &TensorSpec) -> Self {
        let shape = IxDyn(spec.shape());
        let data = match spec.dtype() {
            DataType::Uint8 => TensorData::Uint8(ArrayD::zeros(shape)),
            DataType::Int8 => TensorData::Int8(ArrayD::zeros(shape)),
            DataType::Int32 => TensorData::Int32(ArrayD::zeros(shape)),
            DataType::Float32 => TensorData::Float32(ArrayD::zeros(shape)),
        };
        Self { data }
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(&self.data, a => a.shape())
    }

    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        with_array!(&self.data, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DataType {
        match &self.data {
            TensorData::Uint8(_) => DataType::Uint8,
            TensorData::Int8(_) => DataType::Int8,
            TensorData::Int32(_) => DataType::Int32,
            TensorData::Float32(_) => DataType::Float32,
        }
    }

    /// Typed view of the storage, `None` if `T` is not the element type
    pub fn as_array<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::view(&self.data)
    }

    /// All values widened to `f32`, same shape
    pub fn to_f32_array(&self) -> ArrayD<f32> {
        with_array!(&self.data, a => a.mapv(|v| v.to_f32()))
    }

    /// All values widened to `f32` in row-major order
    pub fn to_f32_vec(&self) -> Vec<f32> {
        with_array!(&self.data, a => a.iter().map(|v| v.to_f32()).collect())
    }

    /// Convert to another element type
    ///
    /// Float to integer conversions round half away from zero and saturate.
    pub fn cast(&self, dtype: DataType) -> TensorBuffer {
        if dtype == self.dtype() {
            return self.clone();
        }
        let values = self.to_f32_array();
        let data = match dtype {
            DataType::Uint8 => TensorData::Uint8(values.mapv(u8::from_f32)),
            DataType::Int8 => TensorData::Int8(values.mapv(i8::from_f32)),
            DataType::Int32 => TensorData::Int32(values.mapv(i32::from_f32)),
            DataType::Float32 => TensorData::Float32(values),
        };
        TensorBuffer { data }
    }

    /// Same elements laid out under a new shape
    pub fn reshape(&self, shape: &[usize]) -> Result<TensorBuffer, TransformError> {
        let elements = self.len();
        if shape.iter().product::<usize>() != elements {
            return Err(TransformError::ShapeMismatch {
                elements,
                shape: shape.to_vec(),
            });
        }
        with_array!(&self.data, a => {
            let values: Vec<_> = a.iter().copied().collect();
            TensorBuffer::from_vec(shape, values)
        })
    }
}
