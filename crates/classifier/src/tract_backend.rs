//! ONNX models through tract
//!
//! A model source `name` resolves to `<model_dir>/name` (the ONNX graph) and
//! `<model_dir>/name.metadata` (the packaged metadata payload).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use model_metadata::{MetadataError, TensorIntrospection};
use tensor_pipeline::{DataType, QuantizationParams, TensorBuffer, TensorData, TensorSpec};
use tracing::{debug, info, warn};
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::internal::DimLike;

use crate::{ClassifierError, Device, InferenceEngine, LoadedModel, ModelLoader, ModelOptions};

/// Loads ONNX models and their metadata from a directory
#[derive(Debug, Clone)]
pub struct TractModelLoader {
    model_dir: PathBuf,
}

impl TractModelLoader {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    pub fn model_path(&self, source: &str) -> PathBuf {
        self.model_dir.join(source)
    }

    pub fn metadata_path(&self, source: &str) -> PathBuf {
        self.model_dir.join(format!("{source}.metadata"))
    }
}

impl ModelLoader for TractModelLoader {
    type Engine = TractEngine;

    fn load_model(
        &self,
        source: &str,
        options: &ModelOptions,
    ) -> Result<LoadedModel<TractEngine>, ClassifierError> {
        if options.device != Device::Cpu {
            warn!(
                "Device {} not available with tract, falling back to cpu",
                options.device.as_str()
            );
        }
        if options.num_threads > 1 {
            debug!(
                "tract runs single-threaded, ignoring num_threads={}",
                options.num_threads
            );
        }

        let metadata_path = self.metadata_path(source);
        let metadata = std::fs::read(&metadata_path)
            .map_err(|e| ClassifierError::Load(format!("{}: {e}", metadata_path.display())))?;
        let engine = TractEngine::from_path(&self.model_path(source))?;

        Ok(LoadedModel { engine, metadata })
    }
}

/// Optimized tract plan with its input/output descriptions
pub struct TractEngine {
    plan: Option<TypedRunnableModel<TypedModel>>,
    input: TensorSpec,
    output: TensorSpec,
}

impl TractEngine {
    /// Load and optimize an ONNX graph
    pub fn from_path(path: &Path) -> Result<Self, ClassifierError> {
        info!("Loading ONNX model: {}", path.display());
        let load_error = |e: TractError| ClassifierError::Load(format!("{}: {e:#}", path.display()));

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.into_optimized())
            .map_err(load_error)?;

        let input = describe(model.input_fact(0).map_err(load_error)?, "input")?;
        let output = describe(model.output_fact(0).map_err(load_error)?, "output")?;
        debug!(
            "ONNX input {:?} {}, output {:?} {}",
            input.shape(),
            input.dtype(),
            output.shape(),
            output.dtype()
        );

        let plan = model.into_runnable().map_err(load_error)?;
        Ok(Self {
            plan: Some(plan),
            input,
            output,
        })
    }
}

impl TensorIntrospection for TractEngine {
    fn input_tensor(&self, index: usize) -> Result<TensorSpec, MetadataError> {
        match index {
            0 => Ok(self.input.clone()),
            _ => Err(single_tensor("input", index)),
        }
    }

    fn output_tensor(&self, index: usize) -> Result<TensorSpec, MetadataError> {
        match index {
            0 => Ok(self.output.clone()),
            _ => Err(single_tensor("output", index)),
        }
    }
}

impl InferenceEngine for TractEngine {
    fn invoke(
        &mut self,
        mut inputs: HashMap<usize, TensorBuffer>,
    ) -> Result<HashMap<usize, TensorBuffer>, ClassifierError> {
        let plan = self.plan.as_ref().ok_or(ClassifierError::Closed)?;
        let input = inputs
            .remove(&0)
            .ok_or_else(|| ClassifierError::Inference("missing input 0".to_string()))?;

        let inference_error = |e: TractError| ClassifierError::Inference(format!("{e:#}"));
        let tensor = to_tract(&input).map_err(inference_error)?;
        let outputs = plan.run(tvec!(tensor.into())).map_err(inference_error)?;
        let output = outputs
            .first()
            .ok_or_else(|| ClassifierError::Inference("model produced no outputs".to_string()))?;

        let buffer = from_tract(output).map_err(inference_error)?;
        Ok(HashMap::from([(0, buffer)]))
    }

    fn release(&mut self) -> Result<(), ClassifierError> {
        if self.plan.take().is_some() {
            debug!("tract plan released");
        }
        Ok(())
    }
}

fn single_tensor(direction: &'static str, index: usize) -> MetadataError {
    MetadataError::Tensor {
        direction,
        index,
        reason: "only tensor 0 is exposed".to_string(),
    }
}

/// Tensor spec of a typed fact; symbolic dimensions count as 1
fn describe(fact: &TypedFact, direction: &'static str) -> Result<TensorSpec, MetadataError> {
    let shape: Vec<usize> = fact
        .shape
        .iter()
        .map(|dim| dim.to_usize().unwrap_or(1))
        .collect();
    let dtype = data_type(fact.datum_type).ok_or_else(|| MetadataError::Tensor {
        direction,
        index: 0,
        reason: format!("unsupported element type {:?}", fact.datum_type),
    })?;
    let quantization = fact.datum_type.qparams().map(|q| {
        let (zero_point, scale) = q.zp_scale();
        QuantizationParams::new(scale, zero_point)
    });
    Ok(TensorSpec::new(shape, dtype, quantization)?)
}

fn data_type(datum_type: DatumType) -> Option<DataType> {
    match datum_type.unquantized() {
        DatumType::U8 => Some(DataType::Uint8),
        DatumType::I8 => Some(DataType::Int8),
        DatumType::I32 => Some(DataType::Int32),
        DatumType::F32 => Some(DataType::Float32),
        _ => None,
    }
}

fn to_tract(buffer: &TensorBuffer) -> TractResult<Tensor> {
    let shape = buffer.shape();
    match buffer.data() {
        TensorData::Uint8(a) => Tensor::from_shape(shape, &a.iter().copied().collect::<Vec<_>>()),
        TensorData::Int8(a) => Tensor::from_shape(shape, &a.iter().copied().collect::<Vec<_>>()),
        TensorData::Int32(a) => Tensor::from_shape(shape, &a.iter().copied().collect::<Vec<_>>()),
        TensorData::Float32(a) => Tensor::from_shape(shape, &a.iter().copied().collect::<Vec<_>>()),
    }
}

fn from_tract(tensor: &Tensor) -> TractResult<TensorBuffer> {
    let shape = tensor.shape();
    let buffer = match data_type(tensor.datum_type()) {
        Some(DataType::Uint8) => TensorBuffer::from_vec(shape, tensor.as_slice::<u8>()?.to_vec()),
        Some(DataType::Int8) => TensorBuffer::from_vec(shape, tensor.as_slice::<i8>()?.to_vec()),
        Some(DataType::Int32) => TensorBuffer::from_vec(shape, tensor.as_slice::<i32>()?.to_vec()),
        Some(DataType::Float32) | None => {
            let values = tensor.cast_to::<f32>()?;
            TensorBuffer::from_vec(shape, values.as_slice::<f32>()?.to_vec())
        }
    };
    Ok(buffer?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_resolve_under_model_dir() {
        let loader = TractModelLoader::new("/models");
        assert_eq!(loader.model_path("net.onnx"), PathBuf::from("/models/net.onnx"));
        assert_eq!(
            loader.metadata_path("net.onnx"),
            PathBuf::from("/models/net.onnx.metadata")
        );
    }

    #[test]
    fn test_missing_files_are_load_errors() {
        let loader = TractModelLoader::new("/nonexistent-model-dir");
        let err = loader
            .load_model("net.onnx", &ModelOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::Load(_)));

        let err = TractEngine::from_path(Path::new("/nonexistent-model-dir/net.onnx"))
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::Load(_)));
    }

    #[test]
    fn test_buffers_convert_to_and_from_tract() {
        let buffer = TensorBuffer::from_vec(&[1, 2, 2], vec![1u8, 2, 3, 250]).unwrap();
        let tensor = to_tract(&buffer).unwrap();
        assert_eq!(tensor.shape(), &[1, 2, 2]);
        assert_eq!(tensor.datum_type(), DatumType::U8);
        assert_eq!(from_tract(&tensor).unwrap(), buffer);

        let floats = TensorBuffer::from_vec(&[3], vec![0.5f32, -1.0, 2.0]).unwrap();
        assert_eq!(from_tract(&to_tract(&floats).unwrap()).unwrap(), floats);
    }

    #[test]
    fn test_unsupported_types_widen_to_f32() {
        let tensor = Tensor::from_shape(&[2], &[3i64, -4]).unwrap();
        let buffer = from_tract(&tensor).unwrap();
        assert_eq!(buffer.dtype(), DataType::Float32);
        assert_eq!(buffer.to_f32_vec(), vec![3.0, -4.0]);
    }

    #[test]
    fn test_quantized_facts_carry_params() {
        let datum_type = u8::datum_type().quantize(QParams::ZpScale {
            zero_point: 128,
            scale: 0.0078,
        });
        let fact = TypedFact::dt_shape(datum_type, [1usize, 10]);
        let spec = describe(&fact, "output").unwrap();
        assert_eq!(spec.shape(), &[1, 10]);
        assert_eq!(spec.dtype(), DataType::Uint8);
        assert_eq!(spec.quantization(), Some(QuantizationParams::new(0.0078, 128)));
    }
}
