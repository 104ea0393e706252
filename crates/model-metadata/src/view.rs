//! Model metadata snapshot

use std::sync::Arc;

use tensor_pipeline::{
    DataType, NormalizationParams, Pipeline, PipelineStage, QuantizationParams, ResizeMethod,
    TensorSpec, TransformError,
};
use tracing::{debug, info};

use crate::{
    decode_f32s, load_labels, AssociatedFiles, MetadataError, MetadataPayload, ProcessUnit,
    TensorIntrospection,
};

/// Decoded metadata payload of a packaged model
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataView {
    payload: MetadataPayload,
}

impl MetadataView {
    pub fn new(payload: MetadataPayload) -> Self {
        Self { payload }
    }

    /// Decode the raw payload bytes
    pub fn parse(raw: &[u8]) -> Result<Self, MetadataError> {
        MetadataPayload::from_bytes(raw).map(Self::new)
    }

    pub fn payload(&self) -> &MetadataPayload {
        &self.payload
    }

    /// Build the snapshot, resolving associated files from the payload itself
    pub fn extract<T>(&self, tensors: &T) -> Result<ModelMetadata, MetadataError>
    where
        T: TensorIntrospection + ?Sized,
    {
        self.extract_with(tensors, &self.payload)
    }

    /// Build the snapshot, resolving associated files through `files`
    ///
    /// Tensor shapes, types and quantization come from `tensors`; the payload
    /// only contributes normalization constants and the label file.
    pub fn extract_with<T, F>(&self, tensors: &T, files: &F) -> Result<ModelMetadata, MetadataError>
    where
        T: TensorIntrospection + ?Sized,
        F: AssociatedFiles + ?Sized,
    {
        let input = tensors.input_tensor(0)?;
        let normalization = self.normalization()?;
        check_normalization_channels(&normalization, &input)?;
        let output = tensors.output_tensor(0)?;

        let label_file = self.label_file()?;
        let labels = load_labels(&files.load_associated_file(label_file)?)?;
        check_label_count(&labels, &output)?;

        info!(
            "Model metadata: {} {} input {:?} {} output {:?} {} with {} labels",
            self.payload.name,
            self.payload.version,
            input.shape(),
            input.dtype(),
            output.shape(),
            output.dtype(),
            labels.len()
        );

        Ok(ModelMetadata {
            name: self.payload.name.clone(),
            version: self.payload.version.clone(),
            input,
            normalization,
            output,
            labels: labels.into(),
        })
    }

    /// Normalization constants from the first process unit of input 0
    pub fn normalization(&self) -> Result<NormalizationParams, MetadataError> {
        let record = self
            .payload
            .input_tensor(0)
            .ok_or(MetadataError::MissingField("input tensor metadata"))?;
        let unit = record
            .process_units
            .first()
            .ok_or(MetadataError::MissingField("normalization options"))?;

        let ProcessUnit::Normalization { mean, std } = unit else {
            return Err(MetadataError::Malformed {
                field: "normalization options",
                reason: format!("first process unit is {unit:?}"),
            });
        };

        let mean = decode_f32s("normalization mean", mean)?;
        let stddev = decode_f32s("normalization std", std)?;
        debug!("Normalization mean {:?} std {:?}", mean, stddev);

        NormalizationParams::new(mean, stddev).map_err(|e| MetadataError::Malformed {
            field: "normalization options",
            reason: e.to_string(),
        })
    }

    /// Name of the first associated file of output 0
    pub fn label_file(&self) -> Result<&str, MetadataError> {
        let record = self
            .payload
            .output_tensor(0)
            .ok_or(MetadataError::MissingField("output tensor metadata"))?;
        record
            .associated_files
            .first()
            .map(|file| file.name.as_str())
            .ok_or(MetadataError::MissingField("label file reference"))
    }
}

fn check_normalization_channels(
    normalization: &NormalizationParams,
    input: &TensorSpec,
) -> Result<(), MetadataError> {
    let channels = input.shape().last().copied().unwrap_or(1);
    if normalization.fits_channels(channels) {
        Ok(())
    } else {
        Err(MetadataError::Malformed {
            field: "normalization options",
            reason: format!(
                "{} values for input with {} channels",
                normalization.len(),
                channels
            ),
        })
    }
}

fn check_label_count(labels: &[String], output: &TensorSpec) -> Result<(), MetadataError> {
    let count = labels.len();
    // A rank-1 output has no batch dimension to strip
    let per_item = (output.shape().len() >= 2).then(|| output.per_item_count());
    if count == output.element_count() || Some(count) == per_item {
        Ok(())
    } else {
        Err(MetadataError::LabelCountMismatch {
            labels: count,
            shape: output.shape().to_vec(),
        })
    }
}

/// Immutable description of a classifier model
///
/// Cloning shares the label list.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    name: String,
    version: String,
    input: TensorSpec,
    normalization: NormalizationParams,
    output: TensorSpec,
    labels: Arc<[String]>,
}

impl ModelMetadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn input_spec(&self) -> &TensorSpec {
        &self.input
    }

    pub fn input_shape(&self) -> &[usize] {
        self.input.shape()
    }

    pub fn input_dtype(&self) -> DataType {
        self.input.dtype()
    }

    pub fn input_quantization(&self) -> Option<QuantizationParams> {
        self.input.quantization()
    }

    pub fn normalization(&self) -> &NormalizationParams {
        &self.normalization
    }

    pub fn output_spec(&self) -> &TensorSpec {
        &self.output
    }

    pub fn output_shape(&self) -> &[usize] {
        self.output.shape()
    }

    pub fn output_dtype(&self) -> DataType {
        self.output.dtype()
    }

    pub fn output_quantization(&self) -> Option<QuantizationParams> {
        self.output.quantization()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Shared handle to the label list
    pub fn shared_labels(&self) -> Arc<[String]> {
        Arc::clone(&self.labels)
    }

    /// Resize, channel conversion, normalize, optional quantize, cast
    ///
    /// The input tensor must be `[batch, height, width, channels]`. Grayscale
    /// is inserted for single-channel models and RGB for three-channel
    /// models; quantize only when the input is quantized.
    pub fn default_input_pipeline(&self) -> Result<Pipeline, MetadataError> {
        let shape = self.input.shape();
        if shape.len() != 4 {
            return Err(TransformError::RankMismatch {
                stage: "resize",
                expected: 4,
                actual: shape.to_vec(),
            }
            .into());
        }

        let channels = match shape[3] {
            1 => Some(PipelineStage::Grayscale),
            3 => Some(PipelineStage::Rgb),
            _ => None,
        };
        let quantize = self
            .input
            .quantization()
            .map(|q| PipelineStage::quantize(q, self.input.dtype()))
            .transpose()?;

        Ok(Pipeline::builder()
            .add(PipelineStage::resize(
                shape[1],
                shape[2],
                ResizeMethod::NearestNeighbor,
            )?)
            .add_optional(channels)
            .add(PipelineStage::normalize(self.normalization.clone()))
            .add_optional(quantize)
            .add(PipelineStage::cast(self.input.dtype()))
            .build())
    }

    /// Dequantize when the output is quantized, identity otherwise
    pub fn default_output_pipeline(&self) -> Result<Pipeline, MetadataError> {
        let dequantize = self
            .output
            .quantization()
            .map(PipelineStage::dequantize)
            .transpose()?;
        Ok(Pipeline::builder().add_optional(dequantize).build())
    }
}
