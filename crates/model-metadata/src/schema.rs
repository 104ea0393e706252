//! Metadata payload schema
//!
//! The payload is a postcard-encoded [`MetadataPayload`]. Only the fields the
//! classifier needs are modeled; associated files travel inside the payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{AssociatedFiles, MetadataError};

/// Top-level metadata record packaged with a model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataPayload {
    pub name: String,
    pub version: String,
    pub author: String,
    pub subgraphs: Vec<SubgraphMetadata>,
    /// Embedded associated files, keyed by name
    pub associated_files: BTreeMap<String, Vec<u8>>,
}

/// Per-subgraph tensor records, indexed like the model's tensors
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubgraphMetadata {
    pub input_tensors: Vec<TensorMetadata>,
    pub output_tensors: Vec<TensorMetadata>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TensorMetadata {
    pub name: String,
    pub description: String,
    pub process_units: Vec<ProcessUnit>,
    pub associated_files: Vec<AssociatedFile>,
}

/// Processing bound to a tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessUnit {
    /// Mean and standard deviation as little-endian `f32` bytes
    Normalization { mean: Vec<u8>, std: Vec<u8> },
    /// Unit this reader does not interpret
    Other { kind: String },
}

/// Reference to a file shipped alongside the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociatedFile {
    pub name: String,
    pub description: String,
    pub kind: AssociatedFileKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociatedFileKind {
    TensorAxisLabels,
    TensorValueLabels,
    Descriptions,
    Unknown,
}

impl MetadataPayload {
    /// Payload with one subgraph holding one input and one output record
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subgraphs: vec![SubgraphMetadata {
                input_tensors: vec![TensorMetadata::default()],
                output_tensors: vec![TensorMetadata::default()],
            }],
            ..Default::default()
        }
    }

    /// Decode a payload from its packaged bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetadataError> {
        postcard::from_bytes(bytes).map_err(|e| MetadataError::Codec(e.to_string()))
    }

    /// Encode the payload for packaging
    pub fn to_bytes(&self) -> Result<Vec<u8>, MetadataError> {
        postcard::to_allocvec(self).map_err(|e| MetadataError::Codec(e.to_string()))
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Bind normalization constants as the first process unit of input 0
    pub fn with_normalization(mut self, mean: &[f32], stddev: &[f32]) -> Self {
        let unit = ProcessUnit::Normalization {
            mean: encode_f32s(mean),
            std: encode_f32s(stddev),
        };
        self.input_record_mut().process_units.insert(0, unit);
        self
    }

    /// Embed a label file and reference it as the first associated file of output 0
    pub fn with_labels<S: AsRef<str>>(mut self, file_name: &str, labels: &[S]) -> Self {
        let mut contents = String::new();
        for label in labels {
            contents.push_str(label.as_ref());
            contents.push('\n');
        }
        self.associated_files
            .insert(file_name.to_string(), contents.into_bytes());
        self.output_record_mut().associated_files.insert(
            0,
            AssociatedFile {
                name: file_name.to_string(),
                description: "Labels for objects that the model can recognize.".to_string(),
                kind: AssociatedFileKind::TensorAxisLabels,
            },
        );
        self
    }

    /// Metadata record of input tensor `index` in the first subgraph
    pub fn input_tensor(&self, index: usize) -> Option<&TensorMetadata> {
        self.subgraphs.first()?.input_tensors.get(index)
    }

    /// Metadata record of output tensor `index` in the first subgraph
    pub fn output_tensor(&self, index: usize) -> Option<&TensorMetadata> {
        self.subgraphs.first()?.output_tensors.get(index)
    }

    fn first_subgraph_mut(&mut self) -> &mut SubgraphMetadata {
        if self.subgraphs.is_empty() {
            self.subgraphs.push(SubgraphMetadata::default());
        }
        &mut self.subgraphs[0]
    }

    fn input_record_mut(&mut self) -> &mut TensorMetadata {
        let subgraph = self.first_subgraph_mut();
        if subgraph.input_tensors.is_empty() {
            subgraph.input_tensors.push(TensorMetadata::default());
        }
        &mut subgraph.input_tensors[0]
    }

    fn output_record_mut(&mut self) -> &mut TensorMetadata {
        let subgraph = self.first_subgraph_mut();
        if subgraph.output_tensors.is_empty() {
            subgraph.output_tensors.push(TensorMetadata::default());
        }
        &mut subgraph.output_tensors[0]
    }
}

impl AssociatedFiles for MetadataPayload {
    fn load_associated_file(&self, name: &str) -> Result<Vec<u8>, MetadataError> {
        self.associated_files
            .get(name)
            .cloned()
            .ok_or_else(|| MetadataError::FileNotFound(name.to_string()))
    }
}

/// Little-endian bytes of a float sequence
pub fn encode_f32s(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Float sequence from little-endian bytes
pub fn decode_f32s(field: &'static str, bytes: &[u8]) -> Result<Vec<f32>, MetadataError> {
    if bytes.len() % 4 != 0 {
        return Err(MetadataError::Malformed {
            field,
            reason: format!("{} bytes is not a whole number of f32 values", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_survives_packaging() {
        let payload = MetadataPayload::new("fashion_mnist")
            .with_version("v1")
            .with_author("image-recognize")
            .with_normalization(&[0.0], &[255.0])
            .with_labels("labels.txt", &["a", "b"]);

        let bytes = payload.to_bytes().unwrap();
        assert_eq!(MetadataPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_truncated_payload_fails() {
        let bytes = MetadataPayload::new("m").to_bytes().unwrap();
        let err = MetadataPayload::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, MetadataError::Codec(_)));
    }

    #[test]
    fn test_float_bytes() {
        let bytes = encode_f32s(&[0.5, -2.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(decode_f32s("mean", &bytes).unwrap(), vec![0.5, -2.0]);
        assert!(decode_f32s("mean", &bytes[..7]).is_err());
    }

    #[test]
    fn test_embedded_files_resolve_by_name() {
        let payload = MetadataPayload::new("m").with_labels("labels.txt", &["x"]);
        assert_eq!(payload.load_associated_file("labels.txt").unwrap(), b"x\n");
        assert_eq!(
            payload.load_associated_file("missing.txt").unwrap_err(),
            MetadataError::FileNotFound("missing.txt".to_string())
        );
    }

    #[test]
    fn test_builders_target_first_records() {
        let payload = MetadataPayload::new("m")
            .with_normalization(&[1.0], &[2.0])
            .with_labels("labels.txt", &["x"]);
        let input = payload.input_tensor(0).unwrap();
        assert!(matches!(input.process_units[0], ProcessUnit::Normalization { .. }));
        let output = payload.output_tensor(0).unwrap();
        assert_eq!(output.associated_files[0].name, "labels.txt");
        assert!(payload.output_tensor(1).is_none());
    }
}
