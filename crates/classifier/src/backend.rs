//! Engine collaborators

use std::collections::HashMap;

use model_metadata::TensorIntrospection;
use serde::{Deserialize, Serialize};
use tensor_pipeline::TensorBuffer;

use crate::ClassifierError;

/// Hardware requested for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
    Nnapi,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
            Device::Nnapi => "nnapi",
        }
    }
}

/// Options passed to the model loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Requested device; backends without it fall back to CPU
    pub device: Device,
    /// Worker threads for the engine
    pub num_threads: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            num_threads: 1,
        }
    }
}

/// Engine handle plus the metadata payload packaged with the model
pub struct LoadedModel<E> {
    pub engine: E,
    pub metadata: Vec<u8>,
}

/// Loads a named model blob
pub trait ModelLoader {
    type Engine: InferenceEngine;

    fn load_model(
        &self,
        source: &str,
        options: &ModelOptions,
    ) -> Result<LoadedModel<Self::Engine>, ClassifierError>;
}

/// Opaque inference engine
///
/// Inputs and outputs are keyed by tensor index. The engine also describes
/// its tensors so metadata can be built from it.
pub trait InferenceEngine: TensorIntrospection + Send {
    fn invoke(
        &mut self,
        inputs: HashMap<usize, TensorBuffer>,
    ) -> Result<HashMap<usize, TensorBuffer>, ClassifierError>;

    /// Free engine resources; no further calls follow
    fn release(&mut self) -> Result<(), ClassifierError>;
}
