//! Image Classifier
//!
//! Runs image classification models whose pre- and postprocessing is
//! described by packaged metadata:
//! - `InferenceAdapter` owns the engine, metadata and active pipelines
//! - `MetadataClassifier` ranks labeled scores for host applications
//! - `ImageAnalyser` classifies a stream of frames off the caller's task
//! - `tract_backend` loads ONNX models with tract

mod adapter;
mod analyser;
mod backend;
mod classify;
mod config;
mod output;
pub mod tract_backend;

pub use adapter::InferenceAdapter;
pub use analyser::{AnalyserHandle, AnalysisListener, ImageAnalyser};
pub use backend::{Device, InferenceEngine, LoadedModel, ModelLoader, ModelOptions};
pub use classify::{Classifier, MetadataClassifier};
pub use config::ClassifierConfig;
pub use output::{Category, OutputResult};

use model_metadata::MetadataError;
use tensor_pipeline::TransformError;
use thiserror::Error;

/// Errors during model loading and classification
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Model load failed: {0}")]
    Load(String),
    #[error("Model metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("Tensor transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Classifier is closed")]
    Closed,
    #[error("Engine release failed: {0}")]
    Release(String),
}
