//! Inference Adapter

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use model_metadata::{MetadataView, ModelMetadata};
use tensor_pipeline::{Pipeline, TensorBuffer, TensorImage, TransformError};
use tracing::{debug, info, warn};

use crate::{ClassifierError, InferenceEngine, LoadedModel, ModelLoader, ModelOptions, OutputResult};

/// Loaded model with its metadata and active pipelines
///
/// Holding an adapter means the model is loaded. After [`close`](Self::close)
/// the engine is gone and every operation that needs it fails with
/// [`ClassifierError::Closed`].
pub struct InferenceAdapter<E: InferenceEngine> {
    engine: Option<E>,
    metadata: Arc<ModelMetadata>,
    input_pipeline: Pipeline,
    output_pipeline: Pipeline,
}

impl<E: InferenceEngine> InferenceAdapter<E> {
    /// Load a model and build the default pipelines from its metadata
    ///
    /// The engine is released again if the metadata cannot be used.
    pub fn load<L>(loader: &L, source: &str, options: &ModelOptions) -> Result<Self, ClassifierError>
    where
        L: ModelLoader<Engine = E> + ?Sized,
    {
        info!("Loading model {} on {}", source, options.device.as_str());
        let LoadedModel {
            mut engine,
            metadata,
        } = loader.load_model(source, options)?;

        match Self::prepare(&engine, &metadata) {
            Ok((metadata, input_pipeline, output_pipeline)) => {
                info!(
                    "Model {} loaded: {} input stages, {} output stages",
                    source,
                    input_pipeline.len(),
                    output_pipeline.len()
                );
                Ok(Self {
                    engine: Some(engine),
                    metadata: Arc::new(metadata),
                    input_pipeline,
                    output_pipeline,
                })
            }
            Err(e) => {
                warn!("Model {} rejected: {}", source, e);
                if let Err(release) = engine.release() {
                    warn!("Releasing engine after failed load: {}", release);
                }
                Err(e)
            }
        }
    }

    fn prepare(engine: &E, raw: &[u8]) -> Result<(ModelMetadata, Pipeline, Pipeline), ClassifierError> {
        let view = MetadataView::parse(raw)
            .map_err(|e| ClassifierError::Load(format!("unreadable metadata payload: {e}")))?;
        let metadata = view.extract(engine)?;
        let input_pipeline = metadata.default_input_pipeline()?;
        let output_pipeline = metadata.default_output_pipeline()?;
        Ok((metadata, input_pipeline, output_pipeline))
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Shared handle to the metadata snapshot
    pub fn shared_metadata(&self) -> Arc<ModelMetadata> {
        Arc::clone(&self.metadata)
    }

    pub fn input_pipeline(&self) -> &Pipeline {
        &self.input_pipeline
    }

    pub fn output_pipeline(&self) -> &Pipeline {
        &self.output_pipeline
    }

    /// Replace the preprocessing pipeline
    ///
    /// The pipeline is not checked against the metadata.
    pub fn set_input_pipeline(&mut self, pipeline: Pipeline) -> Result<(), ClassifierError> {
        self.ensure_open()?;
        debug!("Input pipeline replaced ({} stages)", pipeline.len());
        self.input_pipeline = pipeline;
        Ok(())
    }

    /// Replace the postprocessing pipeline
    pub fn set_output_pipeline(&mut self, pipeline: Pipeline) -> Result<(), ClassifierError> {
        self.ensure_open()?;
        debug!("Output pipeline replaced ({} stages)", pipeline.len());
        self.output_pipeline = pipeline;
        Ok(())
    }

    /// Classify an image
    pub fn run(&mut self, image: &TensorImage) -> Result<OutputResult, ClassifierError> {
        self.run_buffer(image.to_buffer())
    }

    /// Run the model on an arbitrary buffer
    ///
    /// The input pipeline must produce exactly the element count and type of
    /// the model input; the result is reshaped to the model input shape.
    pub fn run_buffer(&mut self, input: TensorBuffer) -> Result<OutputResult, ClassifierError> {
        self.ensure_open()?;
        let start = Instant::now();
        let result = self.execute(input);

        metrics::counter!("classifier_runs_total").increment(1);
        match &result {
            Ok(_) => {
                let elapsed = start.elapsed();
                metrics::histogram!("classifier_run_duration_seconds").record(elapsed.as_secs_f64());
                debug!("Run completed in {:?}", elapsed);
            }
            Err(e) => {
                metrics::counter!("classifier_run_failures_total").increment(1);
                debug!("Run failed: {}", e);
            }
        }
        result
    }

    fn execute(&mut self, input: TensorBuffer) -> Result<OutputResult, ClassifierError> {
        let engine = self.engine.as_mut().ok_or(ClassifierError::Closed)?;
        let spec = self.metadata.input_spec();

        let processed = self.input_pipeline.process(input)?.reshape(spec.shape())?;
        if processed.dtype() != spec.dtype() {
            return Err(TransformError::TypeMismatch {
                expected: spec.dtype(),
                actual: processed.dtype(),
            }
            .into());
        }

        let mut outputs = engine.invoke(HashMap::from([(0, processed)]))?;
        let raw = outputs
            .remove(&0)
            .ok_or_else(|| ClassifierError::Inference("engine returned no output 0".to_string()))?;

        let scores = self.output_pipeline.process(raw)?;
        Ok(OutputResult::new(scores, self.metadata.shared_labels()))
    }

    /// Release the engine
    ///
    /// Idempotent. A release failure is reported, but the adapter is closed
    /// either way.
    pub fn close(&mut self) -> Result<(), ClassifierError> {
        let Some(mut engine) = self.engine.take() else {
            debug!("Adapter already closed");
            return Ok(());
        };
        info!("Closing model {}", self.metadata.name());
        engine.release().inspect_err(|e| {
            warn!("Engine release failed: {}", e);
        })
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_none()
    }

    fn ensure_open(&self) -> Result<(), ClassifierError> {
        if self.is_closed() {
            Err(ClassifierError::Closed)
        } else {
            Ok(())
        }
    }
}

impl<E: InferenceEngine> Drop for InferenceAdapter<E> {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                debug!("Close on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_metadata::{MetadataError, MetadataPayload, TensorIntrospection};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tensor_pipeline::{DataType, PipelineStage, TensorSpec};

    /// Echo engine: output 0 is a fixed score vector
    struct EchoEngine {
        released: Arc<AtomicUsize>,
        scores: Vec<f32>,
    }

    impl TensorIntrospection for EchoEngine {
        fn input_tensor(&self, _index: usize) -> Result<TensorSpec, MetadataError> {
            Ok(TensorSpec::new(vec![1, 2, 2, 3], DataType::Float32, None)?)
        }

        fn output_tensor(&self, _index: usize) -> Result<TensorSpec, MetadataError> {
            Ok(TensorSpec::new(vec![1, self.scores.len()], DataType::Float32, None)?)
        }
    }

    impl InferenceEngine for EchoEngine {
        fn invoke(
            &mut self,
            inputs: HashMap<usize, TensorBuffer>,
        ) -> Result<HashMap<usize, TensorBuffer>, ClassifierError> {
            assert_eq!(inputs[&0].shape(), &[1, 2, 2, 3]);
            let scores = TensorBuffer::from_vec(&[1, self.scores.len()], self.scores.clone())?;
            Ok(HashMap::from([(0, scores)]))
        }

        fn release(&mut self) -> Result<(), ClassifierError> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct EchoLoader {
        released: Arc<AtomicUsize>,
        payload: MetadataPayload,
    }

    impl ModelLoader for EchoLoader {
        type Engine = EchoEngine;

        fn load_model(
            &self,
            _source: &str,
            _options: &ModelOptions,
        ) -> Result<LoadedModel<EchoEngine>, ClassifierError> {
            Ok(LoadedModel {
                engine: EchoEngine {
                    released: Arc::clone(&self.released),
                    scores: vec![0.25, 0.75],
                },
                metadata: self.payload.to_bytes()?,
            })
        }
    }

    fn loader(payload: MetadataPayload) -> EchoLoader {
        EchoLoader {
            released: Arc::new(AtomicUsize::new(0)),
            payload,
        }
    }

    fn valid_payload() -> MetadataPayload {
        MetadataPayload::new("echo")
            .with_normalization(&[0.0], &[1.0])
            .with_labels("labels.txt", &["no", "yes"])
    }

    fn image() -> TensorImage {
        TensorImage::from_rgb(vec![10; 4 * 4 * 3], 4, 4).unwrap()
    }

    #[test]
    fn test_run_zips_labels_with_scores() {
        let loader = loader(valid_payload());
        let mut adapter = InferenceAdapter::load(&loader, "echo", &ModelOptions::default()).unwrap();
        let result = adapter.run(&image()).unwrap();
        assert_eq!(result.categories()[1].label, "yes");
        assert_eq!(result.scores(), vec![0.25, 0.75]);
    }

    #[test]
    fn test_failed_load_releases_engine() {
        let loader = loader(MetadataPayload::new("broken"));
        let result = InferenceAdapter::load(&loader, "broken", &ModelOptions::default());
        assert!(matches!(result, Err(ClassifierError::Metadata(_))));
        assert_eq!(loader.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unreadable_payload_is_a_load_error() {
        let released = Arc::new(AtomicUsize::new(0));
        struct Garbage(Arc<AtomicUsize>);
        impl ModelLoader for Garbage {
            type Engine = EchoEngine;

            fn load_model(
                &self,
                _source: &str,
                _options: &ModelOptions,
            ) -> Result<LoadedModel<EchoEngine>, ClassifierError> {
                Ok(LoadedModel {
                    engine: EchoEngine {
                        released: Arc::clone(&self.0),
                        scores: vec![0.5],
                    },
                    metadata: vec![0xff; 3],
                })
            }
        }

        let loader = Garbage(Arc::clone(&released));
        let result = InferenceAdapter::load(&loader, "echo", &ModelOptions::default());
        assert!(matches!(result, Err(ClassifierError::Load(_))));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_grayscale_image_feeds_rgb_model() {
        let loader = loader(valid_payload());
        let mut adapter = InferenceAdapter::load(&loader, "echo", &ModelOptions::default()).unwrap();
        let gray = TensorImage::new(vec![10; 4 * 4], 4, 4, 1).unwrap();
        let result = adapter.run(&gray).unwrap();
        assert_eq!(result.scores(), vec![0.25, 0.75]);

        let rgba = TensorImage::new(vec![10; 4 * 4 * 4], 4, 4, 4).unwrap();
        assert!(adapter.run(&rgba).is_ok());
    }

    #[test]
    fn test_close_is_idempotent() {
        let loader = loader(valid_payload());
        let mut adapter = InferenceAdapter::load(&loader, "echo", &ModelOptions::default()).unwrap();
        adapter.close().unwrap();
        adapter.close().unwrap();
        drop(adapter);
        assert_eq!(loader.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_engine() {
        let loader = loader(valid_payload());
        let adapter = InferenceAdapter::load(&loader, "echo", &ModelOptions::default()).unwrap();
        drop(adapter);
        assert_eq!(loader.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closed_adapter_rejects_operations() {
        let loader = loader(valid_payload());
        let mut adapter = InferenceAdapter::load(&loader, "echo", &ModelOptions::default()).unwrap();
        adapter.close().unwrap();
        assert!(adapter.is_closed());
        assert!(matches!(adapter.run(&image()), Err(ClassifierError::Closed)));
        assert!(matches!(
            adapter.set_input_pipeline(Pipeline::identity()),
            Err(ClassifierError::Closed)
        ));
        assert!(matches!(
            adapter.set_output_pipeline(Pipeline::identity()),
            Err(ClassifierError::Closed)
        ));
    }

    #[test]
    fn test_replaced_pipeline_must_match_input() {
        let loader = loader(valid_payload());
        let mut adapter = InferenceAdapter::load(&loader, "echo", &ModelOptions::default()).unwrap();
        adapter
            .set_input_pipeline(Pipeline::builder().add(PipelineStage::cast(DataType::Float32)).build())
            .unwrap();
        let err = adapter.run(&image()).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::Transform(TransformError::ShapeMismatch { elements: 48, .. })
        ));
    }

    #[test]
    fn test_output_pipeline_applies_eagerly() {
        let loader = loader(valid_payload());
        let mut adapter = InferenceAdapter::load(&loader, "echo", &ModelOptions::default()).unwrap();
        adapter
            .set_output_pipeline(Pipeline::builder().add(PipelineStage::cast(DataType::Uint8)).build())
            .unwrap();
        let result = adapter.run(&image()).unwrap();
        assert_eq!(result.buffer().dtype(), DataType::Uint8);
        assert_eq!(result.scores(), vec![0.0, 1.0]);
    }
}
