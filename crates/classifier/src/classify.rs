//! Ranked classification

use tensor_pipeline::TensorImage;
use tracing::debug;

use crate::{
    Category, ClassifierConfig, ClassifierError, InferenceAdapter, InferenceEngine, ModelLoader,
};

/// Host-facing image classifier
pub trait Classifier: Send {
    /// Categories with percent scores, best first
    fn classify(&mut self, image: &TensorImage) -> Result<Vec<Category>, ClassifierError>;

    fn close(&mut self) -> Result<(), ClassifierError>;
}

/// Classifier driven by the model's packaged metadata
pub struct MetadataClassifier<E: InferenceEngine> {
    adapter: InferenceAdapter<E>,
    max_results: usize,
    score_threshold: f32,
}

impl<E: InferenceEngine> MetadataClassifier<E> {
    pub fn new(adapter: InferenceAdapter<E>, config: &ClassifierConfig) -> Self {
        Self {
            adapter,
            max_results: config.max_results,
            score_threshold: config.score_threshold,
        }
    }

    /// Load `config.model` through `loader`
    pub fn load<L>(loader: &L, config: &ClassifierConfig) -> Result<Self, ClassifierError>
    where
        L: ModelLoader<Engine = E> + ?Sized,
    {
        let adapter = InferenceAdapter::load(loader, &config.model, &config.options)?;
        Ok(Self::new(adapter, config))
    }

    pub fn adapter(&self) -> &InferenceAdapter<E> {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut InferenceAdapter<E> {
        &mut self.adapter
    }
}

impl<E: InferenceEngine> Classifier for MetadataClassifier<E> {
    fn classify(&mut self, image: &TensorImage) -> Result<Vec<Category>, ClassifierError> {
        let result = self.adapter.run(image)?;
        let limit = match self.max_results {
            0 => result.labels().len(),
            n => n,
        };

        let categories: Vec<Category> = result
            .top_k(result.labels().len())
            .into_iter()
            .map(|c| Category::new(c.label, c.score * 100.0))
            .filter(|c| c.score >= self.score_threshold)
            .take(limit)
            .collect();

        if let Some(best) = categories.first() {
            debug!("Best category {} ({:.1}%)", best.label, best.score);
        }
        Ok(categories)
    }

    fn close(&mut self) -> Result<(), ClassifierError> {
        self.adapter.close()
    }
}
