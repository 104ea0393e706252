//! Classification results

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tensor_pipeline::TensorBuffer;

/// A label with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub score: f32,
}

impl Category {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Postprocessed output of one run
///
/// Scores are final when the result is created, so every read returns the
/// same values. The label list is shared with the model metadata.
#[derive(Debug, Clone)]
pub struct OutputResult {
    scores: TensorBuffer,
    labels: Arc<[String]>,
}

impl OutputResult {
    pub fn new(scores: TensorBuffer, labels: Arc<[String]>) -> Self {
        Self { scores, labels }
    }

    /// Postprocessed output tensor
    pub fn buffer(&self) -> &TensorBuffer {
        &self.scores
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Scores in row-major order
    pub fn scores(&self) -> Vec<f32> {
        self.scores.to_f32_vec()
    }

    /// Labels zipped with scores, in label order
    pub fn categories(&self) -> Vec<Category> {
        self.labels
            .iter()
            .zip(self.scores())
            .map(|(label, score)| Category::new(label.as_str(), score))
            .collect()
    }

    /// The `k` highest scoring categories, best first
    ///
    /// Equal scores keep label order.
    pub fn top_k(&self, k: usize) -> Vec<Category> {
        let mut categories = self.categories();
        categories.sort_by(|a, b| b.score.total_cmp(&a.score));
        categories.truncate(k);
        categories
    }
}
