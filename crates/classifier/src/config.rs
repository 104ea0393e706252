//! Classifier configuration

use serde::{Deserialize, Serialize};

use crate::ModelOptions;

/// Classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Model source passed to the loader
    pub model: String,

    /// Device and threading requested from the engine
    pub options: ModelOptions,

    /// Maximum categories returned per image (0 returns all)
    pub max_results: usize,

    /// Minimum score in percent for a category to be returned
    pub score_threshold: f32,

    /// Frames buffered by the analyser before submitters wait
    pub queue_depth: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: "fashion_mnist.onnx".to_string(),
            options: ModelOptions::default(),
            max_results: 0,
            score_threshold: 0.0,
            queue_depth: 4,
        }
    }
}

impl ClassifierConfig {
    /// Only the best category
    pub fn top1() -> Self {
        Self {
            max_results: 1,
            ..Default::default()
        }
    }

    /// Confident categories only
    pub fn strict() -> Self {
        Self {
            max_results: 3,
            score_threshold: 50.0,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(ClassifierConfig::default().max_results, 0);
        assert_eq!(ClassifierConfig::top1().max_results, 1);
        assert!(ClassifierConfig::strict().score_threshold > ClassifierConfig::default().score_threshold);
    }
}
