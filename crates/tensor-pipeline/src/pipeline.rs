//! Ordered stage chains

use std::sync::Arc;
use tracing::{debug, trace};

use crate::{PipelineStage, TensorBuffer, TransformError};

/// Immutable, ordered sequence of stages
///
/// Cloning is cheap and shares the stage list, so a pipeline can be handed to
/// several results or threads while the owner swaps in a replacement.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Arc<[PipelineStage]>,
}

impl Pipeline {
    /// Start building a pipeline
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Pipeline that returns its input unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order, each on the output of the previous one
    pub fn process(&self, input: TensorBuffer) -> Result<TensorBuffer, TransformError> {
        let mut buffer = input;
        for stage in self.stages.iter() {
            trace!(
                "Applying {} to {:?} {}",
                stage.name(),
                buffer.shape(),
                buffer.dtype()
            );
            buffer = stage.apply(buffer).inspect_err(|e| {
                debug!("Stage {} failed: {}", stage.name(), e);
            })?;
        }
        Ok(buffer)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stages: Arc::from(Vec::new()),
        }
    }
}

impl PartialEq for Pipeline {
    fn eq(&self, other: &Self) -> bool {
        self.stages() == other.stages()
    }
}

impl FromIterator<PipelineStage> for Pipeline {
    fn from_iter<I: IntoIterator<Item = PipelineStage>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

/// Builder collecting stages in application order
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    stages: Vec<PipelineStage>,
}

impl PipelineBuilder {
    /// Append a stage
    pub fn add(mut self, stage: PipelineStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a stage when present
    pub fn add_optional(self, stage: Option<PipelineStage>) -> Self {
        match stage {
            Some(stage) => self.add(stage),
            None => self,
        }
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages.into(),
        }
    }
}
