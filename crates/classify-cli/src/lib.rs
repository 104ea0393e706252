//! Image Classifier CLI
//!
//! Shared pieces of the `image-classifier` binary: configuration, logging
//! setup and the JSON reports it prints.

mod settings;

pub use settings::{AppConfig, LoggingConfig, ENV_PREFIX};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use classifier::{AnalysisListener, Category, Classifier, ClassifierError, ImageAnalyser};
use model_metadata::ModelMetadata;
use serde::Serialize;
use tensor_pipeline::{NormalizationParams, Pipeline, TensorImage, TensorSpec};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
///
/// Each `-v` raises the configured level by one step.
pub fn init_logging(config: &LoggingConfig, verbose: u8) -> anyhow::Result<()> {
    let configured: Level = config
        .level
        .parse()
        .with_context(|| format!("Invalid log level {:?}", config.level))?;
    let level = raise_level(configured, verbose);

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);
    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.context("Failed to set tracing subscriber")
}

fn raise_level(level: Level, steps: u8) -> Level {
    const ORDER: [Level; 5] = [
        Level::ERROR,
        Level::WARN,
        Level::INFO,
        Level::DEBUG,
        Level::TRACE,
    ];
    let index = ORDER.iter().position(|l| *l == level).unwrap_or(2);
    ORDER[(index + steps as usize).min(ORDER.len() - 1)]
}

/// Classification outcome of one image file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReport {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageReport {
    fn success(path: &Path, categories: Vec<Category>) -> Self {
        Self {
            path: path.to_path_buf(),
            categories,
            error: None,
        }
    }

    fn failure(path: &Path, error: impl ToString) -> Self {
        Self {
            path: path.to_path_buf(),
            categories: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Decode an image file
pub fn decode_image(path: &Path) -> anyhow::Result<TensorImage> {
    let image = image::open(path).with_context(|| format!("Cannot decode {}", path.display()))?;
    Ok(TensorImage::from_dynamic(&image))
}

type Outcomes = Arc<Mutex<Vec<Result<Vec<Category>, String>>>>;

/// Collects analyser outcomes in delivery order
struct Collector(Outcomes);

impl AnalysisListener for Collector {
    fn on_result(&mut self, categories: Vec<Category>) {
        if let Ok(mut outcomes) = self.0.lock() {
            outcomes.push(Ok(categories));
        }
    }

    fn on_error(&mut self, error: ClassifierError) {
        if let Ok(mut outcomes) = self.0.lock() {
            outcomes.push(Err(error.to_string()));
        }
    }
}

/// Classify image files through an [`ImageAnalyser`]
///
/// Reports keep the order of `paths`; undecodable files are reported
/// without reaching the classifier.
pub async fn classify_images<C>(
    classifier: C,
    paths: &[PathBuf],
    queue_depth: usize,
) -> anyhow::Result<Vec<ImageReport>>
where
    C: Classifier + 'static,
{
    let (handle, mut analyser) = ImageAnalyser::channel(classifier, queue_depth);
    let outcomes: Outcomes = Arc::default();
    let collector = Collector(Arc::clone(&outcomes));
    let task = tokio::spawn(async move { analyser.run(collector).await });

    let mut decoded = Vec::with_capacity(paths.len());
    for path in paths {
        match decode_image(path) {
            Ok(image) => {
                debug!("Submitting {} ({}x{})", path.display(), image.width(), image.height());
                handle.submit(image).await?;
                decoded.push(Ok(()));
            }
            Err(e) => decoded.push(Err(format!("{e:#}"))),
        }
    }
    drop(handle);
    task.await.context("Analyser task panicked")??;

    let outcomes = std::mem::take(
        &mut *outcomes
            .lock()
            .map_err(|_| anyhow::anyhow!("Analyser results poisoned"))?,
    );
    let mut outcomes = outcomes.into_iter();

    let reports = paths
        .iter()
        .zip(decoded)
        .map(|(path, decoded)| match decoded {
            Err(e) => ImageReport::failure(path, e),
            Ok(()) => match outcomes.next() {
                Some(Ok(categories)) => ImageReport::success(path, categories),
                Some(Err(e)) => ImageReport::failure(path, e),
                None => ImageReport::failure(path, ClassifierError::Closed),
            },
        })
        .collect();
    Ok(reports)
}

/// Description of a loaded model as printed by `inspect`
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub version: String,
    pub input: TensorSpec,
    pub normalization: NormalizationParams,
    pub output: TensorSpec,
    pub labels: Vec<String>,
    pub input_stages: Vec<&'static str>,
    pub output_stages: Vec<&'static str>,
}

impl ModelSummary {
    pub fn new(metadata: &ModelMetadata, input: &Pipeline, output: &Pipeline) -> Self {
        let names = |pipeline: &Pipeline| -> Vec<&'static str> {
            pipeline.stages().iter().map(|s| s.name()).collect()
        };
        Self {
            name: metadata.name().to_string(),
            version: metadata.version().to_string(),
            input: metadata.input_spec().clone(),
            normalization: metadata.normalization().clone(),
            output: metadata.output_spec().clone(),
            labels: metadata.labels().to_vec(),
            input_stages: names(input),
            output_stages: names(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Classifier for Fixed {
        fn classify(&mut self, image: &TensorImage) -> Result<Vec<Category>, ClassifierError> {
            if image.width() == 1 {
                return Err(ClassifierError::Inference("too small".to_string()));
            }
            Ok(vec![Category::new("wide", image.width() as f32)])
        }

        fn close(&mut self) -> Result<(), ClassifierError> {
            Ok(())
        }
    }

    #[test]
    fn test_raise_level() {
        assert_eq!(raise_level(Level::INFO, 0), Level::INFO);
        assert_eq!(raise_level(Level::INFO, 1), Level::DEBUG);
        assert_eq!(raise_level(Level::WARN, 9), Level::TRACE);
    }

    #[tokio::test]
    async fn test_reports_follow_input_order() {
        let dir = std::env::temp_dir().join(format!("image-classifier-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let wide = dir.join("wide.png");
        let narrow = dir.join("narrow.png");
        image::RgbImage::new(4, 2).save(&wide).unwrap();
        image::RgbImage::new(1, 2).save(&narrow).unwrap();
        let missing = dir.join("missing.png");

        let paths = vec![missing.clone(), wide.clone(), narrow.clone()];
        let reports = classify_images(Fixed, &paths, 2).await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].path, missing);
        assert!(reports[0].error.is_some());
        assert_eq!(reports[1], ImageReport::success(&wide, vec![Category::new("wide", 4.0)]));
        assert_eq!(reports[2].error.as_deref(), Some("Inference failed: too small"));
    }
}
