//! Image Classifier - Main Entry Point

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use classifier::tract_backend::TractModelLoader;
use classifier::{InferenceAdapter, MetadataClassifier};
use classify_cli::{classify_images, init_logging, AppConfig, ModelSummary};
use model_metadata::{load_labels, MetadataPayload};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "image-classifier",
    about = "Classify images with metadata-packaged ONNX models",
    version
)]
struct Cli {
    /// Configuration file layered over defaults and under environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Raise the log level (repeat for more: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify image files and print JSON reports
    Classify {
        /// Images to classify
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Model file inside the model directory
        #[arg(short, long)]
        model: Option<String>,

        /// Number of categories per image (0 for all)
        #[arg(short = 'k', long)]
        top: Option<usize>,
    },

    /// Print a model's metadata and default pipelines
    Inspect {
        /// Model file inside the model directory
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Write the metadata payload for a model
    Package {
        /// Model file inside the model directory
        #[arg(short, long)]
        model: String,

        /// Newline-delimited label file
        #[arg(short, long)]
        labels: PathBuf,

        /// Normalization means, one value or one per channel
        #[arg(long, value_delimiter = ',', default_value = "0")]
        mean: Vec<f32>,

        /// Normalization standard deviations
        #[arg(long, value_delimiter = ',', default_value = "255")]
        std: Vec<f32>,

        /// Model name stored in the payload
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging, cli.verbose)?;

    info!("=== Image Classifier v{} ===", env!("CARGO_PKG_VERSION"));
    let loader = TractModelLoader::new(&config.model_dir);

    match cli.command {
        Command::Classify { images, model, top } => {
            if let Some(model) = model {
                config.classifier.model = model;
            }
            if let Some(top) = top {
                config.classifier.max_results = top;
            }

            let classifier_config = config.classifier.clone();
            let classifier = tokio::task::spawn_blocking(move || {
                MetadataClassifier::load(&loader, &classifier_config)
            })
            .await??;

            let reports = classify_images(classifier, &images, config.classifier.queue_depth).await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Command::Inspect { model } => {
            let model = model.unwrap_or(config.classifier.model);
            let options = config.classifier.options;
            let mut adapter = tokio::task::spawn_blocking(move || {
                InferenceAdapter::load(&loader, &model, &options)
            })
            .await??;

            let summary = ModelSummary::new(
                adapter.metadata(),
                adapter.input_pipeline(),
                adapter.output_pipeline(),
            );
            adapter.close()?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Package {
            model,
            labels,
            mean,
            std,
            name,
        } => {
            let contents = std::fs::read(&labels)
                .with_context(|| format!("Cannot read {}", labels.display()))?;
            let label_list = load_labels(&contents)?;
            let file_name = labels
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("labels.txt");

            let payload = MetadataPayload::new(name.unwrap_or_else(|| model.clone()))
                .with_version(env!("CARGO_PKG_VERSION"))
                .with_normalization(&mean, &std)
                .with_labels(file_name, &label_list);

            let path = loader.metadata_path(&model);
            std::fs::write(&path, payload.to_bytes()?)
                .with_context(|| format!("Cannot write {}", path.display()))?;
            info!("Wrote {} labels to {}", label_list.len(), path.display());
        }
    }

    Ok(())
}
