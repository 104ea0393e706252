//! Application configuration

use std::path::{Path, PathBuf};

use classifier::ClassifierConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Prefix of environment overrides, e.g. `IMAGE_CLASSIFIER__MODEL_DIR`
pub const ENV_PREFIX: &str = "IMAGE_CLASSIFIER";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Settings for the command-line classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding models and their `.metadata` payloads
    pub model_dir: PathBuf,
    pub classifier: ClassifierConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            classifier: ClassifierConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Layer defaults, `image-classifier.{toml,yaml,json}` in the working
    /// directory, an explicit file and `IMAGE_CLASSIFIER__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::build(path, environment())
    }

    fn build(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::with_name("image-classifier").required(false));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder.add_source(env).build()?.try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classifier::Device;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(vars))
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = AppConfig::build(None, env(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_environment_overrides_nested_fields() {
        let config = AppConfig::build(
            None,
            env(&[
                ("IMAGE_CLASSIFIER__MODEL_DIR", "/opt/models"),
                ("IMAGE_CLASSIFIER__CLASSIFIER__MAX_RESULTS", "3"),
                ("IMAGE_CLASSIFIER__CLASSIFIER__OPTIONS__DEVICE", "gpu"),
                ("IMAGE_CLASSIFIER__LOGGING__JSON", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.classifier.max_results, 3);
        assert_eq!(config.classifier.options.device, Device::Gpu);
        assert_eq!(config.classifier.options.num_threads, 1);
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = AppConfig::build(Some(Path::new("/nonexistent/classifier.toml")), env(&[]));
        assert!(result.is_err());
    }
}
